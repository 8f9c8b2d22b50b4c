//! # swarm-agents — agent loop, tool subsystem, and memory/compaction
//!
//! Implements the ReAct-style agent loop a compiled `AgentStep` node
//! invokes through `swarm-core`'s [`swarm_core::AgentRuntime`] seam:
//! `Start → Model → ToolApproval → ToolExec → Finish`, with deterministic
//! message IDs, context compaction, a tool registry with approval policy
//! and a circuit breaker, and handoff to other agents.
//!
//! - [`messages`] — canonical chat history, the `messages` channel
//!   reducer, and context compaction into the ephemeral model input.
//! - [`tools`] — the tool trait, registry, approval policy, and circuit
//!   breaker; [`tools::validation`] validates call arguments against a
//!   declared parameter list.
//! - [`inference`] — the [`inference::InferenceProvider`] collaborator
//!   seam the loop calls an LLM through.
//! - [`agents`] — [`agents::ReactAgent`], the concrete
//!   [`swarm_core::AgentRuntime`] implementation.
//! - [`error`] — this crate's own `Agent{...}`/`Tool{...}` error groups.

pub mod agents;
pub mod error;
pub mod inference;
pub mod messages;
pub mod tools;

pub use agents::{ReactAgent, ReactAgentConfig};
pub use error::{AgentError, Result, ToolError};
pub use inference::{FinishReason, InferenceOptions, InferenceProvider, InferenceResponse, RawToolCall, ToolSchema};
pub use messages::{
    build_llm_input, deterministic_message_id, messages_from_value, messages_to_value, message_map, reduce_messages,
    ChatMessage, CompactionPolicy, Role, ToolCallRequest, Tokenizer, WordCountTokenizer,
};
pub use tools::{ApprovalPolicy, CircuitBreaker, Tool, ToolRef, ToolRegistry};
