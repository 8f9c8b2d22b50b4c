//! # swarm-core — graph compiler and scheduler
//!
//! This crate turns a declarative list of orchestration steps into a
//! runnable DAG and drives its execution one superstep at a time.
//!
//! - [`builder`] — compiles an [`OrchestrationStep`](builder::OrchestrationStep)
//!   list into a [`CompiledGraph`](builder::CompiledGraph): agent steps,
//!   parallel fan-out/fan-in, DAGs with explicit dependencies, routers,
//!   loops, human approval gates, transforms, and guards.
//! - [`graph`] — the compiled [`Graph`] itself: nodes, edges, join edges,
//!   and the output projection applied once a run finishes.
//! - [`node`] — the node body contract every compiled node implements,
//!   and the read-only [`StoreView`](node::StoreView) it sees each step.
//! - [`agent`] — the [`AgentRuntime`](agent::AgentRuntime) seam an
//!   `AgentStep` node calls through; `swarm-agents` supplies the concrete
//!   ReAct-style implementation.
//! - [`interrupt`] — interrupt requests and the resume payloads/tokens a
//!   caller uses to answer them.
//! - [`error`] — the crate's error types.
//! - [`scheduler`] — the per-superstep executor: [`scheduler::run`] starts
//!   a graph, [`scheduler::resume`] answers a pending interrupt, and the
//!   run emits a [`VersionedEvent`](scheduler::VersionedEvent) stream as it
//!   progresses.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swarm_checkpoint::{InMemoryCheckpointStore, SendableValue};
//! use swarm_core::{builder, scheduler, OrchestrationStep, AgentStepSpec};
//!
//! # async fn example(researcher: swarm_core::AgentRuntimeRef) -> swarm_core::Result<()> {
//! let compiled = builder::compile(vec![OrchestrationStep::AgentStep(AgentStepSpec {
//!     name: Some("researcher".into()),
//!     agent: researcher,
//! })])?;
//!
//! let store = Arc::new(InMemoryCheckpointStore::new());
//! let handle = scheduler::run(
//!     Arc::new(compiled.graph),
//!     compiled.channel_specs,
//!     store,
//!     "thread-1".into(),
//!     SendableValue::string("hello"),
//!     scheduler::RunOptions::default(),
//! );
//! let outcome = handle.outcome().await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```
//!
//! A run pauses rather than fails when a node raises an interrupt (human
//! approval, tool approval). The caller inspects
//! [`RunOutcome::Interrupted`](scheduler::RunOutcome::Interrupted) and
//! answers it with [`scheduler::resume`].

pub mod agent;
pub mod builder;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod node;
pub mod scheduler;

pub use agent::{
    AgentInvocation, AgentOutcome, AgentResult, AgentRuntime, AgentRuntimeRef, ToolApprovalResume,
    ToolCallRecord, ToolResultRecord,
};
pub use builder::{
    compile, AgentStepSpec, BranchRecord, CompiledFragment, CompiledGraph, DagNodeSpec, DagSpec,
    GraphMetrics, GuardSpec, GuardStage, HumanApprovalSpec, LoopCondition, LoopSpec,
    MergeStrategy, OrchestrationStep, ParallelErrorHandling, ParallelSpec, RepeatWhileSpec,
    Route, RouterSpec, TransformSpec, ValidatorOutcome, INPUT_CHANNEL, PREDICATE_LOOP_SAFETY_FUSE,
};
pub use error::{
    GraphError, GraphValidationError, OrchestrationError, Result, ResumeError, SchedulerError,
};
pub use graph::{
    Edge, Graph, GraphDescription, JoinEdge, NodeId, NodeSpec, OutputProjection, END, START,
};
pub use interrupt::{
    HumanApprovalResponse, InterruptPayload, InterruptRequest, PendingToolCall, ResumePayload,
    ResumeToken, ToolApprovalDecision,
};
pub use node::{output_channel, FnNode, NextDirective, NodeBody, NodeBodyRef, NodeInput, NodeOutput, StoreView};
pub use scheduler::{
    apply_external_writes, checkpoint_history, get_state, resume, run, CheckpointPolicy, Handle,
    RunEvent, RunOptions, RunOptionsBuilder, RunOutcome, StateSnapshot, VersionedEvent,
    EVENT_SCHEMA_VERSION,
};
