//! Interrupt requests, resume payloads, and the move-only resume token
//! (spec.md §4.2 HumanApproval, §4.4 ToolApproval, §9 "non-copyable resume
//! token").
//!
//! Grounded on the ancestor's human-in-the-loop interrupt module
//! (`interrupt.rs`): a node-raised pause point with a typed payload the
//! caller must answer before the run continues. The ancestor's interrupt
//! value is an open `serde_json::Value`; here it is the closed set the spec
//! actually names (`humanApprovalRequired`, `toolApprovalRequired`) so resume
//! payload mismatches are caught as a type error rather than at runtime.

use swarm_checkpoint::SendableValue;

/// A tool call pending approval, as surfaced to the caller for
/// `toolApprovalRequired`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: SendableValue,
}

/// The payload a node attaches when it raises an interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum InterruptPayload {
    HumanApprovalRequired { prompt: String, current_output: SendableValue },
    ToolApprovalRequired { tool_calls: Vec<PendingToolCall> },
}

/// A pause point raised by a node; the scheduler checkpoints state and
/// surfaces this to the caller as the run's `Interrupted` outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct InterruptRequest {
    pub id: String,
    pub node_id: String,
    pub payload: InterruptPayload,
}

/// A human's answer to a pending `HumanApprovalRequired` interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum HumanApprovalResponse {
    Approved,
    Modified(SendableValue),
    Rejected(String),
}

/// A caller's answer to a pending `ToolApprovalRequired` interrupt.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolApprovalDecision {
    Approved,
    Cancelled,
}

/// The typed payload a `resume` call supplies (spec.md §6.1 `resume`).
#[derive(Debug, Clone, PartialEq)]
pub enum ResumePayload {
    HumanApproval(HumanApprovalResponse),
    ToolApproval(ToolApprovalDecision),
}

/// A move-only handle identifying exactly one pending interrupt. Consumed by
/// `resume`; reuse is a compile-time impossibility once moved, and the
/// scheduler additionally checks the supplied id against the pending one at
/// run time (`resumeInterruptMismatch`) since the id often travels through a
/// network boundary before the token itself would be available again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    pub thread_id: String,
    pub interrupt_id: String,
}

impl ResumeToken {
    pub fn new(thread_id: impl Into<String>, interrupt_id: impl Into<String>) -> Self {
        Self { thread_id: thread_id.into(), interrupt_id: interrupt_id.into() }
    }
}
