//! The collaborator interface `AgentStep` nodes invoke, and the result type
//! they produce (spec.md §3 "Supporting types", §6.2 `InferenceProvider`
//! lives in `swarm-agents`; this trait is the seam the graph compiler calls
//! through without depending on the agent-loop implementation).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use swarm_checkpoint::SendableValue;

use crate::error::Result;

/// One resolved tool call/result pair as surfaced on an [`AgentResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: SendableValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub content: SendableValue,
}

/// The outcome of one `AgentRuntime::run` invocation.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub output: SendableValue,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_results: Vec<ToolResultRecord>,
    pub iteration_count: u32,
    pub duration: Duration,
    pub metadata: std::collections::BTreeMap<String, SendableValue>,
}

impl AgentResult {
    pub fn simple(output: impl Into<SendableValue>) -> Self {
        Self {
            output: output.into(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            iteration_count: 1,
            duration: Duration::default(),
            metadata: std::collections::BTreeMap::new(),
        }
    }
}

/// A caller's answer to a pending tool-approval interrupt, threaded back
/// into the agent on the superstep that resumes it. `None` on every
/// invocation that isn't resuming one.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolApprovalResume {
    None,
    Approved,
    Cancelled,
}

/// A tool call awaiting approval, paired with the runtime's opaque
/// resumption state so the node can hand it back unchanged on resume.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: SendableValue,
}

/// What an `AgentStep` node passes to [`AgentRuntime::run`]: the joined
/// channel input, the runtime's own state as of the last time it ran on
/// this node (`SendableValue::Null` on a fresh entry), and the caller's
/// decision if this call is resuming a `ToolApprovalRequired` pause.
pub struct AgentInvocation {
    pub input: SendableValue,
    pub state: SendableValue,
    pub resume: ToolApprovalResume,
}

/// Either the agent finished, or it needs a tool-approval decision before
/// it can continue. `state` in the latter case is opaque to the node; it
/// is persisted verbatim and handed back unchanged on resume (spec.md §4.4
/// `ToolApproval`, §9 "the scheduler never inspects agent state").
pub enum AgentOutcome {
    Completed(AgentResult),
    ToolApprovalRequired { tool_calls: Vec<PendingToolCall>, state: SendableValue },
}

/// An agent runtime invocable by an `AgentStep` node. `swarm-agents`
/// provides the concrete ReAct-style implementation (spec.md §4.4); this
/// crate only needs the seam, not the loop itself.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, invocation: AgentInvocation) -> Result<AgentOutcome>;
}

pub type AgentRuntimeRef = Arc<dyn AgentRuntime>;
