//! Agent loop implementations. `react` is the only pattern the runtime
//! currently wires up (spec.md §4.4): a single `AgentStep` node body
//! running the `Start → Model → ToolApproval → ToolExec → Finish` state
//! machine against an injected [`InferenceProvider`](crate::inference::InferenceProvider).

pub mod react;

pub use react::{ReactAgent, ReactAgentConfig};
