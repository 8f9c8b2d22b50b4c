//! Error taxonomy for the agent loop and tool subsystem (spec.md §6.5
//! `Agent{...}` and `Tool{...}`).
//!
//! A flat `thiserror` enum with a `Result<T>` alias, generalized from one
//! bucket of tool/message errors into the two groups the agent loop
//! actually raises, plus a conversion from `swarm_core::error::OrchestrationError`
//! so a handoff or a propagated node failure still reads as one error type
//! at the call site.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("agent run was cancelled")]
    Cancelled,

    #[error("agent exceeded maxIterations")]
    MaxIterationsExceeded,

    #[error("no inference provider configured for this agent")]
    ProviderMissing,

    #[error("agent internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("graph error: {0}")]
    Graph(#[from] swarm_core::OrchestrationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("duplicate tool name: {0}")]
    Duplicate(String),

    #[error("invalid arguments for tool '{tool}': {error}")]
    InvalidArgumentsJson { tool: String, error: String },

    #[error("tool '{tool}' execution failed: {error}")]
    ExecutionFailed { tool: String, error: String },
}

/// Crosses back over the `AgentStep` node boundary: `swarm-core`'s
/// `GraphError::Agent` variant is an opaque string seam precisely so this
/// crate can carry its own taxonomy through it without a dependency cycle.
impl From<AgentError> for swarm_core::GraphError {
    fn from(error: AgentError) -> Self {
        swarm_core::GraphError::Agent(error.to_string())
    }
}
