//! Error types for graph validation, scheduling, orchestration, and resume.
//!
//! Grounded on the ancestor's flat `GraphError` (`error.rs`), split into the
//! nested groups the engine's surface taxonomy names so callers can match on
//! a specific failure family without string comparison.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Validation(#[from] GraphValidationError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Resume(#[from] ResumeError),

    #[error(transparent)]
    Channel(#[from] swarm_checkpoint::CheckpointError),

    #[error("run cancelled")]
    Cancelled,

    /// An `AgentStep` node's collaborator failed. `swarm-agents` owns the
    /// actual `Agent{cancelled, maxIterationsExceeded, providerMissing,
    /// internalError}` / `Tool{...}` taxonomy (spec.md §6.5); this crate
    /// only needs a seam to carry it through the node-body boundary
    /// without depending on that crate.
    #[error("agent error: {0}")]
    Agent(String),
}

/// Raised at `compile()` time; see spec.md §6.1 `OrchestrationValidationError`
/// and §4.2's DAG validation rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("orchestration has no steps")]
    EmptyGraph,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("node {node} depends on unknown node {dep} (available: {available:?})")]
    UnknownDependency { node: String, dep: String, available: Vec<String> },

    #[error("cycle detected among nodes: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("edge from {from} targets undeclared node {to}")]
    DanglingEdge { from: String, to: String },
}

/// Raised by the scheduler's per-superstep algorithm (spec.md §4.3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("exceeded max steps ({0})")]
    OutOfSteps(u64),

    #[error("multiple updates for single-policy channel: {0}")]
    MultipleUpdatesForSingleChannel(String),

    #[error("node {node} is missing join-edge parent {parent}")]
    JoinEdgeParentMissing { node: String, parent: String },
}

/// Raised by compiled orchestration fragments at run time (spec.md §4.2).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("no route matched and no fallback was configured")]
    RoutingFailed,

    #[error("all branches failed: {0:?}")]
    AllAgentsFailed(Vec<String>),

    #[error("human approval rejected for {prompt:?}: {reason}")]
    HumanApprovalRejected { prompt: String, reason: String },

    #[error("workflow interrupted: {0}")]
    WorkflowInterrupted(String),

    #[error("unsupported orchestration step: {0}")]
    UnsupportedStep(String),
}

/// Raised when a caller attempts to resume a thread incorrectly (spec.md §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResumeError {
    #[error("thread has no pending interrupt to resume")]
    NoInterruptToResume,

    #[error("resume interrupt id {supplied} does not match pending interrupt {pending}")]
    ResumeInterruptMismatch { pending: String, supplied: String },

    #[error("resume payload does not match the pending interrupt's variant: {0}")]
    InvalidPayload(String),
}
