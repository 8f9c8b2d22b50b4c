//! Tool subsystem: registry, approval policy, and circuit breaker
//! (spec.md §4.6).
//!
//! Generalized in two ways the spec requires beyond a conventional tool
//! registry: registration rejects duplicate names instead of silently
//! overwriting, and `invoke` takes the raw JSON argument string an LLM
//! actually emits rather than an already-parsed value, surfacing a parse
//! failure as its own error kind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use swarm_checkpoint::SendableValue;

use crate::error::{Result, ToolError};

pub mod validation;

/// A tool an agent can invoke. `parameters` is a JSON Schema document
/// describing the expected arguments, surfaced to the inference provider
/// alongside the prompt.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }
    async fn execute(&self, args: SendableValue) -> Result<SendableValue>;
}

pub type ToolRef = Arc<dyn Tool>;

/// `name → Tool`. Registration rejects duplicate names (spec.md §4.6
/// "Registration rejects duplicate names with `duplicateToolName`").
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolRef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: ToolRef) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name).into());
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ToolRef> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<(String, String, serde_json::Value)> {
        self.names()
            .into_iter()
            .map(|name| {
                let tool = self.tools.get(&name).expect("name just listed from this map");
                (name, tool.description().to_string(), tool.parameters())
            })
            .collect()
    }

    /// Resolves `name`, parses `arguments_json`, and executes. Cancellation
    /// errors from inside the tool propagate unchanged (they surface as
    /// whatever `Err` variant the tool itself returned).
    pub async fn invoke(&self, name: &str, arguments_json: &str) -> Result<SendableValue> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let parsed: serde_json::Value = serde_json::from_str(arguments_json)
            .map_err(|e| ToolError::InvalidArgumentsJson { tool: name.to_string(), error: e.to_string() })?;
        tool.execute(SendableValue::from(parsed)).await
    }
}

/// Approval gate for tool execution (spec.md §4.6).
#[derive(Clone)]
pub enum ApprovalPolicy {
    Never,
    Always,
    PerTool(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl ApprovalPolicy {
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        match self {
            ApprovalPolicy::Never => false,
            ApprovalPolicy::Always => true,
            ApprovalPolicy::PerTool(predicate) => predicate(tool_name),
        }
    }
}

impl std::fmt::Debug for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalPolicy::Never => write!(f, "ApprovalPolicy::Never"),
            ApprovalPolicy::Always => write!(f, "ApprovalPolicy::Always"),
            ApprovalPolicy::PerTool(_) => write!(f, "ApprovalPolicy::PerTool(..)"),
        }
    }
}

/// Per-tool failure counter. Trips after `failure_threshold` consecutive
/// failures and refuses further calls without reaching the tool until
/// `cooldown_steps` superstep ticks have elapsed (spec.md §4.6).
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown_steps: u64,
    state: Mutex<HashMap<String, BreakerState>>,
}

#[derive(Clone, Copy, Default)]
struct BreakerState {
    consecutive_failures: u32,
    tripped_at_step: Option<u64>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_steps: u64) -> Self {
        Self { failure_threshold, cooldown_steps, state: Mutex::new(HashMap::new()) }
    }

    /// Whether `tool_name` is currently tripped as of `step`. The breaker
    /// resets itself once the cooldown has elapsed, so a tripped tool
    /// becomes callable again without external intervention.
    pub fn is_tripped(&self, tool_name: &str, step: u64) -> bool {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        let entry = state.entry(tool_name.to_string()).or_default();
        match entry.tripped_at_step {
            Some(tripped_at) if step.saturating_sub(tripped_at) >= self.cooldown_steps => {
                *entry = BreakerState::default();
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn record_failure(&self, tool_name: &str, step: u64) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        let entry = state.entry(tool_name.to_string()).or_default();
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.failure_threshold {
            entry.tripped_at_step = Some(step);
        }
    }

    pub fn record_success(&self, tool_name: &str) {
        let mut state = self.state.lock().expect("circuit breaker mutex poisoned");
        state.insert(tool_name.to_string(), BreakerState::default());
    }
}
