//! The ReAct agent loop: a single `AgentStep` node body implementing
//! `Start → Model → ToolApproval → ToolExec → Finish` (spec.md §4.4).
//!
//! Same think-act-observe shape and fluent config builder as a typical
//! ReAct agent, restructured from a two-node sub-graph (an "agent" node
//! and a "tools" node wired by a conditional edge) into one self-contained
//! async state machine implementing `AgentRuntime` directly. A nested-graph
//! approach has no way to raise a tool-approval interrupt through a single
//! `AgentStep` node boundary; this version owns its own loop state instead,
//! persisting it to the
//! opaque state value `swarm-core`'s `agent_node` round-trips across a
//! pause (see `swarm_core::agent::AgentInvocation`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use swarm_checkpoint::SendableValue;
use swarm_core::agent::PendingToolCall;
use swarm_core::{AgentInvocation, AgentOutcome, AgentResult, AgentRuntime, AgentRuntimeRef, ToolApprovalResume, ToolCallRecord, ToolResultRecord};
use swarm_tooling::async_utils::retry::RetryPolicy;

use crate::error::{AgentError, Result, ToolError};
use crate::inference::{InferenceOptions, InferenceProvider};
use crate::messages::{
    build_llm_input, deterministic_message_id, ChatMessage, CompactionPolicy, Role, ToolCallRequest, Tokenizer,
    WordCountTokenizer,
};
use crate::tools::validation::{validate_arguments, ParameterSpec};
use crate::tools::{ApprovalPolicy, CircuitBreaker, ToolRegistry};

/// Configuration for one [`ReactAgent`] (spec.md §4.4, §4.6).
pub struct ReactAgentConfig {
    pub name: String,
    pub provider: Arc<dyn InferenceProvider>,
    pub system_prompt: Option<String>,
    pub max_iterations: u32,
    pub tools: ToolRegistry,
    pub tool_params: HashMap<String, Vec<ParameterSpec>>,
    pub approval_policy: ApprovalPolicy,
    pub circuit_breaker: Option<CircuitBreaker>,
    pub retry_policy: RetryPolicy,
    pub stop_on_tool_error: bool,
    pub parallel_tool_calls: bool,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub compaction: CompactionPolicy,
    pub handoffs: HashMap<String, AgentRuntimeRef>,
}

impl ReactAgentConfig {
    pub fn new(name: impl Into<String>, provider: Arc<dyn InferenceProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            system_prompt: None,
            max_iterations: 10,
            tools: ToolRegistry::new(),
            tool_params: HashMap::new(),
            approval_policy: ApprovalPolicy::Never,
            circuit_breaker: None,
            retry_policy: RetryPolicy::default(),
            stop_on_tool_error: true,
            parallel_tool_calls: false,
            tokenizer: Arc::new(WordCountTokenizer),
            compaction: CompactionPolicy::default(),
            handoffs: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_params(mut self, tool_name: impl Into<String>, params: Vec<ParameterSpec>) -> Self {
        self.tool_params.insert(tool_name.into(), params);
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = policy;
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_stop_on_tool_error(mut self, stop: bool) -> Self {
        self.stop_on_tool_error = stop;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionPolicy) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_handoff(mut self, target_snake_name: impl Into<String>, agent: AgentRuntimeRef) -> Self {
        self.handoffs.insert(target_snake_name.into(), agent);
        self
    }

    pub fn build(self) -> ReactAgent {
        ReactAgent { config: self }
    }
}

/// Persisted loop state, round-tripped through the node's `agent_state`
/// channel so a `ToolApprovalRequired` pause can resume exactly where it
/// left off.
#[derive(Default, serde::Serialize, serde::Deserialize)]
struct AgentState {
    messages: Vec<ChatMessage>,
    iteration_count: u32,
    pending_tool_calls: Vec<ToolCallRequest>,
}

pub struct ReactAgent {
    config: ReactAgentConfig,
}

impl ReactAgent {
    pub fn new(config: ReactAgentConfig) -> Self {
        Self { config }
    }

    fn task_id(&self, iteration: u32) -> String {
        format!("{}#{}", self.config.name, iteration)
    }

    fn load_state(&self, value: &SendableValue) -> AgentState {
        if matches!(value, SendableValue::Null) {
            return AgentState::default();
        }
        let json = serde_json::Value::from(value.clone());
        serde_json::from_value(json).unwrap_or_default()
    }

    fn save_state(&self, state: &AgentState) -> SendableValue {
        let json = serde_json::to_value(state).expect("AgentState always serializes");
        SendableValue::from(json)
    }

    async fn run_inner(&self, invocation: AgentInvocation) -> Result<AgentOutcome> {
        let start = Instant::now();
        let mut state = self.load_state(&invocation.state);

        match invocation.resume {
            ToolApprovalResume::Approved => {
                let _ = self.exec_tools(&mut state).await;
            }
            ToolApprovalResume::Cancelled => {
                let task_id = self.task_id(state.iteration_count);
                for call in std::mem::take(&mut state.pending_tool_calls) {
                    let id = deterministic_message_id(&format!("{task_id}-cancel-{}", call.id), Role::Tool);
                    state.messages.push(ChatMessage::tool_result(id, call.id, "cancelled"));
                }
                let note_id = deterministic_message_id(&format!("{task_id}-cancel-note"), Role::System);
                state.messages.push(ChatMessage::system(note_id, "Tool execution was cancelled by the caller."));
            }
            ToolApprovalResume::None if state.messages.is_empty() => {
                let task_id = self.task_id(0);
                if let Some(prompt) = &self.config.system_prompt {
                    state.messages.push(ChatMessage::system(deterministic_message_id(&task_id, Role::System), prompt.clone()));
                }
                state.messages.push(ChatMessage::user(deterministic_message_id(&task_id, Role::User), stringify_value(&invocation.input)));
            }
            ToolApprovalResume::None => {}
        }

        self.model_loop(state, start).await
    }

    async fn model_loop(&self, mut state: AgentState, start: Instant) -> Result<AgentOutcome> {
        loop {
            if state.iteration_count >= self.config.max_iterations {
                return Err(AgentError::MaxIterationsExceeded);
            }

            let llm_input = build_llm_input(&state.messages, &self.config.compaction, self.config.tokenizer.as_ref());
            let tool_schemas = self.config.tools.schemas();
            let response = self
                .config
                .provider
                .generate_with_tool_calls(&llm_input, &tool_schemas, &InferenceOptions::default())
                .await?;

            state.iteration_count += 1;
            let assistant_id = deterministic_message_id(&self.task_id(state.iteration_count), Role::Assistant);

            let mut tool_calls = Vec::with_capacity(response.tool_calls.len());
            for raw in &response.tool_calls {
                let parsed: serde_json::Value = serde_json::from_str(&raw.arguments_json)
                    .map_err(|e| ToolError::InvalidArgumentsJson { tool: raw.name.clone(), error: e.to_string() })?;
                tool_calls.push(ToolCallRequest { id: raw.id.clone(), name: raw.name.clone(), arguments: SendableValue::from(parsed) });
            }

            state.messages.push(ChatMessage::assistant(assistant_id, response.content.clone()).with_tool_calls(tool_calls.clone()));

            if tool_calls.is_empty() {
                return Ok(AgentOutcome::Completed(self.finish(&state, response.content, start)));
            }

            if let Some(outcome) = self.try_handoff(&tool_calls).await? {
                return Ok(outcome);
            }

            let needs_approval = tool_calls.iter().any(|c| self.config.approval_policy.requires_approval(&c.name));
            if needs_approval {
                let pending: Vec<PendingToolCall> = tool_calls
                    .iter()
                    .map(|c| PendingToolCall { id: c.id.clone(), name: c.name.clone(), arguments: c.arguments.clone() })
                    .collect();
                state.pending_tool_calls = tool_calls;
                return Ok(AgentOutcome::ToolApprovalRequired { tool_calls: pending, state: self.save_state(&state) });
            }

            state.pending_tool_calls = tool_calls;
            match self.exec_tools(&mut state).await {
                Ok(()) => {}
                Err(e) if self.config.stop_on_tool_error => return Err(e),
                Err(_) => {}
            }
        }
    }

    /// Short-circuits to a configured handoff target when the model emits
    /// `handoff_to_<snake_target>` (spec.md §4.4 "Handoff detection").
    async fn try_handoff(&self, tool_calls: &[ToolCallRequest]) -> Result<Option<AgentOutcome>> {
        for call in tool_calls {
            if let Some(target) = call.name.strip_prefix("handoff_to_") {
                if let Some(agent) = self.config.handoffs.get(target) {
                    let invocation = AgentInvocation { input: call.arguments.clone(), state: SendableValue::Null, resume: ToolApprovalResume::None };
                    let outcome = agent.run(invocation).await.map_err(|e| AgentError::InternalError(e.to_string()))?;
                    return Ok(Some(outcome));
                }
            }
        }
        Ok(None)
    }

    async fn exec_tools(&self, state: &mut AgentState) -> Result<()> {
        let calls = std::mem::take(&mut state.pending_tool_calls);
        let step = state.iteration_count as u64;

        let outcomes: Vec<(ToolCallRequest, Result<SendableValue>)> = if self.config.parallel_tool_calls {
            let futures = calls.iter().map(|call| async move { (call.clone(), self.invoke_one(call, step).await) });
            futures::future::join_all(futures).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push((call.clone(), self.invoke_one(call, step).await));
            }
            results
        };

        let mut last_error = None;
        for (call, outcome) in outcomes {
            let tool_message_id = deterministic_message_id(&format!("{}-tool-{}", self.task_id(state.iteration_count), call.id), Role::Tool);
            match outcome {
                Ok(value) => state.messages.push(ChatMessage::tool_result(tool_message_id, call.id, stringify_value(&value))),
                Err(e) => {
                    state.messages.push(ChatMessage::tool_result(tool_message_id, call.id, e.to_string()));
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn invoke_one(&self, call: &ToolCallRequest, step: u64) -> Result<SendableValue> {
        if let Some(breaker) = &self.config.circuit_breaker {
            if breaker.is_tripped(&call.name, step) {
                return Err(ToolError::ExecutionFailed { tool: call.name.clone(), error: "circuit breaker open".to_string() }.into());
            }
        }
        if let Some(params) = self.config.tool_params.get(&call.name) {
            validate_arguments(&call.name, params, &call.arguments)?;
        }

        let args_json = serde_json::to_string(&serde_json::Value::from(call.arguments.clone()))?;

        let mut attempt = 0;
        loop {
            match self.config.tools.invoke(&call.name, &args_json).await {
                Ok(value) => {
                    if let Some(breaker) = &self.config.circuit_breaker {
                        breaker.record_success(&call.name);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if let Some(breaker) = &self.config.circuit_breaker {
                        breaker.record_failure(&call.name, step);
                    }
                    if self.config.retry_policy.should_retry(attempt) {
                        tokio::time::sleep(self.config.retry_policy.calculate_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Builds the final `AgentResult`, reconstructing the call/result
    /// records an `AgentResult` surfaces from the canonical message
    /// history rather than tracking a parallel copy through the loop.
    fn finish(&self, state: &AgentState, content: String, start: Instant) -> AgentResult {
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();
        for message in &state.messages {
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    tool_calls.push(ToolCallRecord { id: call.id.clone(), name: call.name.clone(), arguments: call.arguments.clone() });
                }
            }
            if message.role == Role::Tool {
                if let Some(call_id) = &message.tool_call_id {
                    tool_results.push(ToolResultRecord { call_id: call_id.clone(), content: SendableValue::string(message.content.clone()) });
                }
            }
        }

        AgentResult {
            output: SendableValue::string(content),
            tool_calls,
            tool_results,
            iteration_count: state.iteration_count,
            duration: start.elapsed(),
            metadata: Default::default(),
        }
    }
}

#[async_trait]
impl AgentRuntime for ReactAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn run(&self, invocation: AgentInvocation) -> swarm_core::error::Result<AgentOutcome> {
        self.run_inner(invocation).await.map_err(swarm_core::GraphError::from)
    }
}

fn stringify_value(value: &SendableValue) -> String {
    match value {
        SendableValue::String(s) => s.clone(),
        SendableValue::Null => String::new(),
        other => serde_json::Value::from(other.clone()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{FinishReason, InferenceResponse, RawToolCall, ToolSchema};
    use crate::tools::Tool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        calls: AtomicUsize,
        scripts: Vec<InferenceResponse>,
    }

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn generate_with_tool_calls(&self, _messages: &[ChatMessage], _tools: &[ToolSchema], _options: &InferenceOptions) -> Result<InferenceResponse> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scripts[i].clone())
        }
    }

    struct Calc;

    #[async_trait]
    impl Tool for Calc {
        fn name(&self) -> &str {
            "calc"
        }
        fn description(&self) -> &str {
            "adds numbers"
        }
        async fn execute(&self, _args: SendableValue) -> Result<SendableValue> {
            Ok(SendableValue::string("42"))
        }
    }

    fn no_tool_response(content: &str) -> InferenceResponse {
        InferenceResponse { content: content.to_string(), tool_calls: Vec::new(), finish_reason: FinishReason::Stop, token_usage: None }
    }

    #[tokio::test]
    async fn finishes_without_tool_calls() {
        let provider = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0), scripts: vec![no_tool_response("hello")] });
        let agent = ReactAgentConfig::new("greeter", provider).build();
        let outcome = agent.run(AgentInvocation { input: SendableValue::string("hi"), state: SendableValue::Null, resume: ToolApprovalResume::None }).await.unwrap();
        match outcome {
            AgentOutcome::Completed(result) => assert_eq!(result.output, SendableValue::string("hello")),
            AgentOutcome::ToolApprovalRequired { .. } => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn tool_call_with_approval_pauses_then_resumes() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            scripts: vec![
                InferenceResponse {
                    content: "calling calc".to_string(),
                    tool_calls: vec![RawToolCall { id: "call-1".to_string(), name: "calc".to_string(), arguments_json: "{}".to_string() }],
                    finish_reason: FinishReason::ToolCalls,
                    token_usage: None,
                },
                no_tool_response("done"),
            ],
        });

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Calc)).unwrap();

        let agent = ReactAgentConfig::new("calculator", provider).with_tools(tools).with_approval_policy(ApprovalPolicy::Always).build();

        let outcome = agent
            .run(AgentInvocation { input: SendableValue::string("what is 40+2?"), state: SendableValue::Null, resume: ToolApprovalResume::None })
            .await
            .unwrap();

        let state = match outcome {
            AgentOutcome::ToolApprovalRequired { tool_calls, state } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "calc");
                state
            }
            AgentOutcome::Completed(_) => panic!("expected a pending tool approval"),
        };

        let outcome = agent.run(AgentInvocation { input: SendableValue::Null, state, resume: ToolApprovalResume::Approved }).await.unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert_eq!(result.output, SendableValue::string("done"));
                assert_eq!(result.tool_results.len(), 1);
                assert_eq!(result.tool_results[0].call_id, "call-1");
                assert_eq!(result.tool_results[0].content, SendableValue::string("42"));
            }
            AgentOutcome::ToolApprovalRequired { .. } => panic!("expected completion after approval"),
        }
    }

    #[tokio::test]
    async fn cancelled_resume_records_cancellation_and_continues() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            scripts: vec![
                InferenceResponse {
                    content: "calling calc".to_string(),
                    tool_calls: vec![RawToolCall { id: "call-1".to_string(), name: "calc".to_string(), arguments_json: "{}".to_string() }],
                    finish_reason: FinishReason::ToolCalls,
                    token_usage: None,
                },
                no_tool_response("stopped"),
            ],
        });
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Calc)).unwrap();
        let agent = ReactAgentConfig::new("calculator", provider).with_tools(tools).with_approval_policy(ApprovalPolicy::Always).build();

        let outcome = agent
            .run(AgentInvocation { input: SendableValue::string("go"), state: SendableValue::Null, resume: ToolApprovalResume::None })
            .await
            .unwrap();
        let state = match outcome {
            AgentOutcome::ToolApprovalRequired { state, .. } => state,
            AgentOutcome::Completed(_) => panic!("expected a pending tool approval"),
        };

        let outcome = agent.run(AgentInvocation { input: SendableValue::Null, state, resume: ToolApprovalResume::Cancelled }).await.unwrap();
        match outcome {
            AgentOutcome::Completed(result) => assert_eq!(result.output, SendableValue::string("stopped")),
            AgentOutcome::ToolApprovalRequired { .. } => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn max_iterations_exceeded_is_reported() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            scripts: vec![
                InferenceResponse {
                    content: "".to_string(),
                    tool_calls: vec![RawToolCall { id: "c1".to_string(), name: "calc".to_string(), arguments_json: "{}".to_string() }],
                    finish_reason: FinishReason::ToolCalls,
                    token_usage: None,
                };
                3
            ],
        });
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(Calc)).unwrap();
        let agent = ReactAgentConfig::new("looper", provider).with_tools(tools).with_max_iterations(2).build();
        let result = agent.run(AgentInvocation { input: SendableValue::string("go"), state: SendableValue::Null, resume: ToolApprovalResume::None }).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handoff_delegates_to_target_agent() {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
            scripts: vec![InferenceResponse {
                content: "".to_string(),
                tool_calls: vec![RawToolCall { id: "h1".to_string(), name: "handoff_to_specialist".to_string(), arguments_json: r#"{"topic":"refunds"}"#.to_string() }],
                finish_reason: FinishReason::ToolCalls,
                token_usage: None,
            }],
        });
        let specialist_provider = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0), scripts: vec![no_tool_response("handled")] });
        let specialist: AgentRuntimeRef = Arc::new(ReactAgentConfig::new("specialist", specialist_provider).build());

        let agent = ReactAgentConfig::new("router", provider).with_handoff("specialist", specialist).build();
        let outcome = agent.run(AgentInvocation { input: SendableValue::string("route me"), state: SendableValue::Null, resume: ToolApprovalResume::None }).await.unwrap();
        match outcome {
            AgentOutcome::Completed(result) => assert_eq!(result.output, SendableValue::string("handled")),
            AgentOutcome::ToolApprovalRequired { .. } => panic!("expected completion"),
        }
    }
}
