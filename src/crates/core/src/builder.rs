//! The orchestration compiler: lowers the step DSL (spec.md §3 "Orchestration
//! step (DSL)", §4.2) into a compiled [`Graph`] of nodes, static edges, and
//! join edges.
//!
//! Grounded on the ancestor's `StateGraph` builder (`builder.rs`): a
//! fluent-ish internal `GraphBuilder` that accumulates nodes and edges as
//! fragments compile, generalized from the ancestor's single add_node/add_edge
//! API to per-DSL-variant lowering functions, each returning a
//! [`CompiledFragment`] (`entryNodes`, `exitNodes`, `nodeCount`,
//! `maxParallelism`) the way spec.md §3 describes.
//!
//! Every compiled node owns exactly one output channel
//! (`node::output_channel`); a node's declared predecessors are the channels
//! it reads, joined with `\n` when there is more than one (spec.md §4.2 DAG:
//! "input is its predecessors' outputs joined by `\n`" — applied uniformly
//! since every fragment ultimately funnels through the same node contract).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use swarm_checkpoint::{ChannelSpec, ChannelWrite, SendableValue};

use crate::agent::{AgentInvocation, AgentOutcome, AgentRuntimeRef, ToolApprovalResume};
use crate::error::{GraphValidationError, OrchestrationError, Result};
use crate::graph::{Edge, Graph, JoinEdge, NodeId, NodeSpec, OutputProjection};
use crate::interrupt::{InterruptPayload, InterruptRequest};
use crate::node::{output_channel, FnNode, NextDirective, NodeBody, NodeOutput, StoreView};

/// The input channel seeded by the caller's `input` before superstep 0.
pub const INPUT_CHANNEL: &str = "input";

fn stringify(v: &SendableValue) -> String {
    match v {
        SendableValue::String(s) => s.clone(),
        SendableValue::Null => String::new(),
        other => serde_json::Value::from(other.clone()).to_string(),
    }
}

fn join_inputs(store: &StoreView, channels: &[String]) -> SendableValue {
    match channels {
        [] => SendableValue::Null,
        [only] => store.get(only),
        many => SendableValue::String(
            many.iter().map(|c| stringify(&store.get(c))).collect::<Vec<_>>().join("\n"),
        ),
    }
}

// ---------------------------------------------------------------------
// DSL
// ---------------------------------------------------------------------

pub enum OrchestrationStep {
    AgentStep(AgentStepSpec),
    Sequential(Vec<OrchestrationStep>),
    Parallel(ParallelSpec),
    Dag(DagSpec),
    Router(RouterSpec),
    Loop(LoopSpec),
    RepeatWhile(RepeatWhileSpec),
    HumanApproval(HumanApprovalSpec),
    Transform(TransformSpec),
    Guard(GuardSpec),
}

pub struct AgentStepSpec {
    pub name: Option<String>,
    pub agent: AgentRuntimeRef,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ParallelErrorHandling {
    FailFast,
    ContinueOnPartialFailure,
    CollectErrors,
}

pub enum MergeStrategy {
    Concatenate,
    First,
    Longest,
    Structured,
    Custom(Arc<dyn Fn(&[BranchRecord]) -> SendableValue + Send + Sync>),
}

#[derive(Clone)]
pub struct BranchRecord {
    pub group_id: String,
    pub branch_index: usize,
    pub branch_name: String,
    pub output: Option<SendableValue>,
    pub tool_calls: Vec<crate::agent::ToolCallRecord>,
    pub tool_results: Vec<crate::agent::ToolResultRecord>,
    pub iteration_count: u32,
    pub duration: std::time::Duration,
    pub error: Option<String>,
}

pub struct ParallelSpec {
    pub branches: Vec<(String, AgentRuntimeRef)>,
    pub merge: MergeStrategy,
    pub error_handling: ParallelErrorHandling,
    pub max_concurrency: Option<usize>,
}

pub struct DagNodeSpec {
    pub name: String,
    pub depends_on: Vec<String>,
    pub agent: AgentRuntimeRef,
}

pub struct DagSpec {
    pub nodes: Vec<DagNodeSpec>,
}

pub struct Route {
    pub name: String,
    pub condition: Arc<dyn Fn(&SendableValue) -> bool + Send + Sync>,
    pub step: Box<OrchestrationStep>,
}

pub struct RouterSpec {
    pub routes: Vec<Route>,
    pub fallback: Option<Box<OrchestrationStep>>,
}

pub enum LoopCondition {
    MaxIterations(u32),
    Until(Arc<dyn Fn(&SendableValue) -> bool + Send + Sync>),
    WhileTrue(Arc<dyn Fn(&SendableValue) -> bool + Send + Sync>),
}

/// Predicate-driven loops are capped at this many iterations regardless of
/// the predicate (spec.md §4.2 "safety fuse").
pub const PREDICATE_LOOP_SAFETY_FUSE: u32 = 1000;

pub struct LoopSpec {
    pub body: Box<OrchestrationStep>,
    pub condition: LoopCondition,
}

pub struct RepeatWhileSpec {
    pub body: Box<OrchestrationStep>,
    pub predicate: Arc<dyn Fn(&SendableValue) -> bool + Send + Sync>,
    pub max_iterations: u32,
}

pub struct HumanApprovalSpec {
    pub prompt: String,
}

pub struct TransformSpec {
    pub f: Arc<dyn Fn(SendableValue) -> SendableValue + Send + Sync>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Input,
    Output,
    ToolInput,
    ToolOutput,
}

pub enum ValidatorOutcome {
    Passed,
    Warning(String),
    Tripwire(String),
}

pub struct GuardSpec {
    pub stage: GuardStage,
    pub validators: Vec<Arc<dyn Fn(&SendableValue) -> ValidatorOutcome + Send + Sync>>,
}

// ---------------------------------------------------------------------
// Compiled output
// ---------------------------------------------------------------------

/// `entryNodes`/`exitNodes`/`nodeCount`/`maxParallelism` for one compiled
/// fragment (spec.md §3).
#[derive(Debug, Clone)]
pub struct CompiledFragment {
    pub entry_nodes: Vec<NodeId>,
    pub exit_nodes: Vec<NodeId>,
    pub node_count: usize,
    pub max_parallelism: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphMetrics {
    pub node_count: usize,
    pub max_parallelism: usize,
    pub recommended_max_steps: u64,
}

pub struct CompiledGraph {
    pub graph: Graph,
    pub metrics: GraphMetrics,
    pub channel_specs: Vec<ChannelSpec>,
}

// ---------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------

struct GraphBuilder {
    nodes: HashMap<NodeId, NodeSpec>,
    edges: Vec<Edge>,
    join_edges: Vec<JoinEdge>,
    channel_specs: HashMap<String, ChannelSpec>,
    counter: u64,
}

impl GraphBuilder {
    fn new() -> Self {
        let mut channel_specs = HashMap::new();
        channel_specs.insert(INPUT_CHANNEL.to_string(), ChannelSpec::last_value(INPUT_CHANNEL));
        Self { nodes: HashMap::new(), edges: Vec::new(), join_edges: Vec::new(), channel_specs, counter: 0 }
    }

    fn fresh_id(&mut self, prefix: &str) -> NodeId {
        self.counter += 1;
        format!("{prefix}_{}", self.counter)
    }

    fn register_channel(&mut self, spec: ChannelSpec) {
        self.channel_specs.insert(spec.key.clone(), spec);
    }

    fn add_node(&mut self, id: NodeId, body: Arc<dyn NodeBody>) {
        self.register_channel(ChannelSpec::last_value(output_channel(&id)));
        self.nodes.insert(id.clone(), NodeSpec { id, body });
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.edges.push(Edge { from, to });
    }

    fn add_join_edge(&mut self, node: NodeId, parents: Vec<NodeId>) {
        self.join_edges.push(JoinEdge { node, parents });
    }
}

fn passthrough_node(input_channels: Vec<String>) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let value = join_inputs(&store, &input_channels);
        async move { Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), value)) }
    }))
}

fn transform_node(input_channels: Vec<String>, f: Arc<dyn Fn(SendableValue) -> SendableValue + Send + Sync>) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let input = join_inputs(&store, &input_channels);
        let f = f.clone();
        async move {
            let output = f(input);
            Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), output))
        }
    }))
}

fn guard_node(
    input_channels: Vec<String>,
    validators: Vec<Arc<dyn Fn(&SendableValue) -> ValidatorOutcome + Send + Sync>>,
) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let input = join_inputs(&store, &input_channels);
        let validators = validators.clone();
        async move {
            for validator in &validators {
                if let ValidatorOutcome::Tripwire(reason) = validator(&input) {
                    return Err(OrchestrationError::WorkflowInterrupted(reason).into());
                }
            }
            Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), input))
        }
    }))
}

fn agent_node(input_channels: Vec<String>, agent: AgentRuntimeRef) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let input = join_inputs(&store, &input_channels);
        let agent = agent.clone();
        async move {
            let state_channel = format!("agent_state:{node_id}");
            let resume_channel = format!("resume:{node_id}");
            let resume = match store.get(&resume_channel) {
                SendableValue::Dict(decision) => match decision.get("kind").and_then(|v| v.as_str()) {
                    Some("approved") => ToolApprovalResume::Approved,
                    Some("cancelled") => ToolApprovalResume::Cancelled,
                    _ => ToolApprovalResume::None,
                },
                _ => ToolApprovalResume::None,
            };
            let invocation = AgentInvocation { input, state: store.get(&state_channel), resume };
            match agent.run(invocation).await? {
                AgentOutcome::Completed(result) => {
                    Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), result.output))
                }
                AgentOutcome::ToolApprovalRequired { tool_calls, state } => {
                    let mut out = NodeOutput::interrupted(InterruptRequest {
                        id: node_id.clone(),
                        node_id: node_id.clone(),
                        payload: InterruptPayload::ToolApprovalRequired {
                            tool_calls: tool_calls
                                .into_iter()
                                .map(|c| crate::interrupt::PendingToolCall { id: c.id, name: c.name, arguments: c.arguments })
                                .collect(),
                        },
                    });
                    out.writes.push(ChannelWrite { channel: state_channel, producer_node_id: node_id.clone(), value: state });
                    Ok(out)
                }
            }
        }
    }))
}

fn human_approval_node(input_channels: Vec<String>, prompt: String) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let input = join_inputs(&store, &input_channels);
        let prompt = prompt.clone();
        async move {
            let resume_channel = format!("resume:{node_id}");
            let resume = store.get(&resume_channel);
            match resume {
                SendableValue::Null => Ok(NodeOutput::interrupted(InterruptRequest {
                    id: node_id.clone(),
                    node_id: node_id.clone(),
                    payload: InterruptPayload::HumanApprovalRequired {
                        prompt: prompt.clone(),
                        current_output: input,
                    },
                })),
                SendableValue::Dict(decision) => {
                    let output = match decision.get("kind").and_then(|v| v.as_str()) {
                        Some("approved") => input,
                        Some("modified") => decision.get("value").cloned().unwrap_or(SendableValue::Null),
                        Some("rejected") => {
                            let reason = decision
                                .get("reason")
                                .and_then(|v| v.as_str())
                                .unwrap_or("")
                                .to_string();
                            return Err(OrchestrationError::HumanApprovalRejected { prompt, reason }.into());
                        }
                        _ => input,
                    };
                    Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), output))
                }
                other => Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), other)),
            }
        }
    }))
}

// ---------------------------------------------------------------------
// Per-variant lowering
// ---------------------------------------------------------------------

fn compile_step(builder: &mut GraphBuilder, step: &OrchestrationStep, input_channels: Vec<String>) -> Result<CompiledFragment> {
    match step {
        OrchestrationStep::AgentStep(spec) => compile_agent_step(builder, spec, input_channels),
        OrchestrationStep::Sequential(steps) => compile_sequential(builder, steps, input_channels),
        OrchestrationStep::Parallel(spec) => compile_parallel(builder, spec, input_channels),
        OrchestrationStep::Dag(spec) => compile_dag(builder, spec, input_channels),
        OrchestrationStep::Router(spec) => compile_router(builder, spec, input_channels),
        OrchestrationStep::Loop(spec) => compile_loop(builder, spec, input_channels),
        OrchestrationStep::RepeatWhile(spec) => compile_repeat_while(builder, spec, input_channels),
        OrchestrationStep::HumanApproval(spec) => compile_human_approval(builder, spec, input_channels),
        OrchestrationStep::Transform(spec) => compile_transform(builder, spec, input_channels),
        OrchestrationStep::Guard(spec) => compile_guard(builder, spec, input_channels),
    }
}

fn compile_agent_step(builder: &mut GraphBuilder, spec: &AgentStepSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let prefix = spec.name.clone().unwrap_or_else(|| "agent".to_string());
    let id = builder.fresh_id(&prefix);
    builder.register_channel(ChannelSpec::last_value(format!("agent_state:{id}")));
    builder.register_channel(ChannelSpec::ephemeral(format!("resume:{id}")));
    builder.add_node(id.clone(), agent_node(input_channels, spec.agent.clone()));
    Ok(CompiledFragment { entry_nodes: vec![id.clone()], exit_nodes: vec![id], node_count: 1, max_parallelism: 1 })
}

fn compile_transform(builder: &mut GraphBuilder, spec: &TransformSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let id = builder.fresh_id("transform");
    builder.add_node(id.clone(), transform_node(input_channels, spec.f.clone()));
    Ok(CompiledFragment { entry_nodes: vec![id.clone()], exit_nodes: vec![id], node_count: 1, max_parallelism: 1 })
}

fn compile_guard(builder: &mut GraphBuilder, spec: &GuardSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let id = builder.fresh_id("guard");
    builder.add_node(id.clone(), guard_node(input_channels, spec.validators.clone()));
    Ok(CompiledFragment { entry_nodes: vec![id.clone()], exit_nodes: vec![id], node_count: 1, max_parallelism: 1 })
}

fn compile_human_approval(builder: &mut GraphBuilder, spec: &HumanApprovalSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let id = builder.fresh_id("human_approval");
    builder.register_channel(ChannelSpec::ephemeral(format!("resume:{id}")));
    builder.add_node(id.clone(), human_approval_node(input_channels, spec.prompt.clone()));
    Ok(CompiledFragment { entry_nodes: vec![id.clone()], exit_nodes: vec![id], node_count: 1, max_parallelism: 1 })
}

fn compile_sequential(builder: &mut GraphBuilder, steps: &[OrchestrationStep], input_channels: Vec<String>) -> Result<CompiledFragment> {
    let mut current_inputs = input_channels;
    let mut entry_nodes: Option<Vec<NodeId>> = None;
    let mut exit_nodes: Vec<NodeId> = Vec::new();
    let mut node_count = 0;
    let mut max_parallelism = 1;

    for step in steps {
        let fragment = compile_step(builder, step, current_inputs.clone())?;
        for from in &exit_nodes {
            for to in &fragment.entry_nodes {
                builder.add_edge(from.clone(), to.clone());
            }
        }
        if entry_nodes.is_none() {
            entry_nodes = Some(fragment.entry_nodes.clone());
        }
        node_count += fragment.node_count;
        max_parallelism = max_parallelism.max(fragment.max_parallelism);
        current_inputs = fragment.exit_nodes.iter().map(|n| output_channel(n)).collect();
        exit_nodes = fragment.exit_nodes;
    }

    Ok(CompiledFragment {
        entry_nodes: entry_nodes.unwrap_or_default(),
        exit_nodes,
        node_count,
        max_parallelism,
    })
}

fn merge_records(strategy: &MergeStrategy, records: &[BranchRecord]) -> SendableValue {
    match strategy {
        MergeStrategy::Concatenate => SendableValue::String(
            records
                .iter()
                .filter_map(|r| r.output.as_ref().map(stringify))
                .collect::<Vec<_>>()
                .join("\n\n"),
        ),
        MergeStrategy::First => records
            .iter()
            .find_map(|r| r.output.clone())
            .unwrap_or(SendableValue::Null),
        MergeStrategy::Longest => records
            .iter()
            .filter_map(|r| r.output.clone())
            .max_by_key(|v| stringify(v).len())
            .unwrap_or(SendableValue::Null),
        MergeStrategy::Structured => SendableValue::String(
            records
                .iter()
                .map(|r| format!("## {}\n\n{}", r.branch_name, r.output.as_ref().map(stringify).unwrap_or_default()))
                .collect::<Vec<_>>()
                .join("\n\n"),
        ),
        MergeStrategy::Custom(f) => f(records),
    }
}

fn compile_parallel(builder: &mut GraphBuilder, spec: &ParallelSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let dispatch_id = builder.fresh_id("dispatch");
    builder.add_node(dispatch_id.clone(), passthrough_node(input_channels));

    let results_channel = format!("parallelBranchResults:{dispatch_id}");
    builder.register_channel(ChannelSpec::accumulator(
        results_channel.clone(),
        SendableValue::Array(Vec::new()),
        Arc::new(|current, update| {
            let mut items = match current {
                SendableValue::Array(items) => items.clone(),
                _ => Vec::new(),
            };
            items.push(update.clone());
            SendableValue::Array(items)
        }),
    ));

    let dispatch_output = output_channel(&dispatch_id);
    let mut branch_exits = Vec::new();
    let error_handling = spec.error_handling;

    for (idx, (name, agent)) in spec.branches.iter().enumerate() {
        let branch_id = builder.fresh_id(&format!("branch_{name}"));
        builder.add_edge(dispatch_id.clone(), branch_id.clone());

        let dispatch_output = dispatch_output.clone();
        let results_channel = results_channel.clone();
        let name = name.clone();
        let agent = agent.clone();

        let group_id = dispatch_id.clone();

        let body: Arc<dyn NodeBody> = Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
            let input = store.get(&dispatch_output);
            let agent = agent.clone();
            let name = name.clone();
            let results_channel = results_channel.clone();
            let group_id = group_id.clone();
            async move {
                let invocation = crate::agent::AgentInvocation {
                    input,
                    state: SendableValue::Null,
                    resume: crate::agent::ToolApprovalResume::None,
                };
                let record = match agent.run(invocation).await {
                    Ok(crate::agent::AgentOutcome::Completed(result)) => record_dict(&group_id, idx, &name, Ok(&result)),
                    Ok(crate::agent::AgentOutcome::ToolApprovalRequired { .. }) => {
                        let err: crate::error::GraphError = OrchestrationError::UnsupportedStep(
                            "tool approval is not supported inside a parallel branch".to_string(),
                        )
                        .into();
                        if error_handling == ParallelErrorHandling::FailFast {
                            return Err(err);
                        }
                        record_dict(&group_id, idx, &name, Err(err.to_string()))
                    }
                    Err(err) => {
                        if error_handling == ParallelErrorHandling::FailFast {
                            return Err(err);
                        }
                        record_dict(&group_id, idx, &name, Err(err.to_string()))
                    }
                };
                Ok(NodeOutput {
                    writes: vec![swarm_checkpoint::ChannelWrite {
                        channel: results_channel,
                        producer_node_id: node_id.clone(),
                        value: record,
                    }],
                    next: NextDirective::UseGraphEdges,
                    interrupt: None,
                })
            }
        }));
        builder.add_node(branch_id.clone(), body);
        branch_exits.push(branch_id);
    }

    let merge_id = builder.fresh_id("merge");
    builder.add_join_edge(merge_id.clone(), branch_exits.clone());
    for exit in &branch_exits {
        builder.add_edge(exit.clone(), merge_id.clone());
    }

    let merge_strategy_records = {
        let results_channel = results_channel.clone();
        let merge = spec.merge_clone();
        let dispatch_id = dispatch_id.clone();
        Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
            let raw = store.get(&results_channel);
            let merge = merge.clone();
            let dispatch_id = dispatch_id.clone();
            async move {
                let mut records: Vec<BranchRecord> = match raw {
                    SendableValue::Array(items) => items
                        .iter()
                        .map(dict_to_record)
                        .filter(|r| r.group_id == dispatch_id)
                        .collect(),
                    _ => Vec::new(),
                };
                records.sort_by_key(|r| r.branch_index);
                let failures: Vec<String> = records.iter().filter_map(|r| r.error.clone()).collect();
                if !failures.is_empty() && failures.len() == records.len() {
                    return Err(OrchestrationError::AllAgentsFailed(failures).into());
                }
                let merged = merge_records(&merge, &records);
                Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), merged))
            }
        })) as Arc<dyn NodeBody>
    };
    builder.add_node(merge_id.clone(), merge_strategy_records);

    let branch_count = spec.branches.len();
    let max_parallelism = branch_count.min(spec.max_concurrency.unwrap_or(branch_count)).max(1);

    Ok(CompiledFragment {
        entry_nodes: vec![dispatch_id],
        exit_nodes: vec![merge_id],
        node_count: 2 + branch_count,
        max_parallelism,
    })
}

fn tool_calls_to_value(calls: &[crate::agent::ToolCallRecord]) -> SendableValue {
    SendableValue::Array(
        calls
            .iter()
            .map(|c| {
                let mut d = std::collections::BTreeMap::new();
                d.insert("id".to_string(), SendableValue::string(c.id.as_str()));
                d.insert("name".to_string(), SendableValue::string(c.name.as_str()));
                d.insert("arguments".to_string(), c.arguments.clone());
                SendableValue::Dict(d)
            })
            .collect(),
    )
}

fn tool_calls_from_value(value: &SendableValue) -> Vec<crate::agent::ToolCallRecord> {
    match value {
        SendableValue::Array(items) => items
            .iter()
            .filter_map(|item| {
                let d = item.as_dict()?;
                Some(crate::agent::ToolCallRecord {
                    id: d.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    name: d.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    arguments: d.get("arguments").cloned().unwrap_or(SendableValue::Null),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn tool_results_to_value(results: &[crate::agent::ToolResultRecord]) -> SendableValue {
    SendableValue::Array(
        results
            .iter()
            .map(|r| {
                let mut d = std::collections::BTreeMap::new();
                d.insert("callId".to_string(), SendableValue::string(r.call_id.as_str()));
                d.insert("content".to_string(), r.content.clone());
                SendableValue::Dict(d)
            })
            .collect(),
    )
}

fn tool_results_from_value(value: &SendableValue) -> Vec<crate::agent::ToolResultRecord> {
    match value {
        SendableValue::Array(items) => items
            .iter()
            .filter_map(|item| {
                let d = item.as_dict()?;
                Some(crate::agent::ToolResultRecord {
                    call_id: d.get("callId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    content: d.get("content").cloned().unwrap_or(SendableValue::Null),
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Builds the typed `parallelBranchResults` record (spec.md: `{groupId,
/// branchIndex, branchName, output, toolCalls, toolResults, iterationCount,
/// metadata, error?}`) for one branch, either from a completed
/// `AgentResult` or from an error string.
fn record_dict(
    group_id: &str,
    idx: usize,
    name: &str,
    outcome: std::result::Result<&crate::agent::AgentResult, String>,
) -> SendableValue {
    let mut dict = std::collections::BTreeMap::new();
    dict.insert("groupId".to_string(), SendableValue::string(group_id));
    dict.insert("branchIndex".to_string(), SendableValue::Int(idx as i64));
    dict.insert("branchName".to_string(), SendableValue::string(name));
    match outcome {
        Ok(result) => {
            dict.insert("output".to_string(), result.output.clone());
            dict.insert("toolCalls".to_string(), tool_calls_to_value(&result.tool_calls));
            dict.insert("toolResults".to_string(), tool_results_to_value(&result.tool_results));
            dict.insert("iterationCount".to_string(), SendableValue::Int(result.iteration_count as i64));
            dict.insert("durationMs".to_string(), SendableValue::Int(result.duration.as_millis() as i64));
            dict.insert("metadata".to_string(), SendableValue::Dict(result.metadata.clone()));
        }
        Err(err) => {
            dict.insert("output".to_string(), SendableValue::Null);
            dict.insert("toolCalls".to_string(), SendableValue::Array(Vec::new()));
            dict.insert("toolResults".to_string(), SendableValue::Array(Vec::new()));
            dict.insert("iterationCount".to_string(), SendableValue::Int(0));
            dict.insert("durationMs".to_string(), SendableValue::Int(0));
            dict.insert("metadata".to_string(), SendableValue::Dict(std::collections::BTreeMap::new()));
            dict.insert("error".to_string(), SendableValue::string(err));
        }
    }
    SendableValue::Dict(dict)
}

fn dict_to_record(value: &SendableValue) -> BranchRecord {
    let dict = value.as_dict().cloned().unwrap_or_default();
    BranchRecord {
        group_id: dict.get("groupId").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        branch_index: dict.get("branchIndex").and_then(|v| match v {
            SendableValue::Int(i) => Some(*i as usize),
            _ => None,
        }).unwrap_or(0),
        branch_name: dict.get("branchName").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        output: dict.get("output").cloned(),
        tool_calls: dict.get("toolCalls").map(tool_calls_from_value).unwrap_or_default(),
        tool_results: dict.get("toolResults").map(tool_results_from_value).unwrap_or_default(),
        iteration_count: dict.get("iterationCount").and_then(|v| match v {
            SendableValue::Int(i) => Some(*i as u32),
            _ => None,
        }).unwrap_or(0),
        duration: dict.get("durationMs").and_then(|v| match v {
            SendableValue::Int(ms) => Some(std::time::Duration::from_millis((*ms).max(0) as u64)),
            _ => None,
        }).unwrap_or_default(),
        error: dict.get("error").and_then(|v| v.as_str()).map(|s| s.to_string()),
    }
}

impl ParallelSpec {
    fn merge_clone(&self) -> MergeStrategy {
        match &self.merge {
            MergeStrategy::Concatenate => MergeStrategy::Concatenate,
            MergeStrategy::First => MergeStrategy::First,
            MergeStrategy::Longest => MergeStrategy::Longest,
            MergeStrategy::Structured => MergeStrategy::Structured,
            MergeStrategy::Custom(f) => MergeStrategy::Custom(f.clone()),
        }
    }
}

fn validate_dag(spec: &DagSpec) -> Result<()> {
    if spec.nodes.is_empty() {
        return Err(GraphValidationError::EmptyGraph.into());
    }
    let mut seen = HashSet::new();
    for node in &spec.nodes {
        if !seen.insert(node.name.clone()) {
            return Err(GraphValidationError::DuplicateNode(node.name.clone()).into());
        }
    }
    for node in &spec.nodes {
        for dep in &node.depends_on {
            if !seen.contains(dep) {
                return Err(GraphValidationError::UnknownDependency {
                    node: node.name.clone(),
                    dep: dep.clone(),
                    available: spec.nodes.iter().map(|n| n.name.clone()).collect(),
                }
                .into());
            }
        }
    }

    // Kahn's algorithm.
    let mut in_degree: HashMap<&str, usize> =
        spec.nodes.iter().map(|n| (n.name.as_str(), n.depends_on.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in &spec.nodes {
        for dep in &node.depends_on {
            dependents.entry(dep.as_str()).or_default().push(node.name.as_str());
        }
    }
    let mut queue: VecDeque<&str> =
        in_degree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| *n).collect();
    let mut visited = 0;
    while let Some(node) = queue.pop_front() {
        visited += 1;
        if let Some(children) = dependents.get(node) {
            for child in children {
                let degree = in_degree.get_mut(child).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }
    if visited != spec.nodes.len() {
        let remaining: Vec<String> =
            in_degree.iter().filter(|(_, d)| **d > 0).map(|(n, _)| n.to_string()).collect();
        return Err(GraphValidationError::CycleDetected(remaining).into());
    }
    Ok(())
}

fn compile_dag(builder: &mut GraphBuilder, spec: &DagSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    validate_dag(spec)?;

    let mut ids: HashMap<String, NodeId> = HashMap::new();
    for node in &spec.nodes {
        ids.insert(node.name.clone(), builder.fresh_id(&format!("dag_{}", node.name)));
    }

    let mut roots = Vec::new();
    for node in &spec.nodes {
        let id = ids[&node.name].clone();
        let dep_channels: Vec<String> = if node.depends_on.is_empty() {
            roots.push(id.clone());
            input_channels.clone()
        } else {
            node.depends_on.iter().map(|d| output_channel(&ids[d])).collect()
        };
        builder.add_node(id.clone(), agent_node(dep_channels, node.agent.clone()));
        if !node.depends_on.is_empty() {
            let parents: Vec<NodeId> = node.depends_on.iter().map(|d| ids[d].clone()).collect();
            for parent in &parents {
                builder.add_edge(parent.clone(), id.clone());
            }
            builder.add_join_edge(id, parents);
        }
    }

    let has_dependents: HashSet<&str> =
        spec.nodes.iter().flat_map(|n| n.depends_on.iter().map(|d| d.as_str())).collect();
    let leaves: Vec<NodeId> = spec
        .nodes
        .iter()
        .filter(|n| !has_dependents.contains(n.name.as_str()))
        .map(|n| ids[&n.name].clone())
        .collect();

    let finalizer_id = builder.fresh_id("dag_finalizer");
    for leaf in &leaves {
        builder.add_edge(leaf.clone(), finalizer_id.clone());
    }
    builder.add_join_edge(finalizer_id.clone(), leaves.clone());

    // "last leaf to finish wins": since finish order isn't tracked at
    // runtime, the leaf deepest in the DAG (furthest from the roots) stands
    // in for "last to finish" deterministically.
    let names_by_id: HashMap<NodeId, &str> = ids.iter().map(|(name, id)| (id.clone(), name.as_str())).collect();
    let depths = node_depths(spec);
    let mut ranked_leaves = leaves.clone();
    ranked_leaves.sort_by_key(|leaf| {
        let name = names_by_id.get(leaf).copied().unwrap_or("");
        depths.get(name).copied().unwrap_or(0)
    });
    let winning_channel = output_channel(ranked_leaves.last().expect("dag has at least one leaf"));
    builder.add_node(finalizer_id.clone(), passthrough_node(vec![winning_channel]));

    Ok(CompiledFragment {
        entry_nodes: roots,
        exit_nodes: vec![finalizer_id],
        node_count: spec.nodes.len() + 1,
        max_parallelism: max_antichain(&depths),
    })
}

fn node_depths(spec: &DagSpec) -> HashMap<&str, usize> {
    let mut depth: HashMap<&str, usize> = HashMap::new();
    for node in &spec.nodes {
        let d = node.depends_on.iter().map(|dep| depth.get(dep.as_str()).copied().unwrap_or(0) + 1).max().unwrap_or(0);
        depth.insert(node.name.as_str(), d);
    }
    depth
}

fn max_antichain(depth: &HashMap<&str, usize>) -> usize {
    let mut by_depth: HashMap<usize, usize> = HashMap::new();
    for d in depth.values() {
        *by_depth.entry(*d).or_insert(0) += 1;
    }
    by_depth.values().copied().max().unwrap_or(1)
}

fn compile_router(builder: &mut GraphBuilder, spec: &RouterSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    let eval_id = builder.fresh_id("router_eval");
    let eval_output = output_channel(&eval_id);

    let mut route_entries = Vec::new();
    let mut route_exits: Vec<NodeId> = Vec::new();
    let mut node_count = 1;
    let mut max_parallelism = 1;

    for route in &spec.routes {
        let fragment = compile_step(builder, &route.step, vec![eval_output.clone()])?;
        builder.add_edge(eval_id.clone(), fragment.entry_nodes[0].clone());
        route_entries.push((route.condition.clone(), fragment.entry_nodes[0].clone()));
        route_exits.extend(fragment.exit_nodes.iter().cloned());
        node_count += fragment.node_count;
        max_parallelism = max_parallelism.max(fragment.max_parallelism);
    }

    let fallback_entry = if let Some(fallback) = &spec.fallback {
        let fragment = compile_step(builder, fallback, vec![eval_output.clone()])?;
        builder.add_edge(eval_id.clone(), fragment.entry_nodes[0].clone());
        route_exits.extend(fragment.exit_nodes.iter().cloned());
        node_count += fragment.node_count;
        Some(fragment.entry_nodes[0].clone())
    } else {
        None
    };

    builder.add_node(
        eval_id.clone(),
        Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
            let input = join_inputs(&store, &input_channels);
            let route_entries = route_entries.clone();
            let fallback_entry = fallback_entry.clone();
            async move {
                let chosen = route_entries
                    .iter()
                    .find(|(cond, _)| cond(&input))
                    .map(|(_, entry)| entry.clone())
                    .or(fallback_entry);
                match chosen {
                    Some(entry) => Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), input)
                        .with_next(NextDirective::Explicit(vec![entry]))),
                    None => Err(OrchestrationError::RoutingFailed.into()),
                }
            }
        })),
    );

    let converge_id = builder.fresh_id("router_converge");
    for exit in &route_exits {
        builder.add_edge(exit.clone(), converge_id.clone());
    }
    let route_exit_channels: Vec<String> = route_exits.iter().map(|n| output_channel(n)).collect();
    builder.add_node(
        converge_id.clone(),
        Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
            let route_exit_channels = route_exit_channels.clone();
            async move {
                // Exactly one route fires per invocation; every other route's
                // output channel still holds its unwritten `Null` initial value.
                let winner = route_exit_channels
                    .iter()
                    .map(|c| store.get(c))
                    .find(|v| !matches!(v, SendableValue::Null))
                    .unwrap_or(SendableValue::Null);
                Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), winner))
            }
        })),
    );

    Ok(CompiledFragment {
        entry_nodes: vec![eval_id],
        exit_nodes: vec![converge_id],
        node_count: node_count + 1,
        max_parallelism,
    })
}

fn compile_loop(builder: &mut GraphBuilder, spec: &LoopSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    compile_loop_like(builder, &spec.body, input_channels, LoopDecision::Loop(&spec.condition))
}

fn compile_repeat_while(builder: &mut GraphBuilder, spec: &RepeatWhileSpec, input_channels: Vec<String>) -> Result<CompiledFragment> {
    compile_loop_like(builder, &spec.body, input_channels, LoopDecision::RepeatWhile(spec.predicate.clone(), spec.max_iterations))
}

enum LoopDecision<'a> {
    Loop(&'a LoopCondition),
    RepeatWhile(Arc<dyn Fn(&SendableValue) -> bool + Send + Sync>, u32),
}

fn compile_loop_like(
    builder: &mut GraphBuilder,
    body: &OrchestrationStep,
    input_channels: Vec<String>,
    decision: LoopDecision<'_>,
) -> Result<CompiledFragment> {
    let loop_id = builder.fresh_id("loop");
    let state_channel = format!("loopstate:{loop_id}");
    builder.register_channel(ChannelSpec::last_value(state_channel.clone()));
    let iter_channel = format!("loopiter:{loop_id}");
    builder.register_channel(ChannelSpec::accumulator(
        iter_channel.clone(),
        SendableValue::Int(0),
        Arc::new(|current, _update| match current {
            SendableValue::Int(n) => SendableValue::Int(n + 1),
            _ => SendableValue::Int(1),
        }),
    ));

    let entry_id = builder.fresh_id("loop_entry");
    builder.add_node(entry_id.clone(), passthrough_node_to(input_channels, state_channel.clone()));

    let cond_id = builder.fresh_id("loop_cond");
    builder.add_edge(entry_id.clone(), cond_id.clone());

    let body_fragment = compile_step(builder, body, vec![state_channel.clone()])?;
    for entry in &body_fragment.entry_nodes {
        builder.add_edge(cond_id.clone(), entry.clone());
    }

    let sink_id = builder.fresh_id("loop_sink");
    for exit in &body_fragment.exit_nodes {
        builder.add_edge(exit.clone(), sink_id.clone());
    }
    if body_fragment.exit_nodes.len() > 1 {
        builder.add_join_edge(sink_id.clone(), body_fragment.exit_nodes.clone());
    }
    let body_exit_channels: Vec<String> = body_fragment.exit_nodes.iter().map(|n| output_channel(n)).collect();
    builder.add_node(sink_id.clone(), passthrough_node_to(body_exit_channels, state_channel.clone()));
    builder.add_edge(sink_id.clone(), cond_id.clone());

    let should_continue: Arc<dyn Fn(&SendableValue, i64) -> bool + Send + Sync> = match decision {
        LoopDecision::Loop(LoopCondition::MaxIterations(n)) => {
            let n = *n as i64;
            Arc::new(move |_value, iteration| iteration < n)
        }
        LoopDecision::Loop(LoopCondition::Until(pred)) => {
            let pred = pred.clone();
            let fuse = PREDICATE_LOOP_SAFETY_FUSE as i64;
            Arc::new(move |value, iteration| iteration < fuse && !pred(value))
        }
        LoopDecision::Loop(LoopCondition::WhileTrue(pred)) => {
            let pred = pred.clone();
            let fuse = PREDICATE_LOOP_SAFETY_FUSE as i64;
            Arc::new(move |value, iteration| iteration < fuse && pred(value))
        }
        LoopDecision::RepeatWhile(pred, max_iterations) => {
            let max_iterations = max_iterations as i64;
            Arc::new(move |value, iteration| iteration < max_iterations && pred(value))
        }
    };

    let state_channel_for_cond = state_channel.clone();
    let iter_channel_for_cond = iter_channel.clone();
    let body_entries = body_fragment.entry_nodes.clone();
    builder.add_node(
        cond_id.clone(),
        Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
            let value = store.get(&state_channel_for_cond);
            let iteration = match store.get(&iter_channel_for_cond) {
                SendableValue::Int(n) => n,
                _ => 0,
            };
            let should_continue = should_continue.clone();
            let body_entries = body_entries.clone();
            async move {
                if should_continue(&value, iteration) {
                    Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), value.clone())
                        .with_next(NextDirective::Explicit(body_entries)))
                } else {
                    Ok(NodeOutput::write(output_channel(&node_id), node_id.clone(), value))
                }
            }
        })),
    );

    Ok(CompiledFragment {
        entry_nodes: vec![entry_id],
        exit_nodes: vec![cond_id],
        node_count: 3 + body_fragment.node_count,
        max_parallelism: body_fragment.max_parallelism.max(1),
    })
}

fn passthrough_node_to(input_channels: Vec<String>, sink_channel: String) -> Arc<dyn NodeBody> {
    Arc::new(FnNode(move |node_id: NodeId, store: StoreView, _step: u64| {
        let value = join_inputs(&store, &input_channels);
        let sink_channel = sink_channel.clone();
        async move {
            Ok(NodeOutput {
                writes: vec![
                    swarm_checkpoint::ChannelWrite { channel: sink_channel, producer_node_id: node_id.clone(), value: value.clone() },
                    swarm_checkpoint::ChannelWrite { channel: output_channel(&node_id), producer_node_id: node_id.clone(), value },
                ],
                next: NextDirective::UseGraphEdges,
                interrupt: None,
            })
        }
    }))
}

fn step_budget(step: &OrchestrationStep) -> u64 {
    match step {
        OrchestrationStep::Sequential(steps) => steps.iter().map(step_budget).sum::<u64>().max(1),
        OrchestrationStep::Parallel(_) => 3,
        OrchestrationStep::Dag(spec) => spec.nodes.len() as u64 + 1,
        OrchestrationStep::Router(spec) => {
            1 + spec.routes.iter().map(|r| step_budget(&r.step)).max().unwrap_or(1)
        }
        OrchestrationStep::Loop(spec) => {
            let n = match &spec.condition {
                LoopCondition::MaxIterations(n) => *n as u64,
                _ => PREDICATE_LOOP_SAFETY_FUSE as u64,
            };
            2 * n + 1
        }
        OrchestrationStep::RepeatWhile(spec) => 2 * spec.max_iterations as u64 + 1,
        OrchestrationStep::HumanApproval(_) => 1,
        OrchestrationStep::AgentStep(_) => 1,
        OrchestrationStep::Transform(_) => 1,
        OrchestrationStep::Guard(_) => 1,
    }
}

/// Compiles a top-level list of orchestration steps into a ready-to-run
/// graph (spec.md §6.1 `compile`).
pub fn compile(steps: Vec<OrchestrationStep>) -> Result<CompiledGraph> {
    if steps.is_empty() {
        return Err(GraphValidationError::EmptyGraph.into());
    }

    let mut builder = GraphBuilder::new();
    let recommended_max_steps: u64 = steps.iter().map(step_budget).sum();
    let fragment = compile_sequential(&mut builder, &steps, vec![INPUT_CHANNEL.to_string()])?;

    let output_channels: Vec<String> = fragment.exit_nodes.iter().map(|n| output_channel(n)).collect();
    let graph = Graph {
        nodes: builder.nodes,
        edges: builder.edges,
        join_edges: builder.join_edges,
        start_frontier: fragment.entry_nodes,
        output_projection: OutputProjection::Channels(output_channels),
    };
    graph.validate()?;

    let description = graph.describe();
    let metrics = GraphMetrics {
        node_count: description.node_count,
        max_parallelism: description.max_parallelism.max(fragment.max_parallelism),
        recommended_max_steps,
    };

    Ok(CompiledGraph { graph, metrics, channel_specs: builder.channel_specs.into_values().collect() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::agent::{AgentInvocation, AgentOutcome, AgentResult, AgentRuntime};

    struct Echo;

    #[async_trait]
    impl AgentRuntime for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        async fn run(&self, invocation: AgentInvocation) -> Result<AgentOutcome> {
            Ok(AgentOutcome::Completed(AgentResult::simple(invocation.input)))
        }
    }

    fn agent_step(name: &str) -> OrchestrationStep {
        OrchestrationStep::AgentStep(AgentStepSpec { name: Some(name.to_string()), agent: Arc::new(Echo) })
    }

    fn fresh_builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    #[test]
    fn sequential_chains_entry_to_exit_across_steps() {
        let mut builder = fresh_builder();
        let steps = vec![agent_step("a"), agent_step("b"), agent_step("c")];
        let fragment = compile_sequential(&mut builder, &steps, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        assert_eq!(fragment.node_count, 3);
        assert_eq!(fragment.max_parallelism, 1);
        assert_ne!(fragment.entry_nodes[0], fragment.exit_nodes[0]);
    }

    #[test]
    fn parallel_fans_out_and_converges_through_one_merge_node() {
        let mut builder = fresh_builder();
        let spec = ParallelSpec {
            branches: vec![
                ("left".to_string(), Arc::new(Echo) as AgentRuntimeRef),
                ("right".to_string(), Arc::new(Echo) as AgentRuntimeRef),
            ],
            merge: MergeStrategy::Concatenate,
            error_handling: ParallelErrorHandling::CollectErrors,
            max_concurrency: None,
        };
        let fragment = compile_parallel(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        // dispatch + 2 branches + merge
        assert_eq!(fragment.node_count, 4);
        assert_eq!(fragment.max_parallelism, 2);
    }

    #[test]
    fn parallel_respects_max_concurrency_cap() {
        let mut builder = fresh_builder();
        let spec = ParallelSpec {
            branches: vec![
                ("a".to_string(), Arc::new(Echo) as AgentRuntimeRef),
                ("b".to_string(), Arc::new(Echo) as AgentRuntimeRef),
                ("c".to_string(), Arc::new(Echo) as AgentRuntimeRef),
            ],
            merge: MergeStrategy::Structured,
            error_handling: ParallelErrorHandling::FailFast,
            max_concurrency: Some(2),
        };
        let fragment = compile_parallel(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();
        assert_eq!(fragment.max_parallelism, 2);
    }

    fn dag_node(name: &str, depends_on: &[&str]) -> DagNodeSpec {
        DagNodeSpec {
            name: name.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            agent: Arc::new(Echo),
        }
    }

    #[test]
    fn dag_joins_on_its_single_deepest_leaf() {
        let mut builder = fresh_builder();
        let spec = DagSpec {
            nodes: vec![
                dag_node("root", &[]),
                dag_node("mid", &["root"]),
                dag_node("leaf_shallow", &["root"]),
                dag_node("leaf_deep", &["mid"]),
            ],
        };
        let fragment = compile_dag(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        assert_eq!(fragment.node_count, spec.nodes.len() + 1);
        // root(0), mid(1)/leaf_shallow(1), leaf_deep(2): widest antichain is depth 1 with 2 nodes.
        assert_eq!(fragment.max_parallelism, 2);
    }

    #[test]
    fn dag_rejects_cycles() {
        let mut builder = fresh_builder();
        let spec = DagSpec { nodes: vec![dag_node("a", &["b"]), dag_node("b", &["a"])] };
        assert!(compile_dag(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).is_err());
    }

    #[test]
    fn router_compiles_one_entry_per_route_plus_fallback() {
        let mut builder = fresh_builder();
        let spec = RouterSpec {
            routes: vec![Route {
                name: "matches".to_string(),
                condition: Arc::new(|v| matches!(v, SendableValue::String(s) if s == "go")),
                step: Box::new(agent_step("matched")),
            }],
            fallback: Some(Box::new(agent_step("fallback"))),
        };
        let fragment = compile_router(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        // eval + route + fallback + converge
        assert_eq!(fragment.node_count, 4);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn loop_with_max_iterations_wraps_its_body_once() {
        let mut builder = fresh_builder();
        let spec = LoopSpec { body: Box::new(agent_step("body")), condition: LoopCondition::MaxIterations(3) };
        let fragment = compile_loop(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        // entry + cond + sink + body
        assert_eq!(fragment.node_count, 4);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn repeat_while_wraps_its_body_once() {
        let mut builder = fresh_builder();
        let spec = RepeatWhileSpec {
            body: Box::new(agent_step("body")),
            predicate: Arc::new(|v| matches!(v, SendableValue::String(s) if s != "done")),
            max_iterations: 5,
        };
        let fragment = compile_repeat_while(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes.len(), 1);
        assert_eq!(fragment.exit_nodes.len(), 1);
        assert_eq!(fragment.node_count, 4);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn human_approval_is_a_single_interruptible_node() {
        let mut builder = fresh_builder();
        let spec = HumanApprovalSpec { prompt: "ok?".to_string() };
        let fragment = compile_human_approval(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes, fragment.exit_nodes);
        assert_eq!(fragment.node_count, 1);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn transform_is_a_single_node() {
        let mut builder = fresh_builder();
        let spec = TransformSpec { f: Arc::new(|v| v) };
        let fragment = compile_transform(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes, fragment.exit_nodes);
        assert_eq!(fragment.node_count, 1);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn guard_is_a_single_node() {
        let mut builder = fresh_builder();
        let spec = GuardSpec {
            stage: GuardStage::Input,
            validators: vec![Arc::new(|_: &SendableValue| ValidatorOutcome::Passed)],
        };
        let fragment = compile_guard(&mut builder, &spec, vec![INPUT_CHANNEL.to_string()]).unwrap();

        assert_eq!(fragment.entry_nodes, fragment.exit_nodes);
        assert_eq!(fragment.node_count, 1);
        assert_eq!(fragment.max_parallelism, 1);
    }

    #[test]
    fn top_level_compile_rejects_empty_step_list() {
        assert!(compile(Vec::new()).is_err());
    }
}
