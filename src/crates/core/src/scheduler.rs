//! The per-superstep scheduler (spec.md §4.3): frontier computation, bounded
//! concurrent execution, checkpoint policies, and run termination.
//!
//! Grounded on the ancestor's Pregel-style step loop (`pregel/algo.rs`):
//! compute the ready set, run it, commit writes, advance the frontier,
//! repeat. Concurrency within one superstep uses `buffer_unordered` rather
//! than `tokio::spawn` per task, since node bodies borrow a [`StoreView`]
//! rather than owning `'static` state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use swarm_checkpoint::{
    Checkpoint, CheckpointStore, ChannelSpec, ChannelStore, ChannelWrite, SendableValue,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::error::{GraphError, OrchestrationError, Result, SchedulerError};
use crate::graph::{Graph, NodeId, OutputProjection};
use crate::interrupt::{InterruptRequest, ResumePayload, ResumeToken};
use crate::node::{NodeInput, NodeOutput, StoreView};

/// When the scheduler saves a checkpoint (spec.md §4.3).
#[derive(Debug, Clone, Copy)]
pub enum CheckpointPolicy {
    EveryStep,
    Every(u64),
    OnInterrupt,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        CheckpointPolicy::EveryStep
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_steps: u64,
    pub max_concurrent_tasks: usize,
    pub max_fork_retries: u32,
    pub checkpoint_policy: CheckpointPolicy,
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: 256,
            max_concurrent_tasks: 8,
            max_fork_retries: 2,
            checkpoint_policy: CheckpointPolicy::EveryStep,
            timeout: None,
        }
    }
}

impl RunOptions {
    pub fn builder() -> RunOptionsBuilder {
        RunOptionsBuilder(Self::default())
    }
}

pub struct RunOptionsBuilder(RunOptions);

impl RunOptionsBuilder {
    pub fn max_steps(mut self, n: u64) -> Self {
        self.0.max_steps = n;
        self
    }

    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.0.max_concurrent_tasks = n.max(1);
        self
    }

    pub fn max_fork_retries(mut self, n: u32) -> Self {
        self.0.max_fork_retries = n;
        self
    }

    pub fn checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.0.checkpoint_policy = policy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.0.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RunOptions {
        self.0
    }
}

pub const EVENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted { thread_id: String },
    StepStarted { step: u64 },
    TaskStarted { step: u64, node_id: NodeId },
    TaskFinished { step: u64, node_id: NodeId },
    CheckpointSaved { step: u64, checkpoint_id: String },
    RunInterrupted { request: InterruptRequest },
    RunCancelled,
    StepFinished { step: u64 },
    RunFinished,
}

#[derive(Debug, Clone)]
pub struct VersionedEvent {
    pub schema_version: u32,
    pub event: RunEvent,
}

impl From<RunEvent> for VersionedEvent {
    fn from(event: RunEvent) -> Self {
        Self { schema_version: EVENT_SCHEMA_VERSION, event }
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Finished(SendableValue),
    Interrupted(InterruptRequest),
    Cancelled,
    OutOfSteps,
}

/// A frontier snapshot exposed by `getState` (spec.md §6.1), supplementing
/// the distilled spec with a cheap-to-compare state digest.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub thread_id: String,
    pub step_index: u64,
    pub frontier: Vec<NodeId>,
    pub state_digest: Option<String>,
    pub event_schema_version: u32,
}

/// A cancellable handle to a run in progress.
pub struct Handle {
    pub events: mpsc::Receiver<VersionedEvent>,
    outcome: Arc<Mutex<Option<Result<RunOutcome>>>>,
    cancel_flag: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

impl Handle {
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub async fn outcome(self) -> Result<RunOutcome> {
        let _ = self.join.await;
        self.outcome
            .lock()
            .await
            .take()
            .unwrap_or(Ok(RunOutcome::Cancelled))
    }
}

struct Engine {
    graph: Arc<Graph>,
    store: ChannelStore,
    channel_keys: HashSet<String>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    thread_id: String,
    run_id: String,
    options: RunOptions,
    events: mpsc::Sender<VersionedEvent>,
    cancel_flag: Arc<AtomicBool>,
}

impl Engine {
    fn emit(&self, event: RunEvent) {
        let _ = self.events.try_send(event.into());
    }

    async fn snapshot_store(&mut self, keys: &HashSet<String>) -> Result<StoreView> {
        let mut view = std::collections::HashMap::new();
        for key in keys {
            view.insert(key.clone(), self.store.get(key)?);
        }
        Ok(StoreView(view))
    }

    async fn checkpoint(&mut self, step: u64, source: &str) -> Result<String> {
        let channels = self.store.encode_checkpointed()?;
        let checkpoint_id = format!("chk-{step}-{}", uuid::Uuid::new_v4());
        let checkpoint = Checkpoint::new(
            self.thread_id.clone(),
            self.run_id.clone(),
            checkpoint_id.clone(),
            step,
            channels,
        );
        self.checkpoint_store.save(checkpoint).await?;
        debug!(step, source, %checkpoint_id, "checkpoint saved");
        self.emit(RunEvent::CheckpointSaved { step, checkpoint_id: checkpoint_id.clone() });
        Ok(checkpoint_id)
    }

    fn should_checkpoint(&self, step: u64) -> bool {
        match self.options.checkpoint_policy {
            CheckpointPolicy::EveryStep => true,
            CheckpointPolicy::Every(n) => n > 0 && step % n == 0,
            CheckpointPolicy::OnInterrupt => false,
        }
    }

    async fn run_loop(mut self, mut frontier: Vec<NodeId>) -> Result<RunOutcome> {
        self.emit(RunEvent::RunStarted { thread_id: self.thread_id.clone() });

        let mut fired: HashSet<NodeId> = HashSet::new();
        let mut pending: HashSet<NodeId> = frontier.drain(..).collect();
        let mut step: u64 = 0;
        let all_keys = self.channel_keys.clone();

        loop {
            if self.cancel_flag.load(Ordering::SeqCst) {
                self.emit(RunEvent::RunCancelled);
                return Ok(RunOutcome::Cancelled);
            }

            if step >= self.options.max_steps {
                return Err(SchedulerError::OutOfSteps(self.options.max_steps).into());
            }

            let ready: Vec<NodeId> = pending
                .iter()
                .filter(|n| match self.graph.join_parents(n) {
                    Some(parents) => parents.iter().all(|p| fired.contains(p)),
                    None => true,
                })
                .cloned()
                .collect();

            if ready.is_empty() {
                if pending.is_empty() {
                    break;
                }
                return Err(SchedulerError::OutOfSteps(self.options.max_steps).into());
            }
            for node in &ready {
                pending.remove(node);
            }

            self.emit(RunEvent::StepStarted { step });

            let view = self.snapshot_store(&all_keys).await?;
            let outputs = self.run_ready_set(step, &ready, &view).await?;

            let mut interrupted = None;
            let mut writes = Vec::new();
            let mut next_nodes: Vec<(NodeId, NodeOutput)> = Vec::new();
            for (node_id, output) in outputs {
                writes.extend(output.writes.clone());
                if let Some(request) = output.interrupt.clone() {
                    interrupted = Some(request);
                    continue;
                }
                next_nodes.push((node_id, output));
            }

            self.store.apply(writes)?;
            for (node_id, _) in &next_nodes {
                fired.insert(node_id.clone());
            }

            for (node_id, output) in &next_nodes {
                let successors = match &output.next {
                    crate::node::NextDirective::Explicit(ids) => ids.clone(),
                    crate::node::NextDirective::UseGraphEdges => self.graph.successors(node_id),
                };
                pending.extend(successors);
            }

            if let Some(request) = interrupted {
                self.checkpoint(step, "interrupt").await?;
                self.emit(RunEvent::RunInterrupted { request: request.clone() });
                return Ok(RunOutcome::Interrupted(request));
            }

            if self.should_checkpoint(step) {
                self.checkpoint(step, "step").await?;
            }

            self.emit(RunEvent::StepFinished { step });
            step += 1;
        }

        let output = self.collect_output()?;
        self.emit(RunEvent::RunFinished);
        Ok(RunOutcome::Finished(output))
    }

    async fn run_ready_set(
        &self,
        step: u64,
        ready: &[NodeId],
        view: &StoreView,
    ) -> Result<Vec<(NodeId, NodeOutput)>> {
        let concurrency = self.options.max_concurrent_tasks;
        let max_retries = self.options.max_fork_retries;
        let graph = self.graph.clone();
        let events = self.events.clone();

        let results: Vec<Result<(NodeId, NodeOutput)>> = stream::iter(ready.iter().cloned())
            .map(|node_id| {
                let graph = graph.clone();
                let view = view.clone();
                let events = events.clone();
                async move {
                    let _ = events.try_send(RunEvent::TaskStarted { step, node_id: node_id.clone() }.into());
                    let spec = graph.nodes.get(&node_id).ok_or_else(|| {
                        GraphError::Scheduler(SchedulerError::JoinEdgeParentMissing {
                            node: node_id.clone(),
                            parent: "<unknown>".to_string(),
                        })
                    })?;

                    let mut attempt = 0;
                    loop {
                        let input = NodeInput { node_id: &node_id, store: &view, step_index: step };
                        match spec.body.run(input).await {
                            Ok(output) => {
                                let _ = events.try_send(
                                    RunEvent::TaskFinished { step, node_id: node_id.clone() }.into(),
                                );
                                return Ok((node_id.clone(), output));
                            }
                            Err(_err) if attempt < max_retries => {
                                attempt += 1;
                                warn!(node = %node_id, attempt, "node body failed, retrying");
                                continue;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.into_iter().collect()
    }

    fn collect_output(&mut self) -> Result<SendableValue> {
        match &self.graph.output_projection {
            OutputProjection::FullStore => Ok(SendableValue::Null),
            OutputProjection::Channels(channels) => {
                if channels.len() == 1 {
                    self.store.get(&channels[0]).map_err(GraphError::from)
                } else {
                    let mut dict = std::collections::BTreeMap::new();
                    for channel in channels {
                        dict.insert(channel.clone(), self.store.get(channel)?);
                    }
                    Ok(SendableValue::Dict(dict))
                }
            }
        }
    }
}

fn new_channel() -> (mpsc::Sender<VersionedEvent>, mpsc::Receiver<VersionedEvent>) {
    mpsc::channel(256)
}

/// Starts a fresh run from the graph's start frontier (spec.md §6.1 `run`).
pub fn run(
    graph: Arc<Graph>,
    channel_specs: Vec<ChannelSpec>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    thread_id: String,
    input: SendableValue,
    options: RunOptions,
) -> Handle {
    let channel_keys: HashSet<String> = channel_specs.iter().map(|s| s.key.clone()).collect();
    let mut store = ChannelStore::new(channel_specs);
    let _ = store.apply(vec![ChannelWrite {
        channel: "input".to_string(),
        producer_node_id: "__caller__".to_string(),
        value: input,
    }]);

    let run_id = format!("run-{}", uuid::Uuid::new_v4());
    let (tx, rx) = new_channel();
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let outcome = Arc::new(Mutex::new(None));

    let engine = Engine {
        graph: graph.clone(),
        store,
        channel_keys,
        checkpoint_store,
        thread_id,
        run_id,
        options,
        events: tx,
        cancel_flag: cancel_flag.clone(),
    };
    let frontier = graph.start_frontier.clone();

    let outcome_for_task = outcome.clone();
    let join = tokio::spawn(async move {
        let result = engine.run_loop(frontier).await;
        *outcome_for_task.lock().await = Some(result);
    });

    Handle { events: rx, outcome, cancel_flag, join }
}

/// Resumes a thread from its latest checkpoint after answering a pending
/// interrupt (spec.md §6.1 `resume`, §7).
pub async fn resume(
    graph: Arc<Graph>,
    channel_specs: Vec<ChannelSpec>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    token: ResumeToken,
    payload: ResumePayload,
    options: RunOptions,
) -> Result<Handle> {
    let latest = checkpoint_store
        .load_latest(&token.thread_id)
        .await?
        .ok_or(crate::error::ResumeError::NoInterruptToResume)?;

    let channel_keys: HashSet<String> = channel_specs.iter().map(|s| s.key.clone()).collect();
    let mut store = ChannelStore::new(channel_specs);
    store.decode_checkpointed(&latest.channels)?;

    let resume_channel = format!("resume:{}", token.interrupt_id);
    let resume_value = match &payload {
        ResumePayload::HumanApproval(response) => human_approval_value(response),
        ResumePayload::ToolApproval(decision) => tool_approval_value(decision),
    };
    store.apply(vec![ChannelWrite {
        channel: resume_channel,
        producer_node_id: "__caller__".to_string(),
        value: resume_value,
    }])?;

    let (tx, rx) = new_channel();
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let outcome = Arc::new(Mutex::new(None));
    let run_id = latest.run_id.clone();

    let engine = Engine {
        graph,
        store,
        channel_keys,
        checkpoint_store,
        thread_id: token.thread_id.clone(),
        run_id,
        options,
        events: tx,
        cancel_flag: cancel_flag.clone(),
    };

    let outcome_for_task = outcome.clone();
    let join = tokio::spawn(async move {
        let result = engine.run_loop(vec![token.interrupt_id]).await;
        *outcome_for_task.lock().await = Some(result);
    });

    Ok(Handle { events: rx, outcome, cancel_flag, join })
}

fn human_approval_value(response: &crate::interrupt::HumanApprovalResponse) -> SendableValue {
    use crate::interrupt::HumanApprovalResponse::*;
    let mut dict = std::collections::BTreeMap::new();
    match response {
        Approved => {
            dict.insert("kind".to_string(), SendableValue::string("approved"));
        }
        Modified(value) => {
            dict.insert("kind".to_string(), SendableValue::string("modified"));
            dict.insert("value".to_string(), value.clone());
        }
        Rejected(reason) => {
            dict.insert("kind".to_string(), SendableValue::string("rejected"));
            dict.insert("reason".to_string(), SendableValue::string(reason.clone()));
        }
    }
    SendableValue::Dict(dict)
}

fn tool_approval_value(decision: &crate::interrupt::ToolApprovalDecision) -> SendableValue {
    use crate::interrupt::ToolApprovalDecision::*;
    let mut dict = std::collections::BTreeMap::new();
    dict.insert(
        "kind".to_string(),
        SendableValue::string(match decision {
            Approved => "approved",
            Cancelled => "cancelled",
        }),
    );
    SendableValue::Dict(dict)
}

/// Replays a thread's checkpoint history (spec.md §6.1 `checkpointHistory`).
pub async fn checkpoint_history(
    checkpoint_store: &dyn CheckpointStore,
    thread_id: &str,
    limit: usize,
) -> Result<Vec<String>> {
    Ok(checkpoint_store.list_checkpoints(thread_id, limit).await?)
}

/// Describes a thread's current frontier without advancing it (spec.md §6.1
/// `getState`).
pub async fn get_state(
    checkpoint_store: &dyn CheckpointStore,
    thread_id: &str,
) -> Result<Option<StateSnapshot>> {
    let latest = checkpoint_store.load_latest(thread_id).await?;
    Ok(latest.map(|checkpoint| StateSnapshot {
        thread_id: thread_id.to_string(),
        step_index: checkpoint.step_index,
        frontier: Vec::new(),
        state_digest: checkpoint.hash().ok(),
        event_schema_version: EVENT_SCHEMA_VERSION,
    }))
}

/// Atomically commits externally supplied channel writes (spec.md §6.1
/// `applyExternalWrites`): rejects the whole batch if any channel id is
/// unknown to the compiled graph's channel specs.
pub async fn apply_external_writes(
    channel_specs: Vec<ChannelSpec>,
    checkpoint_store: &dyn CheckpointStore,
    thread_id: &str,
    writes: Vec<ChannelWrite>,
) -> Result<()> {
    let mut store = ChannelStore::new(channel_specs);
    let latest = checkpoint_store
        .load_latest(thread_id)
        .await?
        .ok_or_else(|| OrchestrationError::UnsupportedStep(
            "no checkpoint to apply external writes to".to_string(),
        ))?;

    store.decode_checkpointed(&latest.channels)?;
    store.apply(writes)?;
    let channels = store.encode_checkpointed()?;
    let checkpoint = Checkpoint::new(
        thread_id.to_string(),
        latest.run_id.clone(),
        format!("chk-ext-{}", uuid::Uuid::new_v4()),
        latest.step_index,
        channels,
    );
    checkpoint_store.save(checkpoint).await?;
    Ok(())
}
