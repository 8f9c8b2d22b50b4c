//! The node body contract (spec.md §3 "Node body contract"): given read
//! access to the store at superstep *n*, a node returns an ordered list of
//! channel writes, an optional `next` directive, and an optional interrupt
//! request.
//!
//! Grounded on the ancestor's node-closure signature (`graph.rs`'s
//! `NodeFn`) and its `Command`-based next-node override (`command.rs`),
//! generalized: every node writes to named channels through the store
//! rather than returning a single state value, and `next` is always
//! explicit about whether it overrides static edges.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use swarm_checkpoint::{ChannelWrite, SendableValue};

use crate::error::Result;
use crate::graph::NodeId;
use crate::interrupt::InterruptRequest;

/// Read-only view of the channel store as committed at the end of the
/// previous superstep. Nodes never observe writes made by concurrent nodes
/// within the same superstep.
#[derive(Debug, Clone, Default)]
pub struct StoreView(pub HashMap<String, SendableValue>);

impl StoreView {
    pub fn get(&self, key: &str) -> SendableValue {
        self.0.get(key).cloned().unwrap_or(SendableValue::Null)
    }
}

/// Input passed to [`NodeBody::run`] for one invocation.
pub struct NodeInput<'a> {
    pub node_id: &'a NodeId,
    pub store: &'a StoreView,
    pub step_index: u64,
}

/// `useGraphEdges` follows the graph's static successors; an explicit list
/// overrides them for this transition only (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextDirective {
    UseGraphEdges,
    Explicit(Vec<NodeId>),
}

/// What a node produced in one invocation.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub writes: Vec<ChannelWrite>,
    pub next: NextDirective,
    pub interrupt: Option<InterruptRequest>,
}

impl NodeOutput {
    pub fn write(channel: impl Into<String>, producer: impl Into<String>, value: SendableValue) -> Self {
        Self {
            writes: vec![ChannelWrite { channel: channel.into(), producer_node_id: producer.into(), value }],
            next: NextDirective::UseGraphEdges,
            interrupt: None,
        }
    }

    pub fn with_next(mut self, next: NextDirective) -> Self {
        self.next = next;
        self
    }

    pub fn interrupted(request: InterruptRequest) -> Self {
        Self { writes: Vec::new(), next: NextDirective::UseGraphEdges, interrupt: Some(request) }
    }
}

/// Async node body. Pure with respect to its declared reads; side effects
/// are either channel writes or calls to injected collaborator interfaces
/// (providers, tools, tracers).
#[async_trait]
pub trait NodeBody: Send + Sync {
    async fn run(&self, input: NodeInput<'_>) -> Result<NodeOutput>;
}

/// Wraps a plain async closure as a [`NodeBody`]; used by `Transform` and by
/// the compiler's synthetic dispatch/merge/converge/cond nodes. Takes owned
/// copies of the node id and store view to sidestep higher-ranked lifetime
/// bounds on the closure's future.
pub struct FnNode<F>(pub F);

#[async_trait]
impl<F, Fut> NodeBody for FnNode<F>
where
    F: Fn(NodeId, StoreView, u64) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<NodeOutput>> + Send,
{
    async fn run(&self, input: NodeInput<'_>) -> Result<NodeOutput> {
        (self.0)(input.node_id.clone(), input.store.clone(), input.step_index).await
    }
}

/// Name of the channel a compiled node's output is written to. Every
/// compiled node gets exactly one such channel, scoped and declared by the
/// builder when the node is added.
pub fn output_channel(node_id: &str) -> String {
    format!("output:{node_id}")
}

pub type NodeBodyRef = Arc<dyn NodeBody>;
