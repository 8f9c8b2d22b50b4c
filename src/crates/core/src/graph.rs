//! Compiled graph data model: nodes, static edges, join edges, start
//! frontier, and output projection (spec.md §3 "Graph", §4.2).
//!
//! Grounded on the ancestor's `Graph` struct (`graph.rs`): a node-id-keyed
//! map plus an edge list. The ancestor's conditional-edge closures are
//! replaced by the DSL compiler in [`crate::builder`] emitting explicit join
//! edges and `next` directives instead — this module only holds the
//! compiled, immutable result.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{GraphValidationError, Result};
use crate::node::NodeBody;

pub type NodeId = String;

/// Sentinel entry point: every fragment's start frontier ultimately traces
/// back to it, though compiled graphs reference concrete node ids directly.
pub const START: &str = "__start__";
/// Sentinel exit marker used by fragments with no further successors.
pub const END: &str = "__end__";

/// One compiled node: an id and the async body that runs it.
#[derive(Clone)]
pub struct NodeSpec {
    pub id: NodeId,
    pub body: Arc<dyn NodeBody>,
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSpec").field("id", &self.id).finish()
    }
}

/// Unconditional predecessor edge: `from`'s completion makes `to` eligible
/// for the next superstep's frontier (subject to `to`'s join-edge parents,
/// if any, also having fired).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

/// `node` becomes ready only once every id in `parents` has produced output
/// at some point in the run's history (spec.md glossary: "Join edge").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub node: NodeId,
    pub parents: Vec<NodeId>,
}

/// Which channels a run's terminal `Finished` outcome exposes.
#[derive(Debug, Clone)]
pub enum OutputProjection {
    FullStore,
    Channels(Vec<String>),
}

/// An immutable, compiled graph ready for scheduling.
#[derive(Clone)]
pub struct Graph {
    pub nodes: HashMap<NodeId, NodeSpec>,
    pub edges: Vec<Edge>,
    pub join_edges: Vec<JoinEdge>,
    pub start_frontier: Vec<NodeId>,
    pub output_projection: OutputProjection,
}

impl Graph {
    pub fn successors(&self, node: &str) -> Vec<NodeId> {
        self.edges.iter().filter(|e| e.from == node).map(|e| e.to.clone()).collect()
    }

    pub fn join_parents(&self, node: &str) -> Option<&[NodeId]> {
        self.join_edges.iter().find(|j| j.node == node).map(|j| j.parents.as_slice())
    }

    /// Whole-graph structural validation, distinct from the DSL compiler's
    /// per-fragment DAG validation (spec.md §4.2): every edge and join-edge
    /// parent must target a node that actually exists in the compiled graph.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(GraphValidationError::EmptyGraph.into());
        }
        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) {
                return Err(GraphValidationError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                }
                .into());
            }
            if !self.nodes.contains_key(&edge.to) {
                return Err(GraphValidationError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                }
                .into());
            }
        }
        for join in &self.join_edges {
            if !self.nodes.contains_key(&join.node) {
                return Err(GraphValidationError::DanglingEdge {
                    from: "<join>".to_string(),
                    to: join.node.clone(),
                }
                .into());
            }
            for parent in &join.parents {
                if !self.nodes.contains_key(parent) {
                    return Err(GraphValidationError::DanglingEdge {
                        from: parent.clone(),
                        to: join.node.clone(),
                    }
                    .into());
                }
            }
        }
        for id in &self.start_frontier {
            if !self.nodes.contains_key(id) {
                return Err(GraphValidationError::DanglingEdge {
                    from: START.to_string(),
                    to: id.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Graph introspection (node count, max antichain width, a debug
    /// rendering) used for scheduler concurrency budgets and debugging.
    pub fn describe(&self) -> GraphDescription {
        GraphDescription {
            node_count: self.nodes.len(),
            max_parallelism: max_antichain_width(self),
            edges: self.edges.len(),
            join_edges: self.join_edges.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphDescription {
    pub node_count: usize,
    pub max_parallelism: usize,
    pub edges: usize,
    pub join_edges: usize,
}

/// Widest frontier reachable by repeated static-edge expansion from the
/// start frontier; used as the default `maxParallelism` for DAG fragments
/// (spec.md §4.2 "`maxParallelism` = maximum antichain width").
fn max_antichain_width(graph: &Graph) -> usize {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut frontier: VecDeque<NodeId> = graph.start_frontier.iter().cloned().collect();
    let mut widest = frontier.len();

    while !frontier.is_empty() {
        let mut next: Vec<NodeId> = Vec::new();
        for node in frontier.drain(..) {
            if !seen.insert(node.clone()) {
                continue;
            }
            next.extend(graph.successors(&node));
        }
        next.sort();
        next.dedup();
        widest = widest.max(next.len());
        frontier = next.into();
    }

    widest.max(1)
}
