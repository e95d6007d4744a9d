//! The per-macro-step conflict graph and its builder.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::NodeIndex;
use petgraph::{Graph, Undirected};

use crate::agent::{AgentSnapshot, AgentStatus};
use crate::grid::GridOracle;
use crate::prediction::PredictionSnapshot;
use crate::Handle;

use super::detector::ConflictDetector;
use super::record::ConflictRecord;

/// Undirected graph over agent handles whose near-term plans collide.
///
/// # Invariants
///
/// - Adjacency is symmetric even though detection runs per agent: inserting
///   a record connects both endpoints.
/// - Rebuilt from scratch every macro-step; never patched incrementally.
#[derive(Debug, Clone, Default)]
pub struct ConflictGraph {
    graph: Graph<Handle, ConflictRecord, Undirected>,
    node_by_handle: BTreeMap<Handle, NodeIndex>,
}

impl ConflictGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a node exists for `handle` (agents without conflicts are
    /// still colored).
    pub fn ensure_node(&mut self, handle: Handle) -> NodeIndex {
        if let Some(&node) = self.node_by_handle.get(&handle) {
            return node;
        }
        let node = self.graph.add_node(handle);
        self.node_by_handle.insert(handle, node);
        node
    }

    /// Inserts a conflict edge between `record.agent` and `record.other`.
    /// At most one edge per pair is kept; the earliest-tick record wins.
    pub fn insert(&mut self, record: ConflictRecord) {
        let a = self.ensure_node(record.agent);
        let b = self.ensure_node(record.other);
        match self.graph.find_edge(a, b) {
            Some(edge) => {
                let existing = &mut self.graph[edge];
                if record.tick < existing.tick {
                    *existing = record;
                }
            }
            None => {
                self.graph.add_edge(a, b, record);
            }
        }
    }

    /// True if the two agents conflict.
    pub fn contains_edge(&self, a: Handle, b: Handle) -> bool {
        match (self.node_by_handle.get(&a), self.node_by_handle.get(&b)) {
            (Some(&na), Some(&nb)) => self.graph.find_edge(na, nb).is_some(),
            _ => false,
        }
    }

    /// Handles of all nodes, ascending.
    pub fn handles(&self) -> Vec<Handle> {
        self.node_by_handle.keys().copied().collect()
    }

    /// Conflicting neighbors of `handle`, ascending.
    pub fn neighbors(&self, handle: Handle) -> Vec<Handle> {
        let Some(&node) = self.node_by_handle.get(&handle) else {
            return Vec::new();
        };
        let mut neighbors: Vec<Handle> = self.graph.neighbors(node).map(|n| self.graph[n]).collect();
        neighbors.sort_unstable();
        neighbors
    }

    /// Full adjacency view, deterministic by ascending handle.
    pub fn adjacency(&self) -> BTreeMap<Handle, BTreeSet<Handle>> {
        self.node_by_handle
            .keys()
            .map(|&h| (h, self.neighbors(h).into_iter().collect()))
            .collect()
    }

    /// All edge records, ordered by (agent, other).
    pub fn records(&self) -> Vec<ConflictRecord> {
        let mut records: Vec<ConflictRecord> =
            self.graph.edge_weights().copied().collect();
        records.sort_by_key(|r| (r.agent, r.other, r.tick));
        records
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Primary and secondary conflict graphs for one macro-step.
///
/// Primary edges come from the first conflicting move in each agent's
/// preference order (shortest-path move first) and drive priority
/// coloring; secondary edges come from conflicting alternative moves and
/// are exposed for observations and diagnostics only.
#[derive(Debug, Clone, Default)]
pub struct ConflictGraphs {
    pub primary: ConflictGraph,
    pub secondary: ConflictGraph,
}

/// Builds the conflict graphs for a set of agents.
pub struct ConflictGraphBuilder;

impl ConflictGraphBuilder {
    /// Runs the detector over every legal move of every departed or
    /// ready-to-depart agent. Deterministic given an identical snapshot:
    /// agents ascend by handle, moves by (distance, heading index).
    /// O(agents × headings × horizon).
    pub fn build<O: GridOracle + ?Sized>(
        oracle: &O,
        agents: &[AgentSnapshot],
        snapshot: &PredictionSnapshot,
        horizon: u32,
    ) -> ConflictGraphs {
        let detector = ConflictDetector::new(oracle, agents, snapshot);
        let mut graphs = ConflictGraphs::default();

        for agent in agents {
            if !matches!(agent.status, AgentStatus::ReadyToDepart | AgentStatus::Active) {
                continue;
            }
            let Some(position) = agent.virtual_position() else {
                continue;
            };
            graphs.primary.ensure_node(agent.handle);
            graphs.secondary.ensure_node(agent.handle);

            // Legal moves in the agent's preference order.
            let transitions = oracle.transitions(position, agent.heading);
            let mut moves: Vec<(f64, usize, crate::grid::Heading)> = transitions
                .iter()
                .map(|exit| {
                    let next = position.neighbor(exit);
                    let distance = oracle.distance_to_target(agent.handle, next, exit);
                    (distance, exit.index(), exit)
                })
                .collect();
            moves.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut primary_found = false;
            for (_, _, exit) in moves {
                let next = position.neighbor(exit);
                let Some(conflict) = detector.detect(agent.handle, next, exit, horizon) else {
                    continue;
                };
                let record = ConflictRecord {
                    agent: agent.handle,
                    other: conflict.other,
                    tick: conflict.tick,
                    reason: conflict.reason,
                };
                if primary_found {
                    graphs.secondary.insert(record);
                } else {
                    graphs.primary.insert(record);
                    primary_found = true;
                }
            }
        }

        graphs
    }
}
