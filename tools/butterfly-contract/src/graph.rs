//! Contractor graph store
//!
//! Mutable adjacency over dense node ids. Every directed input edge is stored
//! twice: once at its tail with the `forward` flag and once at its head with
//! the `backward` flag, so a node sees both its outgoing and incoming arcs in
//! a single adjacency list. Shortcuts are inserted the same way.
//!
//! During contraction the store is only mutated between parallel phases
//! (edge deletion, shortcut insertion, renumbering); the parallel phases
//! themselves read it through a shared reference.

use butterfly_common::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use rustc_hash::FxHashMap;

pub type NodeId = u32;
pub type EdgeWeight = u32;
pub type EdgeDuration = u32;

/// Marks "no node", e.g. the via-node of an original edge
pub const SPECIAL_NODE_ID: NodeId = u32::MAX;
/// Unreachable / not yet settled
pub const INVALID_EDGE_WEIGHT: EdgeWeight = u32::MAX;
/// Heaviest accepted input weight; the sum of two edges stays below
/// `INVALID_EDGE_WEIGHT`
pub const MAX_EDGE_WEIGHT: EdgeWeight = u32::MAX / 2;

/// Edge as delivered by the graph-loading collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: EdgeWeight,
    #[serde(default)]
    pub duration: EdgeDuration,
    /// Number of base-graph edges this edge stands for
    #[serde(default = "one")]
    pub original_edges: u32,
    #[serde(default = "yes")]
    pub forward: bool,
    #[serde(default)]
    pub backward: bool,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

impl InputEdge {
    /// One-way edge `source -> target`
    pub fn directed(source: NodeId, target: NodeId, weight: EdgeWeight) -> Self {
        Self {
            source,
            target,
            weight,
            duration: weight,
            original_edges: 1,
            forward: true,
            backward: false,
        }
    }

    /// Two-way edge with the same weight in both directions
    pub fn bidirectional(source: NodeId, target: NodeId, weight: EdgeWeight) -> Self {
        Self {
            backward: true,
            ..Self::directed(source, target, weight)
        }
    }
}

/// Payload of an adjacency entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractorEdgeData {
    pub weight: EdgeWeight,
    pub duration: EdgeDuration,
    pub original_edges: u32,
    /// Contracted node this shortcut bypasses (original id), `SPECIAL_NODE_ID` otherwise
    pub via: NodeId,
    pub shortcut: bool,
    pub forward: bool,
    pub backward: bool,
}

impl ContractorEdgeData {
    pub fn original(weight: EdgeWeight, duration: EdgeDuration, original_edges: u32, forward: bool, backward: bool) -> Self {
        Self {
            weight,
            duration,
            original_edges,
            via: SPECIAL_NODE_ID,
            shortcut: false,
            forward,
            backward,
        }
    }
}

/// Edge with explicit endpoints, used for shortcut batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractorEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub data: ContractorEdgeData,
}

impl ContractorEdge {
    #[allow(clippy::too_many_arguments)]
    pub fn shortcut(
        source: NodeId,
        target: NodeId,
        weight: EdgeWeight,
        duration: EdgeDuration,
        original_edges: u32,
        via: NodeId,
        forward: bool,
        backward: bool,
    ) -> Self {
        Self {
            source,
            target,
            data: ContractorEdgeData {
                weight,
                duration,
                original_edges,
                via,
                shortcut: true,
                forward,
                backward,
            },
        }
    }
}

/// Entry of a node's adjacency list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjacentEdge {
    pub target: NodeId,
    pub data: ContractorEdgeData,
}

/// Old <-> new id mapping produced when the graph is compacted
#[derive(Debug, Clone)]
pub struct Renumbering {
    /// Old id -> new id, `SPECIAL_NODE_ID` for dropped nodes
    pub new_from_old: Vec<NodeId>,
    /// New id -> old id
    pub old_from_new: Vec<NodeId>,
}

impl Renumbering {
    /// Keep `remaining` nodes, numbered densely in ascending old-id order
    pub fn keep(n_nodes: usize, remaining: impl IntoIterator<Item = NodeId>) -> Self {
        let mut old_from_new: Vec<NodeId> = remaining.into_iter().collect();
        old_from_new.sort_unstable();
        old_from_new.dedup();

        let mut new_from_old = vec![SPECIAL_NODE_ID; n_nodes];
        for (new_id, &old_id) in old_from_new.iter().enumerate() {
            new_from_old[old_id as usize] = new_id as NodeId;
        }

        Self {
            new_from_old,
            old_from_new,
        }
    }

    pub fn n_kept(&self) -> usize {
        self.old_from_new.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeMark {
    Untouched,
    Contracted,
    Neighbour,
}

/// Dynamic adjacency graph owned by the contractor
#[derive(Debug, Clone, Default)]
pub struct ContractorGraph {
    adjacency: Vec<Vec<AdjacentEdge>>,
}

impl ContractorGraph {
    /// Build the store from input edges, validating them first.
    ///
    /// Input self-loops are dropped. Parallel edges between the same pair are
    /// merged the way a road graph expects: the lightest arc per direction
    /// survives, and if both directions end up with the same weight they are
    /// stored as one two-way entry.
    pub fn from_input_edges(n_nodes: usize, edges: &[InputEdge]) -> Result<Self> {
        if n_nodes >= SPECIAL_NODE_ID as usize {
            return Err(Error::invalid_graph(format!("{} nodes exceed the id space", n_nodes)));
        }

        for (idx, edge) in edges.iter().enumerate() {
            if edge.source as usize >= n_nodes || edge.target as usize >= n_nodes {
                return Err(Error::invalid_graph(format!(
                    "edge {} ({} -> {}) references a node outside 0..{}",
                    idx, edge.source, edge.target, n_nodes
                )));
            }
            if edge.weight > MAX_EDGE_WEIGHT {
                return Err(Error::invalid_graph(format!(
                    "edge {} has weight {} above the limit {}",
                    idx, edge.weight, MAX_EDGE_WEIGHT
                )));
            }
            if edge.original_edges == 0 {
                return Err(Error::invalid_graph(format!("edge {} represents zero original edges", idx)));
            }
            if !edge.forward && !edge.backward {
                return Err(Error::invalid_graph(format!("edge {} is not traversable in any direction", idx)));
            }
        }

        // Both halves of every arc, grouped per (tail, head)
        let mut arcs: Vec<Vec<AdjacentEdge>> = vec![Vec::new(); n_nodes];
        let mut n_loops = 0usize;
        for edge in edges {
            if edge.source == edge.target {
                n_loops += 1;
                continue;
            }
            let data = ContractorEdgeData::original(edge.weight, edge.duration, edge.original_edges, edge.forward, edge.backward);
            arcs[edge.source as usize].push(AdjacentEdge { target: edge.target, data });
            arcs[edge.target as usize].push(AdjacentEdge {
                target: edge.source,
                data: ContractorEdgeData {
                    forward: edge.backward,
                    backward: edge.forward,
                    ..data
                },
            });
        }
        if n_loops > 0 {
            tracing::debug!(n_loops, "dropped self-loops from input");
        }

        let adjacency = arcs.into_par_iter().map(merge_parallel_edges).collect();
        Ok(Self { adjacency })
    }

    pub fn n_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of adjacency entries (each two-sided arc counts twice)
    pub fn n_edges(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    #[inline]
    pub fn adjacent_edges(&self, node: NodeId) -> &[AdjacentEdge] {
        &self.adjacency[node as usize]
    }

    /// Iterate every stored edge with its owning node
    pub fn edges(&self) -> impl Iterator<Item = ContractorEdge> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(source, edges)| {
            edges.iter().map(move |e| ContractorEdge {
                source: source as NodeId,
                target: e.target,
                data: e.data,
            })
        })
    }

    /// Position of the first edge `source -> target` in `source`'s list
    pub fn find_edge(&self, source: NodeId, target: NodeId) -> Option<usize> {
        self.adjacency[source as usize].iter().position(|e| e.target == target)
    }

    /// Insert a shortcut batch.
    ///
    /// A shortcut whose endpoints and direction flags match an existing
    /// shortcut is not added again; the lighter weight wins. Returns the
    /// number of entries actually added.
    pub fn insert_edges(&mut self, edges: &[ContractorEdge]) -> usize {
        let mut inserted = 0;
        for edge in edges {
            let list = &mut self.adjacency[edge.source as usize];
            let existing = list.iter_mut().find(|e| {
                e.target == edge.target
                    && e.data.shortcut
                    && edge.data.shortcut
                    && e.data.forward == edge.data.forward
                    && e.data.backward == edge.data.backward
            });
            match existing {
                Some(current) => {
                    if edge.data.weight < current.data.weight {
                        current.data = edge.data;
                    }
                }
                None => {
                    list.push(AdjacentEdge {
                        target: edge.target,
                        data: edge.data,
                    });
                    inserted += 1;
                }
            }
        }
        inserted
    }

    /// Remove every edge that points at one of `contracted` from the lists of
    /// their neighbours. The contracted nodes keep their own lists, which now
    /// only lead upwards in the hierarchy.
    ///
    /// Neighbour lists are rewritten in parallel; each list is touched by
    /// exactly one task.
    pub fn delete_incoming_edges(&mut self, contracted: &[NodeId]) {
        let mut marks = vec![NodeMark::Untouched; self.adjacency.len()];
        for &node in contracted {
            marks[node as usize] = NodeMark::Contracted;
        }
        for &node in contracted {
            for edge in &self.adjacency[node as usize] {
                let mark = &mut marks[edge.target as usize];
                if *mark == NodeMark::Untouched {
                    *mark = NodeMark::Neighbour;
                }
            }
        }

        let marks = &marks;
        self.adjacency
            .par_iter_mut()
            .enumerate()
            .filter(|(node, _)| marks[*node] == NodeMark::Neighbour)
            .for_each(|(_, edges)| edges.retain(|e| marks[e.target as usize] != NodeMark::Contracted));
    }

    /// Compact the store onto the kept nodes.
    ///
    /// Lists of dropped nodes are returned as edges in old ids; kept lists are
    /// rewritten to new ids. Kept nodes must not reference dropped ones.
    pub fn renumber(&mut self, renumbering: &Renumbering) -> Vec<ContractorEdge> {
        let old = std::mem::take(&mut self.adjacency);
        let mut dropped = Vec::new();
        let mut kept: Vec<Vec<AdjacentEdge>> = vec![Vec::new(); renumbering.n_kept()];

        for (old_id, mut edges) in old.into_iter().enumerate() {
            let new_id = renumbering.new_from_old[old_id];
            if new_id == SPECIAL_NODE_ID {
                dropped.extend(edges.into_iter().map(|e| ContractorEdge {
                    source: old_id as NodeId,
                    target: e.target,
                    data: e.data,
                }));
                continue;
            }
            for edge in &mut edges {
                let target = renumbering.new_from_old[edge.target as usize];
                debug_assert!(target != SPECIAL_NODE_ID, "kept node {} still points at dropped node {}", old_id, edge.target);
                edge.target = target;
            }
            kept[new_id as usize] = edges;
        }

        self.adjacency = kept;
        dropped
    }
}

/// Collapse parallel arcs of one node
fn merge_parallel_edges(edges: Vec<AdjacentEdge>) -> Vec<AdjacentEdge> {
    if edges.len() < 2 {
        return edges;
    }

    // head -> (best forward, best backward)
    let mut best: FxHashMap<NodeId, (Option<ContractorEdgeData>, Option<ContractorEdgeData>)> =
        FxHashMap::with_capacity_and_hasher(edges.len(), Default::default());
    for edge in &edges {
        let slot = best.entry(edge.target).or_default();
        if edge.data.forward && slot.0.map_or(true, |d| edge.data.weight < d.weight) {
            slot.0 = Some(ContractorEdgeData { backward: false, ..edge.data });
        }
        if edge.data.backward && slot.1.map_or(true, |d| edge.data.weight < d.weight) {
            slot.1 = Some(ContractorEdgeData { forward: false, ..edge.data });
        }
    }

    let mut merged: Vec<AdjacentEdge> = Vec::with_capacity(best.len());
    for (target, (fwd, bwd)) in best {
        match (fwd, bwd) {
            (Some(f), Some(b)) if f.weight == b.weight => merged.push(AdjacentEdge {
                target,
                data: ContractorEdgeData { backward: true, ..f },
            }),
            (f, b) => {
                merged.extend(f.map(|data| AdjacentEdge { target, data }));
                merged.extend(b.map(|data| AdjacentEdge { target, data }));
            }
        }
    }
    merged.sort_unstable_by_key(|e| (e.target, e.data));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> ContractorGraph {
        // 0 -> 1 (1), 1 -> 2 (1), 0 -> 2 (3)
        ContractorGraph::from_input_edges(
            3,
            &[
                InputEdge::directed(0, 1, 1),
                InputEdge::directed(1, 2, 1),
                InputEdge::directed(0, 2, 3),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_both_halves_are_stored() {
        let graph = triangle();
        assert_eq!(graph.n_nodes(), 3);
        assert_eq!(graph.n_edges(), 6);

        let at_1 = graph.adjacent_edges(1);
        let to_0 = at_1.iter().find(|e| e.target == 0).unwrap();
        assert!(!to_0.data.forward && to_0.data.backward);
        let to_2 = at_1.iter().find(|e| e.target == 2).unwrap();
        assert!(to_2.data.forward && !to_2.data.backward);
    }

    #[test]
    fn test_rejects_out_of_range_endpoint() {
        let err = ContractorGraph::from_input_edges(2, &[InputEdge::directed(0, 5, 1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));
    }

    #[test]
    fn test_rejects_weights_that_could_hit_the_sentinel() {
        // Two such edges would sum to exactly INVALID_EDGE_WEIGHT
        let half = u32::MAX / 2 + 1;
        let edges = [InputEdge::directed(0, 1, half), InputEdge::directed(1, 2, half - 1)];
        let err = ContractorGraph::from_input_edges(3, &edges).unwrap_err();
        assert!(matches!(err, Error::InvalidGraph(_)));

        let edges = [InputEdge::directed(0, 1, MAX_EDGE_WEIGHT), InputEdge::directed(1, 2, MAX_EDGE_WEIGHT)];
        assert!(ContractorGraph::from_input_edges(3, &edges).is_ok());
    }

    #[test]
    fn test_rejects_directionless_edge() {
        let edge = InputEdge {
            forward: false,
            ..InputEdge::directed(0, 1, 1)
        };
        assert!(ContractorGraph::from_input_edges(2, &[edge]).is_err());
    }

    #[test]
    fn test_parallel_edges_merge() {
        let graph = ContractorGraph::from_input_edges(
            2,
            &[
                InputEdge::directed(0, 1, 7),
                InputEdge::directed(0, 1, 5),
                InputEdge::directed(1, 0, 5),
            ],
        )
        .unwrap();
        // Lightest arc each way, equal weights -> one two-way entry per side
        assert_eq!(graph.adjacent_edges(0).len(), 1);
        let edge = graph.adjacent_edges(0)[0];
        assert_eq!(edge.data.weight, 5);
        assert!(edge.data.forward && edge.data.backward);
    }

    #[test]
    fn test_input_self_loops_are_dropped() {
        let graph = ContractorGraph::from_input_edges(1, &[InputEdge::bidirectional(0, 0, 4)]).unwrap();
        assert_eq!(graph.n_edges(), 0);
    }

    #[test]
    fn test_delete_incoming_edges_keeps_own_list() {
        let mut graph = triangle();
        graph.delete_incoming_edges(&[1]);
        assert!(graph.adjacent_edges(0).iter().all(|e| e.target != 1));
        assert!(graph.adjacent_edges(2).iter().all(|e| e.target != 1));
        assert_eq!(graph.adjacent_edges(1).len(), 2);
    }

    #[test]
    fn test_insert_keeps_lighter_duplicate_shortcut() {
        let mut graph = triangle();
        let heavy = ContractorEdge::shortcut(0, 2, 9, 9, 2, 1, true, false);
        let light = ContractorEdge::shortcut(0, 2, 2, 2, 2, 1, true, false);
        assert_eq!(graph.insert_edges(&[heavy]), 1);
        assert_eq!(graph.insert_edges(&[light]), 0);

        let shortcuts: Vec<_> = graph.adjacent_edges(0).iter().filter(|e| e.data.shortcut).collect();
        assert_eq!(shortcuts.len(), 1);
        assert_eq!(shortcuts[0].data.weight, 2);
    }

    #[test]
    fn test_renumber_drops_contracted_lists() {
        let mut graph = triangle();
        graph.delete_incoming_edges(&[1]);
        let renumbering = Renumbering::keep(3, [0, 2]);
        let dropped = graph.renumber(&renumbering);

        assert_eq!(graph.n_nodes(), 2);
        assert_eq!(dropped.len(), 2);
        assert!(dropped.iter().all(|e| e.source == 1));
        // old 2 is new 1
        assert_eq!(graph.find_edge(0, 1).map(|i| graph.adjacent_edges(0)[i].data.weight), Some(3));
    }
}
