//! Witness search
//!
//! Bounded one-to-many Dijkstra used to decide whether a shortcut is needed.
//!
//! Key properties:
//! 1. Version-stamped node entries (O(1) reset between searches)
//! 2. Lazy-deletion binary heap, entries are re-pushed on improvement
//! 3. Stops once every target is settled, the settle budget is spent or the
//!    next key exceeds the largest candidate path weight
//! 4. Never mutates the graph it searches

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::graph::{ContractorGraph, EdgeWeight, NodeId, INVALID_EDGE_WEIGHT};

/// Version-stamped node entry
#[derive(Clone, Copy)]
struct NodeEntry {
    weight: EdgeWeight,
    version: u32,
    settled: bool,
    target: bool,
}

impl NodeEntry {
    const EMPTY: Self = Self {
        weight: INVALID_EDGE_WEIGHT,
        version: 0,
        settled: false,
        target: false,
    };
}

/// Reusable witness search state, sized to the graph it searches
pub struct WitnessSearch {
    entries: Vec<NodeEntry>,
    version: u32,
    heap: BinaryHeap<Reverse<(EdgeWeight, NodeId)>>,
}

impl WitnessSearch {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            entries: vec![NodeEntry::EMPTY; n_nodes],
            version: 1,
            heap: BinaryHeap::with_capacity(1024),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.version = self.version.wrapping_add(1);
        if self.version == 0 {
            // Version wrapped, need full reset
            self.entries.fill(NodeEntry::EMPTY);
            self.version = 1;
        }
        self.heap.clear();
    }

    #[inline]
    pub fn was_inserted(&self, node: NodeId) -> bool {
        self.entries[node as usize].version == self.version
    }

    /// Tentative or settled distance, `INVALID_EDGE_WEIGHT` if never reached
    #[inline]
    pub fn get_key(&self, node: NodeId) -> EdgeWeight {
        let entry = &self.entries[node as usize];
        if entry.version == self.version {
            entry.weight
        } else {
            INVALID_EDGE_WEIGHT
        }
    }

    pub fn insert_source(&mut self, node: NodeId) {
        self.entries[node as usize] = NodeEntry {
            weight: 0,
            version: self.version,
            settled: false,
            target: false,
        };
        self.heap.push(Reverse((0, node)));
    }

    /// Register a goal with infinite distance. Returns false if `node` was
    /// already known to this search.
    pub fn insert_target(&mut self, node: NodeId) -> bool {
        if self.was_inserted(node) {
            return false;
        }
        self.entries[node as usize] = NodeEntry {
            weight: INVALID_EDGE_WEIGHT,
            version: self.version,
            settled: false,
            target: true,
        };
        true
    }

    /// Run until `number_of_targets` goals are settled, more than
    /// `settle_limit` nodes were settled, or the smallest key exceeds
    /// `weight_limit`. `forbidden_node` is never entered.
    pub fn run(
        &mut self,
        graph: &ContractorGraph,
        number_of_targets: usize,
        settle_limit: usize,
        weight_limit: EdgeWeight,
        forbidden_node: NodeId,
    ) {
        let mut n_settled = 0usize;
        let mut n_targets_found = 0usize;

        while let Some(Reverse((weight, node))) = self.heap.pop() {
            let entry = &mut self.entries[node as usize];
            if entry.settled || weight > entry.weight {
                continue;
            }
            entry.settled = true;

            n_settled += 1;
            if n_settled > settle_limit {
                return;
            }
            if weight > weight_limit {
                return;
            }
            if entry.target {
                n_targets_found += 1;
                if n_targets_found >= number_of_targets {
                    return;
                }
            }

            self.relax_node(graph, node, weight, forbidden_node);
        }
    }

    #[inline]
    fn relax_node(&mut self, graph: &ContractorGraph, node: NodeId, weight: EdgeWeight, forbidden_node: NodeId) {
        for edge in graph.adjacent_edges(node) {
            if !edge.data.forward {
                continue;
            }
            let to = edge.target;
            if to == forbidden_node {
                continue;
            }
            let to_weight = weight.saturating_add(edge.data.weight);
            let version = self.version;
            let entry = &mut self.entries[to as usize];
            if entry.version != version {
                *entry = NodeEntry {
                    weight: to_weight,
                    version,
                    settled: false,
                    target: false,
                };
                self.heap.push(Reverse((to_weight, to)));
            } else if !entry.settled && to_weight < entry.weight {
                entry.weight = to_weight;
                self.heap.push(Reverse((to_weight, to)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InputEdge;

    fn line() -> ContractorGraph {
        // 0 -> 1 -> 2 -> 3, plus a heavy bypass 0 -> 3
        ContractorGraph::from_input_edges(
            4,
            &[
                InputEdge::directed(0, 1, 1),
                InputEdge::directed(1, 2, 1),
                InputEdge::directed(2, 3, 1),
                InputEdge::directed(0, 3, 10),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_finds_shortest_distances() {
        let graph = line();
        let mut search = WitnessSearch::new(graph.n_nodes());
        search.clear();
        search.insert_source(0);
        assert!(search.insert_target(3));
        assert!(!search.insert_target(3));
        search.run(&graph, 1, 100, 100, SPECIAL);
        assert_eq!(search.get_key(3), 3);
    }

    const SPECIAL: NodeId = crate::graph::SPECIAL_NODE_ID;

    #[test]
    fn test_forbidden_node_is_avoided() {
        let graph = line();
        let mut search = WitnessSearch::new(graph.n_nodes());
        search.clear();
        search.insert_source(0);
        search.insert_target(3);
        search.run(&graph, 1, 100, 100, 1);
        assert_eq!(search.get_key(3), 10);
    }

    #[test]
    fn test_settle_budget_bails_out() {
        let graph = line();
        let mut search = WitnessSearch::new(graph.n_nodes());
        search.clear();
        search.insert_source(0);
        search.insert_target(2);
        // Only the source may be settled; node 2 is never reached
        search.run(&graph, 1, 1, 100, SPECIAL);
        assert_eq!(search.get_key(2), INVALID_EDGE_WEIGHT);
    }

    #[test]
    fn test_clear_forgets_previous_search() {
        let graph = line();
        let mut search = WitnessSearch::new(graph.n_nodes());
        search.clear();
        search.insert_source(0);
        search.run(&graph, 0, 100, 100, SPECIAL);
        assert!(search.was_inserted(2));

        search.clear();
        assert!(!search.was_inserted(2));
        assert_eq!(search.get_key(2), INVALID_EDGE_WEIGHT);
    }
}
