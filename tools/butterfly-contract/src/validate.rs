//! Validation of hierarchy correctness
//!
//! Compares bidirectional upward-search distances on the contracted
//! hierarchy against plain Dijkstra on the input edges.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use tracing::info;

use crate::contractor::ContractedHierarchy;
use crate::graph::{EdgeWeight, InputEdge, NodeId, INVALID_EDGE_WEIGHT};
use crate::storage::QueryEdge;

type Adjacency = Vec<Vec<(NodeId, EdgeWeight)>>;

/// One-to-all Dijkstra, `INVALID_EDGE_WEIGHT` for unreachable nodes
fn dijkstra(adjacency: &Adjacency, source: NodeId) -> Vec<EdgeWeight> {
    let mut dist = vec![INVALID_EDGE_WEIGHT; adjacency.len()];
    let mut heap: BinaryHeap<Reverse<(EdgeWeight, NodeId)>> = BinaryHeap::new();

    dist[source as usize] = 0;
    heap.push(Reverse((0, source)));

    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        for &(v, w) in &adjacency[u as usize] {
            let new_dist = d.saturating_add(w);
            if new_dist < dist[v as usize] {
                dist[v as usize] = new_dist;
                heap.push(Reverse((new_dist, v)));
            }
        }
    }

    dist
}

/// Ground truth over the uncontracted input
pub struct ReferenceGraph {
    adjacency: Adjacency,
}

impl ReferenceGraph {
    pub fn new(n_nodes: usize, edges: &[InputEdge]) -> Self {
        let mut adjacency: Adjacency = vec![Vec::new(); n_nodes];
        for edge in edges {
            if edge.forward {
                adjacency[edge.source as usize].push((edge.target, edge.weight));
            }
            if edge.backward {
                adjacency[edge.target as usize].push((edge.source, edge.weight));
            }
        }
        Self { adjacency }
    }

    pub fn distances_from(&self, source: NodeId) -> Vec<EdgeWeight> {
        dijkstra(&self.adjacency, source)
    }
}

/// Bidirectional search over hierarchy edges.
///
/// Every edge is stored at its lower endpoint (or between two core nodes),
/// so following `forward` entries from the source and `backward` entries
/// from the target only ever climbs the hierarchy; the core is searched
/// exhaustively by both sides.
pub struct HierarchyQuery {
    up_forward: Adjacency,
    up_backward: Adjacency,
}

impl HierarchyQuery {
    pub fn new(n_nodes: usize, edges: &[QueryEdge]) -> Self {
        let mut up_forward: Adjacency = vec![Vec::new(); n_nodes];
        let mut up_backward: Adjacency = vec![Vec::new(); n_nodes];
        for edge in edges {
            if edge.forward {
                up_forward[edge.source as usize].push((edge.target, edge.weight));
            }
            if edge.backward {
                up_backward[edge.source as usize].push((edge.target, edge.weight));
            }
        }
        Self { up_forward, up_backward }
    }

    pub fn distance(&self, source: NodeId, target: NodeId) -> EdgeWeight {
        if source == target {
            return 0;
        }
        let forward = dijkstra(&self.up_forward, source);
        let backward = dijkstra(&self.up_backward, target);
        forward
            .iter()
            .zip(&backward)
            .map(|(&f, &b)| {
                if f == INVALID_EDGE_WEIGHT || b == INVALID_EDGE_WEIGHT {
                    INVALID_EDGE_WEIGHT
                } else {
                    f.saturating_add(b)
                }
            })
            .min()
            .unwrap_or(INVALID_EDGE_WEIGHT)
    }
}

/// Check `n_tests` random pairs
pub fn validate_hierarchy(
    n_nodes: usize,
    input_edges: &[InputEdge],
    hierarchy: &ContractedHierarchy,
    n_tests: usize,
    seed: u64,
) -> ValidationResult {
    if n_nodes == 0 {
        return ValidationResult::default();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let reference = ReferenceGraph::new(n_nodes, input_edges);
    let query = HierarchyQuery::new(n_nodes, &hierarchy.edges);

    let mut correct = 0;
    let mut incorrect = 0;
    let mut unreachable_both = 0;
    let mut errors: Vec<ValidationError> = Vec::new();

    info!(n_tests, "Validating random queries");

    for i in 0..n_tests {
        let source = rng.random_range(0..n_nodes as NodeId);
        let target = rng.random_range(0..n_nodes as NodeId);

        let dijkstra_dist = reference.distances_from(source)[target as usize];
        let ch_dist = query.distance(source, target);

        if dijkstra_dist == INVALID_EDGE_WEIGHT && ch_dist == INVALID_EDGE_WEIGHT {
            unreachable_both += 1;
            correct += 1;
        } else if dijkstra_dist == ch_dist {
            correct += 1;
        } else {
            incorrect += 1;
            if errors.len() < 10 {
                errors.push(ValidationError {
                    source,
                    target,
                    dijkstra_dist,
                    ch_dist,
                });
            }
        }

        if (i + 1) % 100 == 0 {
            info!("  {}/{} queries, {} correct, {} incorrect", i + 1, n_tests, correct, incorrect);
        }
    }

    ValidationResult {
        n_tests,
        correct,
        incorrect,
        unreachable_both,
        errors,
    }
}

#[derive(Debug, Default)]
pub struct ValidationResult {
    pub n_tests: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unreachable_both: usize,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.incorrect == 0
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.is_valid() { "ok" } else { "MISMATCH" };
        write!(
            f,
            "validation {}: {}/{} queries agree with Dijkstra ({} unreachable both ways)",
            verdict, self.correct, self.n_tests, self.unreachable_both
        )?;
        for err in &self.errors {
            write!(
                f,
                "\n  {} -> {}: expected {}, hierarchy gave {}",
                err.source, err.target, err.dijkstra_dist, err.ch_dist
            )?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ValidationError {
    pub source: NodeId,
    pub target: NodeId,
    pub dijkstra_dist: EdgeWeight,
    pub ch_dist: EdgeWeight,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SPECIAL_NODE_ID;

    fn edge(source: NodeId, target: NodeId, weight: EdgeWeight, forward: bool, backward: bool) -> QueryEdge {
        QueryEdge {
            source,
            target,
            weight,
            duration: weight,
            original_edges: 1,
            via: SPECIAL_NODE_ID,
            shortcut: false,
            forward,
            backward,
        }
    }

    #[test]
    fn test_reference_respects_direction() {
        let reference = ReferenceGraph::new(3, &[InputEdge::directed(0, 1, 2), InputEdge::bidirectional(1, 2, 3)]);
        let from_0 = reference.distances_from(0);
        assert_eq!(from_0, vec![0, 2, 5]);
        let from_2 = reference.distances_from(2);
        assert_eq!(from_2[0], INVALID_EDGE_WEIGHT);
        assert_eq!(from_2[1], 3);
    }

    #[test]
    fn test_query_meets_at_top_node() {
        // 0 and 2 contracted below 1: each keeps its edge up to 1
        let edges = vec![edge(0, 1, 2, true, false), edge(2, 1, 3, false, true)];
        let query = HierarchyQuery::new(3, &edges);
        assert_eq!(query.distance(0, 2), 5);
        assert_eq!(query.distance(2, 0), INVALID_EDGE_WEIGHT);
        assert_eq!(query.distance(1, 1), 0);
    }

    #[test]
    fn test_report_lists_mismatches() {
        let result = ValidationResult {
            n_tests: 2,
            correct: 1,
            incorrect: 1,
            unreachable_both: 0,
            errors: vec![ValidationError {
                source: 3,
                target: 7,
                dijkstra_dist: 10,
                ch_dist: 12,
            }],
        };
        let report = result.to_string();
        assert!(report.starts_with("validation MISMATCH: 1/2"));
        assert!(report.contains("3 -> 7: expected 10, hierarchy gave 12"));
        assert!(ValidationResult::default().to_string().starts_with("validation ok"));
    }
}
