//! Elimination priorities
//!
//! Lower is contracted earlier. The score blends the edge difference and the
//! original-edge difference of a simulated contraction with the node's depth
//! in the hierarchy built so far.

use super::contract_node::{simulate_contraction, ContractionContext, ContractionStats};
use crate::graph::NodeId;
use crate::scratch::ContractorThreadData;

/// Hierarchy depth bookkeeping, the longest chain of contracted nodes below
pub type NodeDepth = u32;

/// Score of a simulated contraction
#[inline]
pub fn node_priority(stats: &ContractionStats, depth: NodeDepth) -> f32 {
    if stats.edges_deleted == 0 || stats.original_edges_deleted == 0 {
        return depth as f32;
    }
    let edge_quotient = stats.edges_added as f32 / stats.edges_deleted as f32;
    let original_quotient = stats.original_edges_added as f32 / stats.original_edges_deleted as f32;
    2.0 * edge_quotient + 4.0 * original_quotient + depth as f32
}

pub fn evaluate_node_priority(
    ctx: &ContractionContext<'_>,
    data: &mut ContractorThreadData,
    depth: NodeDepth,
    node: NodeId,
) -> f32 {
    node_priority(&simulate_contraction(ctx, data, node), depth)
}

/// New depth and priority of a neighbour after `node` was contracted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighbourUpdate {
    pub node: NodeId,
    pub depth: NodeDepth,
    pub priority: f32,
}

/// Recompute every remaining neighbour of the just-contracted `node`.
///
/// Must run after the batch's edges were deleted and its shortcuts inserted,
/// so `node`'s own list only reaches nodes still in the graph.
pub fn update_node_neighbours(
    ctx: &ContractionContext<'_>,
    data: &mut ContractorThreadData,
    depths: &[NodeDepth],
    node: NodeId,
) -> Vec<NeighbourUpdate> {
    let mut neighbours = std::mem::take(&mut data.neighbours);
    neighbours.clear();
    neighbours.extend(
        ctx.graph
            .adjacent_edges(node)
            .iter()
            .map(|e| e.target)
            .filter(|&u| u != node),
    );
    neighbours.sort_unstable();
    neighbours.dedup();

    let child_depth = depths[node as usize] + 1;
    let updates = neighbours
        .iter()
        .map(|&u| {
            let depth = depths[u as usize].max(child_depth);
            NeighbourUpdate {
                node: u,
                depth,
                priority: evaluate_node_priority(ctx, data, depth, u),
            }
        })
        .collect();

    data.neighbours = neighbours;
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FULL_SEARCH_SPACE_SIZE, SIMULATION_SEARCH_SPACE_SIZE};
    use crate::graph::{ContractorGraph, InputEdge};

    #[test]
    fn test_isolated_node_scores_its_depth() {
        let stats = ContractionStats::default();
        assert_eq!(node_priority(&stats, 0), 0.0);
        assert_eq!(node_priority(&stats, 7), 7.0);
    }

    #[test]
    fn test_priority_formula() {
        let stats = ContractionStats {
            edges_deleted: 2,
            edges_added: 2,
            original_edges_deleted: 2,
            original_edges_added: 4,
        };
        // 2 * 1 + 4 * 2 + 3
        assert_eq!(node_priority(&stats, 3), 13.0);
    }

    #[test]
    fn test_neighbours_inherit_depth() {
        // star around node 0 after contraction: 0 still lists 1 and 2
        let graph = ContractorGraph::from_input_edges(3, &[InputEdge::bidirectional(0, 1, 1), InputEdge::bidirectional(0, 2, 1)]).unwrap();
        let weights = vec![0; 3];
        let orig: Vec<NodeId> = (0..3).collect();
        let ctx = ContractionContext {
            graph: &graph,
            node_weights: &weights,
            orig_ids: &orig,
            simulation_search_space: SIMULATION_SEARCH_SPACE_SIZE,
            full_search_space: FULL_SEARCH_SPACE_SIZE,
        };
        let mut data = ContractorThreadData::new(3);
        let depths = vec![2, 0, 5];

        let updates = update_node_neighbours(&ctx, &mut data, &depths, 0);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].node, 1);
        assert_eq!(updates[0].depth, 3);
        assert_eq!(updates[1].node, 2);
        assert_eq!(updates[1].depth, 5);
        assert!(updates.iter().all(|u| u.priority >= u.depth as f32));
    }
}
