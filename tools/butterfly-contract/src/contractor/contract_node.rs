//! Single-node contraction
//!
//! For every incoming arc (u -> x) and outgoing arc (x -> w) of the node x
//! being removed, the shortcut u -> w is needed unless a witness path that
//! avoids x is at most as heavy. The same routine runs in two modes:
//!
//! - simulate: count what contraction would do, used for priorities
//! - real: emit the shortcuts and loop-weight updates into thread scratch
//!
//! Neither mode touches the graph; the driver applies real results after the
//! parallel phase.

use crate::graph::{ContractorEdge, ContractorEdgeData, ContractorGraph, EdgeWeight, NodeId};
use crate::scratch::ContractorThreadData;

/// Shared read-only inputs of one parallel phase
#[derive(Clone, Copy)]
pub struct ContractionContext<'a> {
    pub graph: &'a ContractorGraph,
    /// Loop penalty per node, by original id
    pub node_weights: &'a [EdgeWeight],
    /// Internal id -> original id
    pub orig_ids: &'a [NodeId],
    pub simulation_search_space: usize,
    pub full_search_space: usize,
}

/// What contracting a node would do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContractionStats {
    pub edges_deleted: u32,
    pub edges_added: u32,
    pub original_edges_deleted: u64,
    pub original_edges_added: u64,
}

impl ContractionStats {
    fn record_shortcut_pair(&mut self, in_data: &ContractorEdgeData, out_data: &ContractorEdgeData) {
        self.edges_added += 2;
        self.original_edges_added += 2 * (u64::from(in_data.original_edges) + u64::from(out_data.original_edges));
    }
}

pub enum ContractionMode<'s> {
    Simulate(&'s mut ContractionStats),
    Real,
}

/// Dry run, nothing is emitted
pub fn simulate_contraction(ctx: &ContractionContext<'_>, data: &mut ContractorThreadData, node: NodeId) -> ContractionStats {
    let mut stats = ContractionStats::default();
    contract(ctx, data, node, ContractionMode::Simulate(&mut stats));
    stats
}

/// Real contraction. Shortcuts land in `data.inserted_edges`, duplicates
/// from this node already merged; loop weights land in `data.weight_updates`.
pub fn contract_node(ctx: &ContractionContext<'_>, data: &mut ContractorThreadData, node: NodeId) {
    contract(ctx, data, node, ContractionMode::Real);
}

fn contract(ctx: &ContractionContext<'_>, data: &mut ContractorThreadData, node: NodeId, mut mode: ContractionMode<'_>) {
    let ContractorThreadData {
        witness,
        inserted_edges,
        weight_updates,
        loop_weights,
        ..
    } = data;

    let graph = ctx.graph;
    let adjacency = graph.adjacent_edges(node);
    let via = ctx.orig_ids[node as usize];
    let settle_limit = match mode {
        ContractionMode::Simulate(_) => ctx.simulation_search_space,
        ContractionMode::Real => ctx.full_search_space,
    };
    let inserted_start = inserted_edges.len();
    loop_weights.clear();

    for in_edge in adjacency {
        let source = in_edge.target;
        if source == node {
            continue;
        }
        let in_data = &in_edge.data;

        if let ContractionMode::Simulate(stats) = &mut mode {
            stats.edges_deleted += 1;
            stats.original_edges_deleted += u64::from(in_data.original_edges);
        }
        if !in_data.backward {
            continue;
        }

        witness.clear();
        witness.insert_source(source);
        let mut max_weight: EdgeWeight = 0;
        let mut n_targets = 0usize;

        for out_edge in adjacency {
            let out_data = &out_edge.data;
            let target = out_edge.target;
            if !out_data.forward || target == node {
                continue;
            }
            let path_weight = in_data.weight.saturating_add(out_data.weight);

            if target == source {
                // u -> x -> u: keep the loop only if it beats the node weight
                let current = loop_weights
                    .get(&source)
                    .copied()
                    .unwrap_or(ctx.node_weights[ctx.orig_ids[source as usize] as usize]);
                if path_weight < current {
                    match &mut mode {
                        ContractionMode::Simulate(stats) => {
                            loop_weights.insert(source, path_weight.saturating_add(1));
                            stats.record_shortcut_pair(in_data, out_data);
                        }
                        ContractionMode::Real => {
                            loop_weights.insert(source, path_weight);
                            push_shortcut_pair(inserted_edges, source, target, in_data, out_data, via);
                        }
                    }
                }
                continue;
            }

            max_weight = max_weight.max(path_weight);
            if witness.insert_target(target) {
                n_targets += 1;
            }
        }

        if n_targets > 0 {
            witness.run(graph, n_targets, settle_limit, max_weight, node);
        }

        for out_edge in adjacency {
            let out_data = &out_edge.data;
            let target = out_edge.target;
            if !out_data.forward || target == node || target == source {
                continue;
            }
            let path_weight = in_data.weight.saturating_add(out_data.weight);
            if path_weight < witness.get_key(target) {
                match &mut mode {
                    ContractionMode::Simulate(stats) => stats.record_shortcut_pair(in_data, out_data),
                    ContractionMode::Real => push_shortcut_pair(inserted_edges, source, target, in_data, out_data, via),
                }
            }
        }
    }

    if matches!(mode, ContractionMode::Real) {
        merge_duplicate_shortcuts(inserted_edges, inserted_start);
        weight_updates.extend(loop_weights.iter().map(|(&node, &weight)| (node, weight)));
    }
}

/// Forward half at `source`, backward half at `target`
fn push_shortcut_pair(
    edges: &mut Vec<ContractorEdge>,
    source: NodeId,
    target: NodeId,
    in_data: &ContractorEdgeData,
    out_data: &ContractorEdgeData,
    via: NodeId,
) {
    let weight = in_data.weight.saturating_add(out_data.weight);
    let duration = in_data.duration.saturating_add(out_data.duration);
    let original_edges = in_data.original_edges.saturating_add(out_data.original_edges);
    edges.push(ContractorEdge::shortcut(source, target, weight, duration, original_edges, via, true, false));
    edges.push(ContractorEdge::shortcut(target, source, weight, duration, original_edges, via, false, true));
}

/// Merge shortcuts in `edges[start..]` that agree on source, target, weight
/// and via-node into one entry whose direction flags are OR-ed together.
pub fn merge_duplicate_shortcuts(edges: &mut Vec<ContractorEdge>, start: usize) {
    if edges.len() - start < 2 {
        return;
    }
    edges[start..].sort_unstable_by_key(|e| (e.source, e.target, e.data.weight, e.data.via, e.data.duration));

    let mut write = start;
    for read in start..edges.len() {
        let edge = edges[read];
        if write > start {
            let last = &mut edges[write - 1];
            if last.source == edge.source
                && last.target == edge.target
                && last.data.weight == edge.data.weight
                && last.data.via == edge.data.via
            {
                last.data.forward |= edge.data.forward;
                last.data.backward |= edge.data.backward;
                continue;
            }
        }
        edges[write] = edge;
        write += 1;
    }
    edges.truncate(write);
}
