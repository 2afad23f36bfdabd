//! Parallel graph contraction
//!
//! Builds a contraction hierarchy by repeatedly removing an independent set
//! of low-priority nodes and inserting the shortcuts needed to keep every
//! distance between the remaining nodes intact.
//!
//! One round:
//! 1. Rank remaining nodes by (priority, tie-break hash)
//! 2. Mark the two-hop independent nodes of the leading batch
//! 3. Re-simulate them; anything that got worse than the batch threshold waits
//! 4. Assign levels, contract in parallel, then delete and insert edges
//! 5. Re-score the neighbours of every contracted node
//!
//! Once enough nodes are gone the working graph is flushed: contracted nodes'
//! edges move to [`EdgeStorage`] and the rest is renumbered densely.

mod contract_node;
mod independence;
mod priority;

pub use contract_node::{
    contract_node, merge_duplicate_shortcuts, simulate_contraction, ContractionContext, ContractionMode,
    ContractionStats,
};
pub use independence::{is_node_independent, rank_order, XorFastHash};
pub use priority::{evaluate_node_priority, node_priority, update_node_neighbours, NeighbourUpdate, NodeDepth};

use butterfly_common::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{validate_core_factor, ContractorConfig};
use crate::graph::{ContractorGraph, EdgeWeight, NodeId, Renumbering};
use crate::scratch::ScratchPool;
use crate::storage::{EdgeStorage, QueryEdge};

pub type NodeLevel = u32;

/// Level of a node that was never contracted
pub const INVALID_LEVEL: NodeLevel = u32::MAX;

/// Entry of the remaining-node worklist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingNode {
    pub id: NodeId,
    pub is_independent: bool,
}

impl RemainingNode {
    pub fn new(id: NodeId) -> Self {
        Self { id, is_independent: false }
    }
}

/// Run statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractionSummary {
    pub n_nodes: usize,
    pub n_contracted: usize,
    pub n_core: usize,
    pub n_rounds: usize,
    pub n_shortcuts: usize,
    /// Independent candidates pushed to a later round by re-simulation
    pub n_deferred: usize,
    /// Edges moved out of the working graph by the flush
    pub n_flushed_edges: usize,
    pub elapsed_ms: u64,
}

/// Everything a query engine needs, in original node ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractedHierarchy {
    pub node_levels: Vec<NodeLevel>,
    pub core_marker: Vec<bool>,
    pub edges: Vec<QueryEdge>,
}

pub struct GraphContractor {
    graph: ContractorGraph,
    config: ContractorConfig,
    /// Internal id -> original id, changes when the graph is flushed
    orig_node_id_from_new_node_id: Vec<NodeId>,
    /// By original id
    node_levels: Vec<NodeLevel>,
    /// By original id
    node_weights: Vec<EdgeWeight>,
    /// By original id
    is_core_node: Vec<bool>,
    /// Fixed priorities from a previous run's levels
    cached_priorities: Option<Vec<f32>>,
    fast_hash: XorFastHash,
    storage: EdgeStorage,
    has_run: bool,
}

impl GraphContractor {
    pub fn new(graph: ContractorGraph, config: ContractorConfig) -> Result<Self> {
        let node_weights = vec![0; graph.n_nodes()];
        Self::build(graph, config, node_weights, None)
    }

    /// Node weights penalise loops through a node; a loop shortcut is only
    /// kept when it is cheaper than the weight of its endpoint.
    pub fn with_node_weights(graph: ContractorGraph, config: ContractorConfig, node_weights: Vec<EdgeWeight>) -> Result<Self> {
        Self::build(graph, config, node_weights, None)
    }

    /// Contract in the order given by `node_levels` from an earlier run.
    /// Priorities stay fixed, so no simulation is done between rounds.
    pub fn with_cached_order(
        graph: ContractorGraph,
        config: ContractorConfig,
        node_levels: Vec<NodeLevel>,
        node_weights: Vec<EdgeWeight>,
    ) -> Result<Self> {
        if node_levels.len() != graph.n_nodes() {
            return Err(Error::invalid_graph(format!(
                "{} cached levels for {} nodes",
                node_levels.len(),
                graph.n_nodes()
            )));
        }
        let priorities = node_levels.iter().map(|&level| level as f32).collect();
        Self::build(graph, config, node_weights, Some(priorities))
    }

    fn build(
        graph: ContractorGraph,
        config: ContractorConfig,
        node_weights: Vec<EdgeWeight>,
        cached_priorities: Option<Vec<f32>>,
    ) -> Result<Self> {
        config.validate()?;
        let n_nodes = graph.n_nodes();
        if node_weights.len() != n_nodes {
            return Err(Error::invalid_graph(format!("{} node weights for {} nodes", node_weights.len(), n_nodes)));
        }
        let storage = EdgeStorage::new(config.edge_storage)?;

        Ok(Self {
            graph,
            config,
            orig_node_id_from_new_node_id: (0..n_nodes as NodeId).collect(),
            node_levels: vec![INVALID_LEVEL; n_nodes],
            node_weights,
            is_core_node: vec![false; n_nodes],
            cached_priorities,
            fast_hash: XorFastHash::default(),
            storage,
            has_run: false,
        })
    }

    pub fn config(&self) -> &ContractorConfig {
        &self.config
    }

    /// Working graph in internal ids
    pub fn graph(&self) -> &ContractorGraph {
        &self.graph
    }

    /// Contraction rank per original node, `INVALID_LEVEL` for core nodes
    pub fn node_levels(&self) -> &[NodeLevel] {
        &self.node_levels
    }

    /// True for nodes left uncontracted by a partial run
    pub fn core_marker(&self) -> &[bool] {
        &self.is_core_node
    }

    /// Node weights by original id, including loop updates
    pub fn node_weights(&self) -> &[EdgeWeight] {
        &self.node_weights
    }

    fn context(&self) -> ContractionContext<'_> {
        ContractionContext {
            graph: &self.graph,
            node_weights: &self.node_weights,
            orig_ids: &self.orig_node_id_from_new_node_id,
            simulation_search_space: self.config.simulation_search_space,
            full_search_space: self.config.full_search_space,
        }
    }

    /// Contract `core_factor * n_nodes` nodes (rounded down); the rest
    /// become the core.
    pub fn run(&mut self, core_factor: f64) -> Result<ContractionSummary> {
        self.run_observed(core_factor, |_, _| {})
    }

    /// [`run`](Self::run), handing every committed batch (internal ids) and
    /// the working graph it was selected on to `on_batch` before contraction.
    pub(crate) fn run_observed(
        &mut self,
        core_factor: f64,
        mut on_batch: impl FnMut(&ContractorGraph, &[NodeId]),
    ) -> Result<ContractionSummary> {
        validate_core_factor(core_factor)?;
        if self.has_run {
            return Err(Error::invalid_config("contraction already ran on this graph"));
        }
        self.has_run = true;

        let start = Instant::now();
        let n_nodes = self.graph.n_nodes();
        let n_to_contract = (n_nodes as f64 * core_factor) as usize;
        let flush_threshold = (n_nodes as f64 * self.config.flush_fraction * core_factor) as usize;
        let mut summary = ContractionSummary {
            n_nodes,
            ..Default::default()
        };

        let mut pool = ScratchPool::new(n_nodes);
        let mut remaining: Vec<RemainingNode> = (0..n_nodes as NodeId).map(RemainingNode::new).collect();
        let mut node_depth: Vec<NodeDepth> = vec![0; n_nodes];

        let use_cached_order = self.cached_priorities.is_some();
        let mut priorities = match self.cached_priorities.take() {
            Some(priorities) => priorities,
            None => {
                info!(n_nodes, "Initializing elimination priorities");
                let ctx = self.context();
                (0..n_nodes as NodeId)
                    .into_par_iter()
                    .map_init(|| pool.checkout(), |data, node| evaluate_node_priority(&ctx, data, 0, node))
                    .collect()
            }
        };

        info!(
            n_nodes,
            n_edges = self.graph.n_edges(),
            n_to_contract,
            cached_order = use_cached_order,
            "Contracting graph"
        );

        let mut n_contracted = 0usize;
        let mut next_level: NodeLevel = 0;
        let mut flushed = false;
        let report_every = (n_to_contract / 10).max(1);
        let mut next_report = report_every;

        while !remaining.is_empty() && n_contracted < n_to_contract {
            if !flushed && self.config.flush_fraction < 1.0 && n_contracted > flush_threshold {
                self.flush(&mut remaining, &mut priorities, &mut node_depth)?;
                pool.resize(self.graph.n_nodes());
                summary.n_flushed_edges = self.storage.len();
                flushed = true;
            }

            {
                let hash = &self.fast_hash;
                let orig_ids = &self.orig_node_id_from_new_node_id[..];
                let priorities = &priorities;
                remaining.par_sort_unstable_by(|a, b| rank_order(priorities, hash, orig_ids, a.id, b.id));
            }

            let batch_len = ((remaining.len() as f64 * self.config.batch_fraction).ceil() as usize).clamp(1, remaining.len());
            let threshold = priorities[remaining[batch_len - 1].id as usize];

            {
                let graph = &self.graph;
                let hash = &self.fast_hash;
                let orig_ids = &self.orig_node_id_from_new_node_id[..];
                let priorities = &priorities;
                remaining[..batch_len]
                    .par_iter_mut()
                    .for_each_init(|| pool.checkout(), |data, candidate| {
                        candidate.is_independent =
                            is_node_independent(graph, hash, priorities, orig_ids, &mut data.neighbours, candidate.id);
                    });
            }

            if !use_cached_order {
                let ctx = self.context();
                let depths = &node_depth;
                let refreshed: Vec<(usize, f32)> = remaining[..batch_len]
                    .par_iter()
                    .enumerate()
                    .filter(|(_, candidate)| candidate.is_independent)
                    .map_init(
                        || pool.checkout(),
                        |data, (pos, candidate)| {
                            let depth = depths[candidate.id as usize];
                            (pos, evaluate_node_priority(&ctx, data, depth, candidate.id))
                        },
                    )
                    .collect();

                summary.n_deferred += defer_worsened(&mut remaining, &mut priorities, &refreshed, threshold);
            }

            let capacity = n_to_contract - n_contracted;
            let mut batch: Vec<NodeId> = Vec::new();
            remaining.retain_mut(|candidate| {
                if candidate.is_independent && batch.len() < capacity {
                    batch.push(candidate.id);
                    false
                } else {
                    candidate.is_independent = false;
                    true
                }
            });
            if batch.is_empty() {
                return Err(Error::invalid_graph("no independent node left to contract"));
            }

            on_batch(&self.graph, &batch);

            for (offset, &node) in batch.iter().enumerate() {
                let orig = self.orig_node_id_from_new_node_id[node as usize];
                self.node_levels[orig as usize] = next_level + offset as NodeLevel;
            }
            next_level += batch.len() as NodeLevel;

            {
                let ctx = self.context();
                batch
                    .par_iter()
                    .for_each_init(|| pool.checkout(), |data, &node| contract_node(&ctx, data, node));
            }

            let (mut shortcuts, weight_updates) = pool.drain_results();
            self.graph.delete_incoming_edges(&batch);
            shortcuts.par_sort_unstable();
            summary.n_shortcuts += self.graph.insert_edges(&shortcuts);
            for (node, weight) in weight_updates {
                let orig = self.orig_node_id_from_new_node_id[node as usize];
                self.node_weights[orig as usize] = weight;
            }

            if !use_cached_order {
                let ctx = self.context();
                let depths = &node_depth;
                let updates: Vec<Vec<NeighbourUpdate>> = batch
                    .par_iter()
                    .map_init(|| pool.checkout(), |data, &node| update_node_neighbours(&ctx, data, depths, node))
                    .collect();
                for update in updates.into_iter().flatten() {
                    node_depth[update.node as usize] = update.depth;
                    priorities[update.node as usize] = update.priority;
                }
            }

            n_contracted += batch.len();
            summary.n_rounds += 1;
            debug!(
                round = summary.n_rounds,
                batch = batch.len(),
                shortcuts = shortcuts.len(),
                remaining = remaining.len(),
                "Contracted independent set"
            );
            if n_contracted >= next_report {
                info!(
                    "  {:5.1}% contracted ({} / {} nodes)",
                    100.0 * n_contracted as f64 / n_to_contract as f64,
                    n_contracted,
                    n_to_contract
                );
                next_report += report_every;
            }
        }

        for candidate in &remaining {
            let orig = self.orig_node_id_from_new_node_id[candidate.id as usize];
            self.is_core_node[orig as usize] = true;
        }

        summary.n_contracted = n_contracted;
        summary.n_core = remaining.len();
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            n_contracted,
            n_core = summary.n_core,
            n_rounds = summary.n_rounds,
            n_shortcuts = summary.n_shortcuts,
            n_deferred = summary.n_deferred,
            elapsed_ms = summary.elapsed_ms,
            "Contraction complete"
        );
        Ok(summary)
    }

    /// Move contracted nodes' edges into storage and renumber the rest
    fn flush(&mut self, remaining: &mut [RemainingNode], priorities: &mut Vec<f32>, node_depth: &mut Vec<NodeDepth>) -> Result<()> {
        let renumbering = Renumbering::keep(self.graph.n_nodes(), remaining.iter().map(|c| c.id));
        let dropped = self.graph.renumber(&renumbering);

        let orig_ids = &self.orig_node_id_from_new_node_id;
        self.storage
            .extend(dropped.iter().map(|edge| QueryEdge::from_contractor_edge(edge, orig_ids)))?;

        let old_from_new = &renumbering.old_from_new;
        *priorities = compact(priorities, old_from_new);
        *node_depth = compact(node_depth, old_from_new);
        self.orig_node_id_from_new_node_id = compact(&self.orig_node_id_from_new_node_id, old_from_new);
        for candidate in remaining.iter_mut() {
            candidate.id = renumbering.new_from_old[candidate.id as usize];
        }

        info!(
            flushed_edges = dropped.len(),
            kept_nodes = renumbering.n_kept(),
            storage = ?self.storage.kind(),
            "Flushed contracted nodes out of the working graph"
        );
        Ok(())
    }

    /// Hierarchy edges in original ids: everything flushed earlier plus the
    /// current working graph. Sorted, exact duplicates removed.
    pub fn into_hierarchy(self) -> Result<ContractedHierarchy> {
        let GraphContractor {
            graph,
            orig_node_id_from_new_node_id,
            node_levels,
            is_core_node,
            storage,
            ..
        } = self;

        let mut edges = storage.into_vec()?;
        edges.extend(
            graph
                .edges()
                .map(|edge| QueryEdge::from_contractor_edge(&edge, &orig_node_id_from_new_node_id)),
        );
        edges.par_sort_unstable();
        edges.dedup();

        Ok(ContractedHierarchy {
            node_levels,
            core_marker: is_core_node,
            edges,
        })
    }
}

/// Store re-simulated priorities of the independent candidates and drop
/// those that now rank above `threshold`. `refreshed` holds (position in
/// `remaining`, new priority) in rank order. If every candidate got worse
/// the best-ranked one is kept so the round still makes progress.
/// Returns the number of deferred candidates.
fn defer_worsened(remaining: &mut [RemainingNode], priorities: &mut [f32], refreshed: &[(usize, f32)], threshold: f32) -> usize {
    let mut n_deferred = 0usize;
    for &(pos, priority) in refreshed {
        let candidate = &mut remaining[pos];
        priorities[candidate.id as usize] = priority;
        if priority > threshold {
            candidate.is_independent = false;
            n_deferred += 1;
        }
    }
    if n_deferred > 0 && n_deferred == refreshed.len() {
        remaining[refreshed[0].0].is_independent = true;
        n_deferred -= 1;
    }
    n_deferred
}

fn compact<T: Copy>(values: &[T], old_from_new: &[NodeId]) -> Vec<T> {
    old_from_new.iter().map(|&old| values[old as usize]).collect()
}
