//! Per-worker scratch state
//!
//! Each parallel task checks out one `ContractorThreadData` from the pool and
//! returns it on drop, so a witness search and its buffers are reused across
//! millions of contractions without ever being shared between two tasks at
//! once. Instances are created lazily when the pool runs dry and are sized to
//! the graph they will search.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ops::{Deref, DerefMut};

use crate::graph::{ContractorEdge, EdgeWeight, NodeId};
use crate::witness::WitnessSearch;

/// Scratch owned by one task at a time
pub struct ContractorThreadData {
    pub witness: WitnessSearch,
    /// Shortcuts produced by real contractions, drained after each commit
    pub inserted_edges: Vec<ContractorEdge>,
    /// Node-weight updates from necessary loops, drained with the shortcuts
    pub weight_updates: Vec<(NodeId, EdgeWeight)>,
    pub neighbours: Vec<NodeId>,
    /// Loop weights seen during the current contraction only
    pub loop_weights: FxHashMap<NodeId, EdgeWeight>,
}

impl ContractorThreadData {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            witness: WitnessSearch::new(n_nodes),
            inserted_edges: Vec::new(),
            weight_updates: Vec::new(),
            neighbours: Vec::new(),
            loop_weights: FxHashMap::default(),
        }
    }
}

/// Pool of scratch instances for the current graph size
pub struct ScratchPool {
    n_nodes: usize,
    idle: Mutex<Vec<ContractorThreadData>>,
}

impl ScratchPool {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    /// Number of instances currently parked in the pool
    pub fn n_idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Take an instance, allocating one if none is idle
    pub fn checkout(&self) -> ScratchGuard<'_> {
        let data = self.idle.lock().pop().unwrap_or_else(|| ContractorThreadData::new(self.n_nodes));
        debug_assert_eq!(data.witness.n_nodes(), self.n_nodes);
        ScratchGuard { pool: self, data: Some(data) }
    }

    /// Drop every instance; new ones are allocated for `n_nodes`.
    /// Pending shortcuts must have been drained first.
    pub fn resize(&mut self, n_nodes: usize) {
        let idle = self.idle.get_mut();
        debug_assert!(idle.iter().all(|d| d.inserted_edges.is_empty() && d.weight_updates.is_empty()));
        idle.clear();
        self.n_nodes = n_nodes;
    }

    /// Collect the shortcuts and node-weight updates parked in idle instances.
    /// Only meaningful between parallel phases, when every guard is back.
    pub fn drain_results(&self) -> (Vec<ContractorEdge>, Vec<(NodeId, EdgeWeight)>) {
        let mut idle = self.idle.lock();
        let mut edges = Vec::with_capacity(idle.iter().map(|d| d.inserted_edges.len()).sum());
        let mut weights = Vec::new();
        for data in idle.iter_mut() {
            edges.append(&mut data.inserted_edges);
            weights.append(&mut data.weight_updates);
        }
        (edges, weights)
    }

    fn give_back(&self, data: ContractorThreadData) {
        self.idle.lock().push(data);
    }
}

/// Exclusive handle on one scratch instance
pub struct ScratchGuard<'a> {
    pool: &'a ScratchPool,
    data: Option<ContractorThreadData>,
}

impl Deref for ScratchGuard<'_> {
    type Target = ContractorThreadData;

    fn deref(&self) -> &Self::Target {
        self.data.as_ref().expect("scratch guard used after drop")
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data.as_mut().expect("scratch guard used after drop")
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.give_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_reused() {
        let pool = ScratchPool::new(16);
        assert_eq!(pool.n_idle(), 0);
        {
            let _a = pool.checkout();
            let _b = pool.checkout();
        }
        assert_eq!(pool.n_idle(), 2);
        {
            let _a = pool.checkout();
            assert_eq!(pool.n_idle(), 1);
        }
        assert_eq!(pool.n_idle(), 2);
    }

    #[test]
    fn test_drain_collects_from_every_instance() {
        let pool = ScratchPool::new(4);
        {
            let mut a = pool.checkout();
            let mut b = pool.checkout();
            a.inserted_edges.push(ContractorEdge::shortcut(0, 1, 2, 2, 2, 3, true, false));
            b.inserted_edges.push(ContractorEdge::shortcut(1, 0, 2, 2, 2, 3, false, true));
            b.weight_updates.push((0, 5));
        }
        let (edges, weights) = pool.drain_results();
        assert_eq!(edges.len(), 2);
        assert_eq!(weights, vec![(0, 5)]);
        assert_eq!(pool.drain_results().0.len(), 0);
    }

    #[test]
    fn test_resize_allocates_for_new_size() {
        let mut pool = ScratchPool::new(8);
        drop(pool.checkout());
        pool.resize(3);
        assert_eq!(pool.n_idle(), 0);
        assert_eq!(pool.checkout().witness.n_nodes(), 3);
    }
}
