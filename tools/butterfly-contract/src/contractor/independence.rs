//! Independent node set selection
//!
//! A node may join the current batch only if it beats every node within two
//! hops. Two accepted nodes therefore never share a neighbour, so their
//! shortcut insertions and edge deletions touch disjoint adjacency lists.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering;

use crate::graph::{ContractorGraph, NodeId};

const TABLE_SIZE: usize = 1 << 16;
const TABLE_SEED: u64 = 0x6275_7474_6572_666c;

/// Two shuffled 16-bit tables XOR-ed over the halves of a node id.
///
/// Cheap, well-mixed and identical across runs, which is all the tie-break
/// needs.
pub struct XorFastHash {
    table1: Vec<u16>,
    table2: Vec<u16>,
}

impl Default for XorFastHash {
    fn default() -> Self {
        Self::with_seed(TABLE_SEED)
    }
}

impl XorFastHash {
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut table1: Vec<u16> = (0..TABLE_SIZE).map(|v| v as u16).collect();
        let mut table2 = table1.clone();
        table1.shuffle(&mut rng);
        table2.shuffle(&mut rng);
        Self { table1, table2 }
    }

    #[inline]
    pub fn hash(&self, value: u32) -> u16 {
        let lsb = (value & 0xffff) as usize;
        let msb = (value >> 16) as usize;
        self.table1[lsb] ^ self.table2[msb]
    }

    /// True if `a` loses a priority tie against `b`. Exactly one of
    /// `bias(a, b)` and `bias(b, a)` holds for `a != b`.
    #[inline]
    pub fn bias(&self, a: NodeId, b: NodeId) -> bool {
        let hash_a = self.hash(a);
        let hash_b = self.hash(b);
        if hash_a != hash_b {
            return hash_a < hash_b;
        }
        a < b
    }
}

/// Total contraction order: lower priority first, ties go to the tie-break winner
pub fn rank_order(priorities: &[f32], hash: &XorFastHash, orig_ids: &[NodeId], a: NodeId, b: NodeId) -> Ordering {
    priorities[a as usize]
        .total_cmp(&priorities[b as usize])
        .then_with(|| {
            let (orig_a, orig_b) = (orig_ids[a as usize], orig_ids[b as usize]);
            if orig_a == orig_b {
                Ordering::Equal
            } else if hash.bias(orig_a, orig_b) {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        })
}

/// Can `node` be contracted together with every other independent node?
///
/// `neighbours` is caller-owned scratch.
pub fn is_node_independent(
    graph: &ContractorGraph,
    hash: &XorFastHash,
    priorities: &[f32],
    orig_ids: &[NodeId],
    neighbours: &mut Vec<NodeId>,
    node: NodeId,
) -> bool {
    let priority = priorities[node as usize];
    let orig_node = orig_ids[node as usize];

    let loses_to = |other: NodeId| {
        let other_priority = priorities[other as usize];
        priority > other_priority || (priority == other_priority && hash.bias(orig_node, orig_ids[other as usize]))
    };

    neighbours.clear();
    for edge in graph.adjacent_edges(node) {
        let target = edge.target;
        if target == node {
            continue;
        }
        if loses_to(target) {
            return false;
        }
        neighbours.push(target);
    }

    neighbours.sort_unstable();
    neighbours.dedup();

    // Everything two hops away
    for &u in neighbours.iter() {
        for edge in graph.adjacent_edges(u) {
            let target = edge.target;
            if target == node {
                continue;
            }
            if loses_to(target) {
                return false;
            }
        }
    }

    true
}
