//! Synthetic road-like graphs for benchmarks and tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::{InputEdge, NodeId};

/// Share of grid streets that are one-way
const ONE_WAY_RATIO: f64 = 0.15;

/// `width x height` grid with random weights in 1..=100.
///
/// Node `(x, y)` has id `y * width + x`. Roughly 15% of the streets are
/// one-way, in a random direction. The same seed always yields the same
/// graph.
pub fn grid_graph(width: u32, height: u32, seed: u64) -> (usize, Vec<InputEdge>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let id = |x: u32, y: u32| -> NodeId { y * width + x };
    let mut edges = Vec::with_capacity(2 * (width * height) as usize);

    for y in 0..height {
        for x in 0..width {
            let here = id(x, y);
            let mut street = |there: NodeId, rng: &mut StdRng| {
                let weight = rng.random_range(1..=100);
                let edge = if rng.random_bool(ONE_WAY_RATIO) {
                    if rng.random_bool(0.5) {
                        InputEdge::directed(here, there, weight)
                    } else {
                        InputEdge::directed(there, here, weight)
                    }
                } else {
                    InputEdge::bidirectional(here, there, weight)
                };
                edges.push(edge);
            };
            if x + 1 < width {
                street(id(x + 1, y), &mut rng);
            }
            if y + 1 < height {
                street(id(x, y + 1), &mut rng);
            }
        }
    }

    ((width * height) as usize, edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shape() {
        let (n_nodes, edges) = grid_graph(4, 3, 1);
        assert_eq!(n_nodes, 12);
        // 3 * 3 horizontal + 4 * 2 vertical
        assert_eq!(edges.len(), 17);
        assert!(edges.iter().all(|e| (1..=100).contains(&e.weight)));
    }

    #[test]
    fn test_same_seed_same_graph() {
        assert_eq!(grid_graph(10, 10, 42).1, grid_graph(10, 10, 42).1);
        assert_ne!(grid_graph(10, 10, 42).1, grid_graph(10, 10, 43).1);
    }
}
