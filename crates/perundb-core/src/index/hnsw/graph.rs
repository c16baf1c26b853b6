//! HNSW graph structure.
//!
//! Hierarchical navigable small world graph after Malkov & Yashunin:
//! exponentially distributed node levels, greedy descent through the upper
//! layers, ef-bounded best-first search on layer 0, heuristic neighbor
//! pruning on insert.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::layer::{Layer, NodeId};
use crate::distance::DistanceMetric;

/// Hard cap on the number of layers.
const MAX_LEVEL: usize = 15;

/// Frontier entry of the layer search heaps.
///
/// `f32` has no total order, so the heaps key on `total_cmp`, with the node
/// id as a tie-break to keep equal-distance orderings deterministic.
#[derive(Clone, Copy)]
struct Scored {
    dist: f32,
    node: NodeId,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// The graph proper: vector arena plus one adjacency table per layer.
///
/// Nodes are append-only; visibility of removed or remapped nodes is the
/// owning index's concern. Search takes an `accept` predicate so stale
/// nodes still serve as routing waypoints without surfacing in results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HnswGraph {
    metric: DistanceMetric,
    vectors: Vec<Vec<f32>>,
    layers: Vec<Layer>,
    entry_point: Option<NodeId>,
    max_layer: usize,
    /// xorshift64 state for level selection.
    rng_state: u64,
    max_connections: usize,
    max_connections_0: usize,
    ef_construction: usize,
    level_mult: f64,
}

impl HnswGraph {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn new(
        metric: DistanceMetric,
        max_connections: usize,
        ef_construction: usize,
        capacity: usize,
    ) -> Self {
        Self {
            metric,
            vectors: Vec::with_capacity(capacity),
            layers: vec![Layer::with_capacity(capacity)],
            entry_point: None,
            max_layer: 0,
            rng_state: 0x5DEE_CE66_D1A4_B5B5,
            max_connections,
            max_connections_0: max_connections * 2,
            ef_construction,
            level_mult: 1.0 / (max_connections as f64).ln(),
        }
    }

    /// Inserts a vector and wires it into every layer up to its drawn
    /// level. Returns the new node's id.
    pub(crate) fn insert(&mut self, vector: Vec<f32>) -> NodeId {
        let node = self.vectors.len();
        self.vectors.push(vector);

        let node_layer = self.random_layer();
        while self.layers.len() <= node_layer {
            self.layers.push(Layer::default());
        }
        for layer in &mut self.layers {
            layer.ensure_node(node);
        }

        if let Some(ep) = self.entry_point {
            let mut current_ep = ep;
            for layer_idx in (node_layer + 1..=self.max_layer).rev() {
                current_ep = self.greedy_closest(node, current_ep, layer_idx);
            }

            for layer_idx in (0..=node_layer.min(self.max_layer)).rev() {
                let candidates =
                    self.search_layer(&self.vectors[node], &[current_ep], self.ef_construction, layer_idx, None);

                let max_conn = if layer_idx == 0 {
                    self.max_connections_0
                } else {
                    self.max_connections
                };
                let selected = self.select_neighbors(&candidates, max_conn);
                self.layers[layer_idx].set_neighbors(node, selected.clone());

                for neighbor in selected {
                    self.connect_back(node, neighbor, layer_idx, max_conn);
                }

                if let Some(&(closest, _)) = candidates.first() {
                    current_ep = closest;
                }
            }
        } else {
            self.entry_point = Some(node);
        }

        if node_layer > self.max_layer {
            self.max_layer = node_layer;
            self.entry_point = Some(node);
        }
        node
    }

    /// Searches for the `k` nearest accepted nodes.
    ///
    /// Traversal considers every node; `accept` only gates what may enter
    /// the result set, mirroring how filtered ANN search keeps filtered-out
    /// nodes as routing waypoints.
    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        accept: Option<&dyn Fn(NodeId) -> bool>,
    ) -> Vec<(NodeId, f32)> {
        let Some(ep) = self.entry_point else {
            return Vec::new();
        };

        let mut current_ep = ep;
        for layer_idx in (1..=self.max_layer).rev() {
            current_ep = self.greedy_closest_to(query, current_ep, layer_idx);
        }

        let ef = ef_search.max(k);
        let mut hits = self.search_layer(query, &[current_ep], ef, 0, accept);
        hits.truncate(k);
        hits
    }

    // =========================================================================
    // Private helpers
    // =========================================================================

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn random_layer(&mut self) -> usize {
        let mut state = self.rng_state;
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        self.rng_state = state;

        let uniform = (state as f64) / (u64::MAX as f64);
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn greedy_closest(&self, node: NodeId, entry: NodeId, layer: usize) -> NodeId {
        self.greedy_closest_to(&self.vectors[node], entry, layer)
    }

    /// Greedy descent within one layer: hop to the closest neighbor until
    /// no neighbor improves on the current node.
    fn greedy_closest_to(&self, query: &[f32], entry: NodeId, layer: usize) -> NodeId {
        let mut best = entry;
        let mut best_dist = self.metric.distance(query, &self.vectors[best]);

        loop {
            let mut improved = false;
            for &neighbor in self.layers[layer].neighbors(best) {
                let dist = self.metric.distance(query, &self.vectors[neighbor]);
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Best-first search of one layer bounded by `ef` result slots.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[NodeId],
        ef: usize,
        layer: usize,
        accept: Option<&dyn Fn(NodeId) -> bool>,
    ) -> Vec<(NodeId, f32)> {
        let admits = |node: NodeId| accept.is_none_or(|f| f(node));

        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        let mut results: BinaryHeap<Scored> = BinaryHeap::new();

        for &ep in entry_points {
            let scored = Scored {
                dist: self.metric.distance(query, &self.vectors[ep]),
                node: ep,
            };
            candidates.push(Reverse(scored));
            if admits(ep) {
                results.push(scored);
            }
            visited.insert(ep);
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let furthest = results.peek().map_or(f32::MAX, |r| r.dist);
            if current.dist > furthest && results.len() >= ef {
                break;
            }

            for &neighbor in self.layers[layer].neighbors(current.node) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = Scored {
                    dist: self.metric.distance(query, &self.vectors[neighbor]),
                    node: neighbor,
                };
                let furthest = results.peek().map_or(f32::MAX, |r| r.dist);
                if scored.dist < furthest || results.len() < ef {
                    candidates.push(Reverse(scored));
                    if admits(neighbor) {
                        results.push(scored);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<(NodeId, f32)> = results
            .into_iter()
            .map(|scored| (scored.node, scored.dist))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// Heuristic neighbor selection: prefer candidates closer to the query
    /// than to any already selected neighbor, then fill the quota with the
    /// remaining closest ones.
    fn select_neighbors(&self, candidates: &[(NodeId, f32)], max_neighbors: usize) -> Vec<NodeId> {
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|&(node, _)| node).collect();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            let diverse = selected.iter().all(|&s| {
                candidate_dist <= self.metric.distance(&self.vectors[candidate], &self.vectors[s])
            });
            if diverse || selected.is_empty() {
                selected.push(candidate);
            }
        }

        for &(candidate, _) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            if !selected.contains(&candidate) {
                selected.push(candidate);
            }
        }
        selected
    }

    /// Adds the back edge `neighbor -> node`, pruning to `max_conn` by
    /// distance when the neighbor's adjacency list is full.
    fn connect_back(&mut self, node: NodeId, neighbor: NodeId, layer: usize, max_conn: usize) {
        if self.layers[layer].neighbors(neighbor).len() < max_conn {
            self.layers[layer].add_neighbor(neighbor, node);
            return;
        }

        let mut with_dist: Vec<(NodeId, f32)> = self.layers[layer]
            .neighbors(neighbor)
            .iter()
            .copied()
            .chain(std::iter::once(node))
            .map(|n| {
                (
                    n,
                    self.metric
                        .distance(&self.vectors[neighbor], &self.vectors[n]),
                )
            })
            .collect();
        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));

        let pruned: Vec<NodeId> = with_dist
            .into_iter()
            .take(max_conn)
            .map(|(n, _)| n)
            .collect();
        self.layers[layer].set_neighbors(neighbor, pruned);
    }
}
