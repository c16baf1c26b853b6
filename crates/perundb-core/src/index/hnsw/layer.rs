//! A single layer in the HNSW hierarchy.

use serde::{Deserialize, Serialize};

/// Identifier of a graph node; indexes the vector arena.
pub(crate) type NodeId = usize;

/// Adjacency lists of one layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Layer {
    neighbors: Vec<Vec<NodeId>>,
}

impl Layer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            neighbors: Vec::with_capacity(capacity),
        }
    }

    /// Grows the adjacency table so `node` has a slot.
    pub(crate) fn ensure_node(&mut self, node: NodeId) {
        while self.neighbors.len() <= node {
            self.neighbors.push(Vec::new());
        }
    }

    pub(crate) fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.neighbors.get(node).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn set_neighbors(&mut self, node: NodeId, neighbors: Vec<NodeId>) {
        self.ensure_node(node);
        self.neighbors[node] = neighbors;
    }

    pub(crate) fn add_neighbor(&mut self, node: NodeId, neighbor: NodeId) {
        self.ensure_node(node);
        self.neighbors[node].push(neighbor);
    }
}
