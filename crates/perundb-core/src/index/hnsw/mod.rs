//! HNSW (Hierarchical Navigable Small World) index.
//!
//! Approximate nearest-neighbor search with logarithmic hop counts. The
//! graph itself never unlinks nodes; removal works through a tombstone
//! bitmap composed with every search, and re-inserting an id remaps it to
//! a fresh node and clears its tombstone. Orphaned nodes keep serving as
//! routing waypoints until a rebuild.

mod graph;
mod layer;

#[cfg(test)]
mod hnsw_tests;

use std::path::Path;

use roaring::RoaringTreemap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use self::graph::HnswGraph;
use self::layer::NodeId;
use super::{SearchOutput, VectorIndex};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

/// HNSW construction and search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Number of bi-directional links per node (M). Layer 0 uses `2 * m`.
    pub m: usize,
    /// Size of the dynamic candidate list during construction.
    pub ef_construction: usize,
    /// Size of the dynamic candidate list during search; raised to `k`
    /// when a caller asks for more results than this.
    pub ef_search: usize,
    /// Expected number of vectors; pre-sizes the arena.
    pub capacity: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            capacity: 1000,
        }
    }
}

/// On-disk form of an [`HnswIndex`]. Tombstones travel as roaring
/// portable bytes.
#[derive(Serialize, Deserialize)]
struct HnswSnapshot {
    dim: usize,
    params: HnswParams,
    graph: HnswGraph,
    id_to_node: FxHashMap<i64, NodeId>,
    node_to_id: Vec<i64>,
    tombstones: Vec<u8>,
}

/// Approximate index backed by an HNSW graph.
#[derive(Debug)]
pub struct HnswIndex {
    dim: usize,
    params: HnswParams,
    graph: HnswGraph,
    /// Current graph node for each live id.
    id_to_node: FxHashMap<i64, NodeId>,
    /// External id each node was created for; stale after a remap.
    node_to_id: Vec<i64>,
    /// Ids removed from search visibility.
    tombstones: RoaringTreemap,
}

impl HnswIndex {
    /// Creates an empty index for vectors of dimension `dim`.
    ///
    /// # Errors
    ///
    /// Returns an error for degenerate graph parameters.
    pub fn new(dim: usize, metric: DistanceMetric, params: HnswParams) -> Result<Self> {
        if params.m < 2 {
            return Err(Error::InvalidArgument(
                "hnsw parameter m must be >= 2".to_string(),
            ));
        }

        Ok(Self {
            dim,
            params,
            graph: HnswGraph::new(metric, params.m, params.ef_construction, params.capacity),
            id_to_node: FxHashMap::default(),
            node_to_id: Vec::with_capacity(params.capacity),
            tombstones: RoaringTreemap::new(),
        })
    }

    /// Returns the number of ids visible to search.
    #[must_use]
    pub fn len(&self) -> usize {
        let dead = usize::try_from(self.tombstones.len()).unwrap_or(usize::MAX);
        self.id_to_node.len().saturating_sub(dead)
    }

    /// Returns true if no id is visible to search.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A node is live when it is still the current node for its id and the
    /// id is not tombstoned.
    fn is_live(&self, node: NodeId) -> bool {
        let id = self.node_to_id[node];
        self.id_to_node.get(&id) == Some(&node) && !self.tombstones.contains(id as u64)
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }

        let node = self.graph.insert(vector.to_vec());
        debug_assert_eq!(node, self.node_to_id.len());
        self.node_to_id.push(id);
        self.id_to_node.insert(id, node);
        self.tombstones.remove(id as u64);
        Ok(())
    }

    fn remove(&mut self, ids: &[i64]) {
        for &id in ids {
            if self.id_to_node.contains_key(&id) {
                self.tombstones.insert(id as u64);
            }
        }
    }

    fn search(
        &self,
        queries: &[f32],
        k: usize,
        allow: Option<&RoaringTreemap>,
    ) -> Result<SearchOutput> {
        if k == 0 {
            return Err(Error::InvalidArgument("k must be >= 1".to_string()));
        }
        if queries.is_empty() || queries.len() % self.dim != 0 {
            return Err(Error::InvalidArgument(format!(
                "query buffer of {} floats is not a whole number of {}-dimensional rows",
                queries.len(),
                self.dim
            )));
        }

        let accept = |node: NodeId| {
            self.is_live(node)
                && allow.is_none_or(|bitmap| bitmap.contains(self.node_to_id[node] as u64))
        };
        let accept: &dyn Fn(NodeId) -> bool = &accept;

        let mut out = SearchOutput::default();
        for row in queries.chunks_exact(self.dim) {
            let hits = self
                .graph
                .search(row, k, self.params.ef_search, Some(accept))
                .into_iter()
                .map(|(node, dist)| (self.node_to_id[node], dist))
                .collect();
            out.push_row(hits, k);
        }
        Ok(out)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut tombstones = Vec::new();
        self.tombstones.serialize_into(&mut tombstones)?;

        let snapshot = HnswSnapshot {
            dim: self.dim,
            params: self.params,
            graph: self.graph.clone(),
            id_to_node: self.id_to_node.clone(),
            node_to_id: self.node_to_id.clone(),
            tombstones,
        };
        let bytes = bincode::serialize(&snapshot)?;

        let tmp = path.with_extension("index.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let bytes = std::fs::read(path)?;
        let snapshot: HnswSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| Error::Corrupted(format!("hnsw index snapshot: {e}")))?;
        if snapshot.dim != self.dim {
            return Err(Error::Corrupted(format!(
                "hnsw index snapshot has dimension {}, expected {}",
                snapshot.dim, self.dim
            )));
        }

        self.params = snapshot.params;
        self.graph = snapshot.graph;
        self.id_to_node = snapshot.id_to_node;
        self.node_to_id = snapshot.node_to_id;
        self.tombstones = RoaringTreemap::deserialize_from(&snapshot.tombstones[..])
            .map_err(|e| Error::Corrupted(format!("hnsw tombstone bitmap: {e}")))?;
        Ok(())
    }
}
