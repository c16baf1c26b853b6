//! Exhaustive-scan index.
//!
//! Exact results at O(n) per query. Re-inserting an id overwrites its
//! vector, and removal is physical, which makes this kind the reference
//! behavior the approximate kinds are measured against.

use std::path::Path;

use roaring::RoaringTreemap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{SearchOutput, VectorIndex};
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

/// Exhaustive-scan index over all stored vectors.
pub struct FlatIndex {
    dim: usize,
    metric: DistanceMetric,
    vectors: FxHashMap<i64, Vec<f32>>,
}

/// On-disk form of a [`FlatIndex`].
#[derive(Serialize, Deserialize)]
struct FlatSnapshot {
    dim: usize,
    metric: DistanceMetric,
    vectors: FxHashMap<i64, Vec<f32>>,
}

impl FlatIndex {
    /// Creates an empty index for vectors of dimension `dim`.
    #[must_use]
    pub fn new(dim: usize, metric: DistanceMetric) -> Self {
        Self {
            dim,
            metric,
            vectors: FxHashMap::default(),
        }
    }

    /// Returns the number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if no vectors are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        self.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, ids: &[i64]) {
        for id in ids {
            self.vectors.remove(id);
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

        let mut out = SearchOutput::default();
        for row in queries.chunks_exact(self.dim) {
            // Exhaustive by definition: score everything, sort, keep k.
            let mut hits: Vec<(i64, f32)> = self
                .vectors
                .iter()
                .filter(|(id, _)| allow.is_none_or(|bitmap| bitmap.contains(**id as u64)))
                .map(|(&id, vector)| (id, self.metric.distance(row, vector)))
                .collect();
            hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            hits.truncate(k);
            out.push_row(hits, k);
        }
        Ok(out)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let snapshot = FlatSnapshot {
            dim: self.dim,
            metric: self.metric,
            vectors: self.vectors.clone(),
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
        let snapshot: FlatSnapshot = bincode::deserialize(&bytes)
            .map_err(|e| Error::Corrupted(format!("flat index snapshot: {e}")))?;
        if snapshot.dim != self.dim {
            return Err(Error::Corrupted(format!(
                "flat index snapshot has dimension {}, expected {}",
                snapshot.dim, self.dim
            )));
        }

        self.metric = snapshot.metric;
        self.vectors = snapshot.vectors;
        Ok(())
    }
}
