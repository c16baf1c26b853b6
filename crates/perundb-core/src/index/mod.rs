//! ANN index kinds and the engine-scoped index registry.
//!
//! Each [`IndexKind`] maps to exactly one [`VectorIndex`] instance per
//! database. The registry is owned by the engine; nothing here is global,
//! so multiple engines can coexist in one process.

mod flat;
pub mod hnsw;


pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use roaring::RoaringTreemap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Id reported for unfilled result slots when fewer than `k` candidates
/// exist. Callers strip these before returning results externally.
pub const SENTINEL_ID: i64 = -1;

/// The kinds of ANN index a database registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Exhaustive scan. Exact, supports removal and overwrite.
    Flat,
    /// Hierarchical navigable small world graph. Approximate, removal via
    /// tombstones.
    Hnsw,
}

impl IndexKind {
    /// Returns the lowercase name used in snapshot file names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Hnsw => "hnsw",
        }
    }

    /// Snapshot file name for this kind (`<kind>.index`).
    pub(crate) fn file_name(&self) -> String {
        format!("{}.index", self.as_str())
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "hnsw" => Ok(Self::Hnsw),
            other => Err(Error::UnknownIndex(other.to_string())),
        }
    }
}

/// Raw search results: `num_queries x k` row-major `(id, distance)` pairs,
/// each row sorted by ascending distance and padded with sentinels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutput {
    /// Matched record ids, [`SENTINEL_ID`] for unfilled slots.
    pub indices: Vec<i64>,
    /// Distances paired with `indices`, `f32::INFINITY` for unfilled slots.
    pub distances: Vec<f32>,
}

impl SearchOutput {
    /// Appends one query's hits as a row of exactly `k` slots.
    pub(crate) fn push_row(&mut self, hits: Vec<(i64, f32)>, k: usize) {
        let filled = hits.len().min(k);
        for (id, dist) in hits.into_iter().take(k) {
            self.indices.push(id);
            self.distances.push(dist);
        }
        for _ in filled..k {
            self.indices.push(SENTINEL_ID);
            self.distances.push(f32::INFINITY);
        }
    }
}

/// Contract every ANN index instance implements.
///
/// `search` takes a flat buffer of `num_queries x dim` floats; an optional
/// allow-list bitmap restricts the candidate set to the ids it contains.
/// `load` succeeds silently when the file is absent (empty start).
pub trait VectorIndex: Send + Sync {
    /// Adds a `(id, vector)` pair, replacing any previous vector for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error on dimension mismatch.
    fn insert(&mut self, id: i64, vector: &[f32]) -> Result<()>;

    /// Removes the given ids from search visibility. Unknown ids are
    /// ignored.
    fn remove(&mut self, ids: &[i64]);

    /// Searches for the `k` nearest neighbors of each query row.
    ///
    /// # Errors
    ///
    /// Returns an error if `k == 0` or the buffer is not a whole number of
    /// rows.
    fn search(
        &self,
        queries: &[f32],
        k: usize,
        allow: Option<&RoaringTreemap>,
    ) -> Result<SearchOutput>;

    /// Writes the index state to `path`, atomically from the caller's
    /// standpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file IO fails.
    fn save(&self, path: &Path) -> Result<()>;

    /// Restores the index state from `path`; an absent file leaves the
    /// index empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or was
    /// written for a different dimension.
    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Engine-scoped registry mapping each kind to its single instance.
#[derive(Default)]
pub struct IndexSet {
    indexes: FxHashMap<IndexKind, Box<dyn VectorIndex>>,
}

impl IndexSet {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `index` under `kind`, replacing any previous instance.
    pub fn register(&mut self, kind: IndexKind, index: Box<dyn VectorIndex>) {
        self.indexes.insert(kind, index);
    }

    /// Returns the instance for `kind`.
    #[must_use]
    pub fn get(&self, kind: IndexKind) -> Option<&dyn VectorIndex> {
        self.indexes.get(&kind).map(|index| &**index)
    }

    /// Returns the instance for `kind`, mutably.
    pub fn get_mut(&mut self, kind: IndexKind) -> Option<&mut Box<dyn VectorIndex>> {
        self.indexes.get_mut(&kind)
    }

    /// Saves every registered index to `dir/<kind>.index`.
    ///
    /// # Errors
    ///
    /// Returns the first save failure.
    pub fn save(&self, dir: &Path) -> Result<()> {
        for (kind, index) in &self.indexes {
            let path = dir.join(kind.file_name());
            index.save(&path).inspect_err(|e| {
                warn!(%kind, path = %path.display(), error = %e, "failed to save index");
            })?;
        }
        Ok(())
    }

    /// Loads every registered index from `dir/<kind>.index`; absent files
    /// leave the corresponding index empty.
    ///
    /// # Errors
    ///
    /// Returns the first load failure.
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        for (kind, index) in &mut self.indexes {
            let path = dir.join(kind.file_name());
            index.load(&path).inspect_err(|e| {
                warn!(%kind, path = %path.display(), error = %e, "failed to load index");
            })?;
        }
        Ok(())
    }
}
