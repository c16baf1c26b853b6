//! The database engine.
//!
//! Coordinates one persistence manager, one bitmap attribute index and one
//! ANN index set. All mutating operations take `&mut self`: the engine is
//! single-writer by construction, and read-only operations (`search`,
//! `query`) are safe to run concurrently between themselves.
//!
//! Durability protocol: `upsert` validates its arguments, appends the
//! encoded envelope to the WAL, then applies it to the KV store, bitmaps
//! and the target index. `reload` restores the latest snapshot and applies
//! the WAL suffix through the same internal path, so a recovered database
//! is observably identical to one that never restarted.

use tracing::{debug, info};

use crate::bitmap::{FieldBitmap, FilterOp};
use crate::config::PerunConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::{
    FlatIndex, HnswIndex, HnswParams, IndexKind, IndexSet, SearchOutput, VectorIndex,
};
use crate::persistence::{Persistence, WalOp};
use crate::record::UpsertRequest;

/// An attribute filter attached to a search.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    /// Field name the filter applies to.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value compared against.
    pub value: i64,
}

/// A vector similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Index kind to search.
    pub kind: IndexKind,
    /// Flat buffer of `num_queries x dim` floats.
    pub query: Vec<f32>,
    /// Neighbors per query.
    pub k: usize,
    /// Optional attribute filter.
    pub filter: Option<FieldFilter>,
}

/// The top-level engine.
pub struct Database {
    dim: usize,
    persistence: Persistence,
    bitmap: FieldBitmap,
    indexes: IndexSet,
}

impl Database {
    /// Opens a database described by `config`, registering one FLAT and
    /// one HNSW index of the configured dimension (L2 metric).
    ///
    /// The on-disk state is opened but not applied; call
    /// [`Database::reload`] to restore it.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid configuration or if a store cannot be
    /// opened.
    pub fn open(config: &PerunConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let persistence = Persistence::open(&config.storage.data_dir, config.wal.version)?;
        let dim = config.index.dim;

        let mut indexes = IndexSet::new();
        indexes.register(
            IndexKind::Flat,
            Box::new(FlatIndex::new(dim, DistanceMetric::L2)),
        );
        indexes.register(
            IndexKind::Hnsw,
            Box::new(HnswIndex::new(
                dim,
                DistanceMetric::L2,
                HnswParams {
                    m: config.hnsw.m,
                    ef_construction: config.hnsw.ef_construction,
                    ef_search: config.hnsw.ef_search,
                    capacity: config.index.num_data,
                },
            )?),
        );

        info!(data_dir = %config.storage.data_dir, dim, "opened database");
        Ok(Self {
            dim,
            persistence,
            bitmap: FieldBitmap::new(),
            indexes,
        })
    }

    /// The vector dimension this database was opened with.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Creates or replaces a record.
    ///
    /// The encoded envelope reaches the WAL before any state changes; an
    /// invalid request fails with no side effects at all.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown kinds, wrong dimensions, or on WAL /
    /// storage failures.
    pub fn upsert(&mut self, request: UpsertRequest) -> Result<()> {
        if self.indexes.get(request.kind).is_none() {
            return Err(Error::UnknownIndex(request.kind.to_string()));
        }
        if request.record.vector.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: request.record.vector.len(),
            });
        }

        let encoded = bincode::serialize(&request)?;
        self.persistence.write_wal(WalOp::Upsert, &encoded)?;
        self.apply_upsert(&request, &encoded)
    }

    /// Applies an envelope to the KV store, bitmaps and target index.
    /// Shared by live upserts (after their WAL append) and replay.
    fn apply_upsert(&mut self, request: &UpsertRequest, encoded: &[u8]) -> Result<()> {
        let record = &request.record;

        let prior = match self.persistence.get_record(record.id)? {
            Some(bytes) => Some(bincode::deserialize::<UpsertRequest>(&bytes).map_err(|e| {
                Error::Corrupted(format!("stored envelope for id {}: {e}", record.id))
            })?),
            None => None,
        };

        let index = self
            .indexes
            .get_mut(request.kind)
            .ok_or_else(|| Error::UnknownIndex(request.kind.to_string()))?;
        if prior.is_some() {
            index.remove(&[record.id]);
        }

        // The old value comes from the decoded prior envelope, never from
        // the caller; this is what keeps the per-field bitmaps disjoint.
        for (name, value) in &record.fields {
            let old = prior
                .as_ref()
                .and_then(|p| p.record.fields.get(name))
                .copied();
            self.bitmap.update(record.id, name, *value, old);
        }

        self.persistence.put_record(record.id, encoded)?;
        index.insert(record.id, &record.vector)?;

        debug!(id = record.id, kind = %request.kind, "applied upsert");
        Ok(())
    }

    /// Searches for nearest neighbors, optionally restricted by an
    /// attribute filter.
    ///
    /// Results are raw: `num_queries x k` row-major pairs sorted by
    /// ascending distance with `-1` sentinels for unfilled slots.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown kinds, `k == 0` or a query buffer that
    /// is not a whole number of rows.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutput> {
        let index = self
            .indexes
            .get(request.kind)
            .ok_or_else(|| Error::UnknownIndex(request.kind.to_string()))?;

        let allow = request
            .filter
            .as_ref()
            .map(|f| self.bitmap.query(&f.field, f.value, f.op));

        index.search(&request.query, request.k, allow.as_ref())
    }

    /// Returns the payload last written for `id`, or `Ok(None)` if the
    /// record does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures or an unreadable envelope.
    pub fn query(&self, id: i64) -> Result<Option<Vec<u8>>> {
        match self.persistence.get_record(id)? {
            Some(bytes) => {
                let envelope: UpsertRequest = bincode::deserialize(&bytes).map_err(|e| {
                    Error::Corrupted(format!("stored envelope for id {id}: {e}"))
                })?;
                Ok(Some(envelope.record.payload))
            }
            None => Ok(None),
        }
    }

    /// Restores state after a restart: loads the latest snapshot, then
    /// applies every WAL entry past the snapshot's floor.
    ///
    /// # Errors
    ///
    /// Aborts on the first corrupt frame rather than skipping it, so
    /// acknowledged writes are never silently lost.
    pub fn reload(&mut self) -> Result<()> {
        info!("reloading database");
        self.load_snapshot()?;

        let mut applied = 0_u64;
        while let Some((op, data)) = self.persistence.read_next_wal()? {
            match op {
                WalOp::Upsert => {
                    let request: UpsertRequest = bincode::deserialize(&data)
                        .map_err(|e| Error::Corrupted(format!("WAL upsert envelope: {e}")))?;
                    self.apply_upsert(&request, &data)?;
                    applied += 1;
                }
            }
        }

        info!(applied, "database reloaded");
        Ok(())
    }

    /// Takes a consistent snapshot of index and bitmap state.
    ///
    /// # Errors
    ///
    /// Returns an error if any snapshot step fails; the snapshot is then
    /// not committed and the previous one stays authoritative.
    pub fn save_snapshot(&mut self) -> Result<()> {
        self.persistence.save_snapshot(&self.indexes, &self.bitmap)
    }

    /// Restores index and bitmap state from the latest snapshot without
    /// replaying the WAL suffix.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures or unparseable snapshot state.
    pub fn load_snapshot(&mut self) -> Result<()> {
        self.persistence
            .load_snapshot(&mut self.indexes, &mut self.bitmap)
    }
}
