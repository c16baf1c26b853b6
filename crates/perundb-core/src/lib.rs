//! # `PerunDB` Core
//!
//! Storage and recovery engine of `PerunDB`, an embedded vector database.
//!
//! Records keyed by `i64` carry a fixed-dimensional `f32` vector indexed
//! for approximate nearest-neighbor search, an opaque payload returned
//! verbatim, and named integer attributes filterable during search.
//! Durability comes from a binary write-ahead log plus periodic snapshots
//! of index and bitmap state, with the snapshot commit id stored in an
//! embedded key/value store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use perundb_core::{Database, IndexKind, PerunConfig, Record, SearchRequest, UpsertRequest};
//!
//! # fn main() -> perundb_core::Result<()> {
//! let mut config = PerunConfig::default();
//! config.index.dim = 2;
//!
//! let mut db = Database::open(&config)?;
//! db.reload()?;
//!
//! db.upsert(UpsertRequest::new(
//!     IndexKind::Flat,
//!     Record::new(7, vec![1.0, 2.0], b"payload".to_vec()),
//! ))?;
//!
//! let results = db.search(&SearchRequest {
//!     kind: IndexKind::Flat,
//!     query: vec![1.0, 2.0],
//!     k: 3,
//!     filter: None,
//! })?;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! The engine is single-writer: mutating operations take `&mut self`.
//! Read-only `search` and `query` take `&self` and may run concurrently
//! with each other. Hosts that want concurrent reads with writes wrap the
//! engine in a reader-writer lock.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Ids are stored in bitmaps through their two's-complement u64 image.
#![allow(clippy::cast_sign_loss)]

pub mod bitmap;
pub mod config;
pub mod database;
pub mod distance;
pub mod error;
pub mod index;
pub mod persistence;
pub mod record;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod database_tests;

pub use bitmap::{FieldBitmap, FilterOp};
pub use config::{ConfigError, PerunConfig};
pub use database::{Database, FieldFilter, SearchRequest};
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::{
    FlatIndex, HnswIndex, HnswParams, IndexKind, IndexSet, SearchOutput, VectorIndex, SENTINEL_ID,
};
pub use persistence::Persistence;
pub use record::{Record, UpsertRequest};
