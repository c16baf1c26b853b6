//! Durability: write-ahead log, embedded KV store, snapshots.
//!
//! The [`Persistence`] manager composes the three stores under one root
//! directory and enforces the snapshot/replay protocol that keeps them
//! mutually consistent across crashes.
//!
//! # Module Structure
//!
//! - [`kv`]: adapter over the embedded ordered key/value engine
//! - [`wal`]: append-only binary log with frame-level corruption detection
//! - [`manager`]: the composition and the snapshot protocol

mod kv;
mod manager;
mod wal;


pub use kv::KvStore;
pub use manager::Persistence;
pub use wal::{Wal, WalFrame, WalOp};
