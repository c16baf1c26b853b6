//! Adapter over the embedded ordered key/value engine.
//!
//! Keys and values are arbitrary byte strings; iteration order is
//! lexicographic, which is what makes prefix namespacing workable. An
//! individual `put` is not assumed durable; the persistence manager calls
//! [`KvStore::flush`] at snapshot boundaries.

use std::path::Path;

use tracing::warn;

use crate::error::Result;

/// Thin wrapper around the embedded store.
pub struct KvStore {
    db: sled::Db,
}

impl KvStore {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying engine cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref()).inspect_err(|e| {
            warn!(path = %path.as_ref().display(), error = %e, "failed to open kv store");
        })?;
        Ok(Self { db })
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error on an engine failure.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Looks up `key`; an absent key is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error on an engine failure.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|value| value.to_vec()))
    }

    /// Forces all previous puts to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error on an engine failure.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
