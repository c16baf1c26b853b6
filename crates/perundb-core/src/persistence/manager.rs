//! Composition of WAL, KV store and snapshot directory.
//!
//! # Directory layout
//!
//! ```text
//! <root>/wal/log.log           append-only WAL
//! <root>/kv_storage/...        embedded KV engine files
//! <root>/snapshot/<kind>.index one file per ANN index kind
//! ```
//!
//! # KV key namespaces
//!
//! - `external/data/<ascii-decimal-id>` — record envelopes
//! - `meta/snapshot/bitmap`             — serialized attribute bitmaps
//! - `meta/snapshot/last_snapshot_id`   — ASCII-decimal commit id

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::kv::KvStore;
use super::wal::{Wal, WalOp};
use crate::bitmap::FieldBitmap;
use crate::error::{Error, Result};
use crate::index::IndexSet;

const WAL_DIR: &str = "wal";
const KV_DIR: &str = "kv_storage";
const SNAPSHOT_DIR: &str = "snapshot";

const EXTERNAL_PREFIX: &str = "external/data/";
const BITMAP_KEY: &str = "meta/snapshot/bitmap";
const LAST_SNAPSHOT_ID_KEY: &str = "meta/snapshot/last_snapshot_id";

/// Owns the WAL, the KV store and the snapshot directory, and enforces the
/// protocol that keeps them consistent: every mutation reaches the WAL
/// before it is applied, and a snapshot is only trusted once its commit id
/// is in the KV store.
pub struct Persistence {
    wal: Wal,
    kv: KvStore,
    snapshot_dir: PathBuf,
    last_snapshot_id: u64,
}

impl Persistence {
    /// Opens the three stores under `root`, creating directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or a store cannot
    /// be opened.
    pub fn open<P: AsRef<Path>>(root: P, version: u8) -> Result<Self> {
        let root = root.as_ref();
        let snapshot_dir = root.join(SNAPSHOT_DIR);
        std::fs::create_dir_all(&snapshot_dir)?;

        let wal = Wal::open(root.join(WAL_DIR), version)?;
        let kv = KvStore::open(root.join(KV_DIR))?;

        info!(root = %root.display(), version, "opened persistence root");
        Ok(Self {
            wal,
            kv,
            snapshot_dir,
            last_snapshot_id: 0,
        })
    }

    /// The id assigned to the most recent WAL frame.
    #[must_use]
    pub fn log_id(&self) -> u64 {
        self.wal.log_id()
    }

    /// The highest `log_id` fully covered by the most recent snapshot.
    #[must_use]
    pub fn last_snapshot_id(&self) -> u64 {
        self.last_snapshot_id
    }

    /// Stores a record envelope under `external/data/<id>`.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn put_record(&self, id: i64, envelope: &[u8]) -> Result<()> {
        self.kv.put(record_key(id).as_bytes(), envelope)
    }

    /// Fetches the record envelope for `id`; absent is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage failure.
    pub fn get_record(&self, id: i64) -> Result<Option<Vec<u8>>> {
        self.kv.get(record_key(id).as_bytes())
    }

    /// Appends a frame to the WAL. Returns the assigned `log_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the append or its flush fails.
    pub fn write_wal(&mut self, op: WalOp, data: &[u8]) -> Result<u64> {
        self.wal.append(op, data)
    }

    /// Reads the next WAL entry that is not already covered by the loaded
    /// snapshot; entries with `log_id <= last_snapshot_id` are skipped
    /// transparently. Returns `Ok(None)` at the clean end of the log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] on a short or invalid frame.
    pub fn read_next_wal(&mut self) -> Result<Option<(WalOp, Vec<u8>)>> {
        while let Some(frame) = self.wal.read_next()? {
            if frame.log_id <= self.last_snapshot_id {
                debug!(
                    log_id = frame.log_id,
                    last_snapshot_id = self.last_snapshot_id,
                    "skipping WAL frame already covered by snapshot"
                );
                continue;
            }
            return Ok(Some((frame.op, frame.data)));
        }
        Ok(None)
    }

    /// Takes a snapshot of the given index set and bitmap state.
    ///
    /// Order matters: the recovery floor is fixed first, the bulky index
    /// files are written (each through a temp file and rename), then the
    /// bitmap blob, and finally the `last_snapshot_id` key — the commit
    /// point — followed by a KV flush. A crash before the commit leaves the
    /// previous snapshot authoritative and replay re-covers the suffix.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the snapshot is then not committed.
    pub fn save_snapshot(&mut self, indexes: &IndexSet, bitmap: &FieldBitmap) -> Result<()> {
        info!(log_id = self.wal.log_id(), "saving snapshot");
        self.last_snapshot_id = self.wal.log_id();

        indexes.save(&self.snapshot_dir)?;

        let blob = bitmap.serialize()?;
        self.kv.put(BITMAP_KEY.as_bytes(), &blob)?;

        self.kv.put(
            LAST_SNAPSHOT_ID_KEY.as_bytes(),
            self.last_snapshot_id.to_string().as_bytes(),
        )?;
        self.kv.flush()?;

        info!(
            last_snapshot_id = self.last_snapshot_id,
            "snapshot committed"
        );
        Ok(())
    }

    /// Restores index and bitmap state from the most recent snapshot.
    ///
    /// Absent artifacts mean an empty start: missing index files leave the
    /// indexes empty, a missing bitmap key leaves the bitmaps empty, and a
    /// missing commit key leaves `last_snapshot_id` at zero so the whole
    /// WAL replays.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failures or unparseable snapshot state.
    pub fn load_snapshot(&mut self, indexes: &mut IndexSet, bitmap: &mut FieldBitmap) -> Result<()> {
        info!("loading snapshot");
        indexes.load(&self.snapshot_dir)?;

        match self.kv.get(BITMAP_KEY.as_bytes())? {
            Some(blob) => bitmap.parse(&blob).inspect_err(|e| {
                warn!(error = %e, "failed to parse snapshot bitmap blob");
            })?,
            None => *bitmap = FieldBitmap::new(),
        }

        self.last_snapshot_id = match self.kv.get(LAST_SNAPSHOT_ID_KEY.as_bytes())? {
            Some(bytes) => parse_snapshot_id(&bytes)?,
            None => 0,
        };
        self.wal.observe(self.last_snapshot_id);

        info!(
            last_snapshot_id = self.last_snapshot_id,
            "snapshot loaded"
        );
        Ok(())
    }
}

fn record_key(id: i64) -> String {
    format!("{EXTERNAL_PREFIX}{id}")
}

fn parse_snapshot_id(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| Error::Corrupted("last_snapshot_id key is not a decimal u64".to_string()))
}
