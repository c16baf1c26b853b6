//! Append-only binary write-ahead log.
//!
//! # Frame format
//!
//! All integers little-endian:
//!
//! ```text
//! +------------+--------+---------+------+-----------+-----------+
//! | total_size | log_id | version | op   | data_size | data      |
//! |  u64 (8B)  |  u64   |  u8     |  u8  |   u64     | data_size |
//! +------------+--------+---------+------+-----------+-----------+
//! ```
//!
//! `total_size` covers everything after itself. The redundant framing lets
//! a reader that hits a truncated tail stop at a frame boundary: a clean
//! EOF before a frame starts is the end of the log, anything else is
//! corruption.
//!
//! The reader and the appender hold separate file handles, so reaching the
//! end of the log never poisons subsequent appends.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// WAL file name inside the WAL directory.
const LOG_FILE: &str = "log.log";

/// Fixed frame bytes after `total_size`:
/// `log_id (8) + version (1) + op (1) + data_size (8)`.
const FRAME_FIXED_SIZE: u64 = 18;

/// Upper bound accepted for a single frame. A corrupt size prefix must not
/// drive a multi-gigabyte allocation before the frame is rejected.
const MAX_FRAME_SIZE: u64 = 256 * 1024 * 1024;

/// Operation tag of a WAL frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// A record upsert; the frame data is the bincode-encoded envelope.
    Upsert = 1,
}

impl TryFrom<u8> for WalOp {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Upsert),
            other => Err(Error::Corrupted(format!("unknown WAL op byte {other}"))),
        }
    }
}

/// One decoded WAL frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalFrame {
    /// Monotonically increasing id assigned at append time.
    pub log_id: u64,
    /// Format version byte the frame was written with.
    pub version: u8,
    /// Operation tag.
    pub op: WalOp,
    /// Operation payload.
    pub data: Vec<u8>,
}

/// The log itself: an appender, a replay cursor and the id counter.
pub struct Wal {
    writer: BufWriter<File>,
    reader: BufReader<File>,
    log_id: u64,
    version: u8,
}

impl Wal {
    /// Opens `dir/log.log` for append and replay, creating the directory
    /// and the file if missing. The replay cursor starts at position zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the file cannot be opened.
    pub fn open<P: AsRef<Path>>(dir: P, version: u8) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);

        let writer_file = OpenOptions::new().create(true).append(true).open(&path)?;
        let reader_file = File::open(&path)?;

        Ok(Self {
            writer: BufWriter::new(writer_file),
            reader: BufReader::new(reader_file),
            log_id: 1,
            version,
        })
    }

    /// The id the most recent frame was assigned (or the recovered floor).
    #[must_use]
    pub fn log_id(&self) -> u64 {
        self.log_id
    }

    /// Raises the id counter to at least `log_id`. Recovery feeds the
    /// snapshot floor through here; frame ids seen by [`Wal::read_next`]
    /// raise the counter on their own.
    pub fn observe(&mut self, log_id: u64) {
        self.log_id = self.log_id.max(log_id);
    }

    /// Appends one frame and flushes it to the OS. Returns the assigned
    /// `log_id` on success.
    ///
    /// # Errors
    ///
    /// Returns an error if any write or the flush fails.
    pub fn append(&mut self, op: WalOp, data: &[u8]) -> Result<u64> {
        self.log_id += 1;

        let total_size = FRAME_FIXED_SIZE + data.len() as u64;
        self.writer.write_all(&total_size.to_le_bytes())?;
        self.writer.write_all(&self.log_id.to_le_bytes())?;
        self.writer.write_all(&[self.version])?;
        self.writer.write_all(&[op as u8])?;
        self.writer.write_all(&(data.len() as u64).to_le_bytes())?;
        self.writer.write_all(data)?;
        self.writer.flush()?;

        debug!(
            log_id = self.log_id,
            version = self.version,
            op = op as u8,
            data_size = data.len(),
            "appended WAL frame"
        );
        Ok(self.log_id)
    }

    /// Reads the next frame from the replay cursor, raising the id counter
    /// to the highest frame id seen.
    ///
    /// Returns `Ok(None)` on a clean end of the log.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] on a short or inconsistent frame.
    pub fn read_next(&mut self) -> Result<Option<WalFrame>> {
        let Some(total_size) = self.read_total_size()? else {
            debug!("no more WAL frames to read");
            return Ok(None);
        };
        if !(FRAME_FIXED_SIZE..=MAX_FRAME_SIZE).contains(&total_size) {
            return Err(Error::Corrupted(format!(
                "WAL frame claims {total_size} bytes, outside the accepted range"
            )));
        }

        let mut buf = vec![0_u8; usize::try_from(total_size).map_err(|_| {
            Error::Corrupted(format!("WAL frame claims unrepresentable size {total_size}"))
        })?];
        self.reader.read_exact(&mut buf).map_err(|e| {
            warn!(error = %e, "WAL tail truncated mid-frame");
            Error::Corrupted(format!("WAL frame truncated after total_size: {e}"))
        })?;

        let log_id = u64::from_le_bytes(buf[0..8].try_into().expect("fixed slice"));
        self.log_id = self.log_id.max(log_id);
        let version = buf[8];
        let op = WalOp::try_from(buf[9])?;
        let data_size = u64::from_le_bytes(buf[10..18].try_into().expect("fixed slice"));
        if data_size != total_size - FRAME_FIXED_SIZE {
            return Err(Error::Corrupted(format!(
                "WAL frame data_size {data_size} disagrees with total_size {total_size}"
            )));
        }

        let data = buf.split_off(18);
        debug!(log_id, version, op = buf[9], data_size, "read WAL frame");
        Ok(Some(WalFrame {
            log_id,
            version,
            op,
            data,
        }))
    }

    /// Reads the 8-byte `total_size` prefix, distinguishing a clean EOF
    /// (nothing read) from a truncated prefix.
    fn read_total_size(&mut self) -> Result<Option<u64>> {
        let mut buf = [0_u8; 8];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::Corrupted(
                        "WAL tail truncated inside a frame size prefix".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(u64::from_le_bytes(buf)))
    }
}
