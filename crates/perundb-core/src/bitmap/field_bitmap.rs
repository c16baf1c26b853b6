//! Per-(field, value) roaring bitmaps with a normative wire format.
//!
//! # Serialization format
//!
//! The serialized form is a plain concatenation of per-cell frames with no
//! outer envelope; empty cells are omitted. All integers little-endian:
//!
//! ```text
//! +------------+-----------------+------------+--------+-----------+--------+
//! | total_size | field_name_size | field_name | value  | data_size | bitmap |
//! |  u64 (8B)  |  u64            |  bytes     |  i64   |  u64      |  bytes |
//! +------------+-----------------+------------+--------+-----------+--------+
//! ```
//!
//! `total_size` covers everything after itself. The bitmap bytes use the
//! roaring portable format.

use std::str::FromStr;

use roaring::RoaringTreemap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed part of a cell frame after `total_size`:
/// `field_name_size (8) + value (8) + data_size (8)`.
const CELL_FIXED_SIZE: u64 = 24;

/// Comparison operator for attribute filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Records whose field equals the value.
    Equal,
    /// Records whose field is set to any other value.
    NotEqual,
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            other => Err(Error::InvalidArgument(format!(
                "unknown filter operator '{other}', expected '=' or '!='"
            ))),
        }
    }
}

/// Inverted bitmap index: `field -> value -> bitmap of ids`.
///
/// Ids are `i64` and are stored through their two's-complement `u64` image,
/// so the full id space round-trips. Within one field the value bitmaps are
/// kept mutually disjoint: an update always clears the id from its previous
/// value's cell.
#[derive(Debug, Default, PartialEq)]
pub struct FieldBitmap {
    cells: FxHashMap<String, FxHashMap<i64, RoaringTreemap>>,
}

impl FieldBitmap {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `id` to the cell for `(field, new_value)`.
    ///
    /// When `old_value` is given and a cell for it exists, the id is removed
    /// from that cell first; cells emptied this way are dropped. When
    /// `old_value` is `None` the field is new for this id and the id is only
    /// added.
    pub fn update(&mut self, id: i64, field: &str, new_value: i64, old_value: Option<i64>) {
        let bit = id as u64;

        if let Some(value_map) = self.cells.get_mut(field) {
            if let Some(old) = old_value {
                if let Some(old_bitmap) = value_map.get_mut(&old) {
                    old_bitmap.remove(bit);
                    if old_bitmap.is_empty() {
                        value_map.remove(&old);
                    }
                }
            }
        }

        self.cells
            .entry(field.to_string())
            .or_default()
            .entry(new_value)
            .or_default()
            .insert(bit);
        debug!(id, field, new_value, old_value, "updated field bitmap");
    }

    /// Builds the allow-list for a filter.
    ///
    /// `Equal` returns a copy of the cell for `(field, value)`, or an empty
    /// bitmap if the cell is absent. `NotEqual` returns the union of all
    /// other cells under `field`.
    #[must_use]
    pub fn query(&self, field: &str, value: i64, op: FilterOp) -> RoaringTreemap {
        let mut out = RoaringTreemap::new();
        let Some(value_map) = self.cells.get(field) else {
            return out;
        };

        match op {
            FilterOp::Equal => {
                if let Some(bitmap) = value_map.get(&value) {
                    out |= bitmap;
                }
            }
            FilterOp::NotEqual => {
                for (cell_value, bitmap) in value_map {
                    if *cell_value != value {
                        out |= bitmap;
                    }
                }
            }
        }
        out
    }

    /// Returns true if `id` is in the cell for `(field, value)`.
    #[must_use]
    pub fn contains(&self, id: i64, field: &str, value: i64) -> bool {
        self.cells
            .get(field)
            .and_then(|value_map| value_map.get(&value))
            .is_some_and(|bitmap| bitmap.contains(id as u64))
    }

    /// Returns true if no cell holds any id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells
            .values()
            .all(|value_map| value_map.values().all(RoaringTreemap::is_empty))
    }

    /// Serializes every non-empty cell into the concatenated frame format.
    ///
    /// # Errors
    ///
    /// Returns an error if bitmap encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for (field, value_map) in &self.cells {
            for (value, bitmap) in value_map {
                if bitmap.is_empty() {
                    continue;
                }

                let data_size = bitmap.serialized_size() as u64;
                let total_size = CELL_FIXED_SIZE + field.len() as u64 + data_size;

                buf.extend_from_slice(&total_size.to_le_bytes());
                buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
                buf.extend_from_slice(field.as_bytes());
                buf.extend_from_slice(&value.to_le_bytes());
                buf.extend_from_slice(&data_size.to_le_bytes());
                bitmap.serialize_into(&mut buf)?;
            }
        }
        Ok(buf)
    }

    /// Replaces the current state from a serialized blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`] if a frame is short or inconsistent.
    pub fn parse(&mut self, data: &[u8]) -> Result<()> {
        let mut cells: FxHashMap<String, FxHashMap<i64, RoaringTreemap>> = FxHashMap::default();
        let mut offset = 0_usize;

        while offset < data.len() {
            let total_size = read_u64(data, &mut offset)?;
            let frame_end = offset
                .checked_add(usize::try_from(total_size).map_err(|_| frame_error(offset))?)
                .ok_or_else(|| frame_error(offset))?;
            if total_size < CELL_FIXED_SIZE || frame_end > data.len() {
                return Err(frame_error(offset));
            }

            let name_size =
                usize::try_from(read_u64(data, &mut offset)?).map_err(|_| frame_error(offset))?;
            if CELL_FIXED_SIZE + name_size as u64 > total_size {
                return Err(frame_error(offset));
            }
            let field = std::str::from_utf8(&data[offset..offset + name_size])
                .map_err(|_| frame_error(offset))?
                .to_string();
            offset += name_size;

            let value = i64::from_le_bytes(
                data[offset..offset + 8]
                    .try_into()
                    .map_err(|_| frame_error(offset))?,
            );
            offset += 8;

            let data_size = read_u64(data, &mut offset)?;
            if CELL_FIXED_SIZE + name_size as u64 + data_size != total_size {
                return Err(frame_error(offset));
            }

            let bitmap_end = offset + usize::try_from(data_size).map_err(|_| frame_error(offset))?;
            let bitmap = RoaringTreemap::deserialize_from(&data[offset..bitmap_end])
                .map_err(|e| Error::Corrupted(format!("bitmap cell at byte {offset}: {e}")))?;
            offset = bitmap_end;

            cells.entry(field).or_default().insert(value, bitmap);
        }

        self.cells = cells;
        Ok(())
    }
}

fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    let end = offset
        .checked_add(8)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| frame_error(*offset))?;
    let value = u64::from_le_bytes(
        data[*offset..end]
            .try_into()
            .map_err(|_| frame_error(*offset))?,
    );
    *offset = end;
    Ok(value)
}

fn frame_error(offset: usize) -> Error {
    Error::Corrupted(format!("short or inconsistent bitmap frame at byte {offset}"))
}
