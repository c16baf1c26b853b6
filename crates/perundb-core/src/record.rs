//! Record data model and the upsert envelope.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::IndexKind;

/// A record in the database.
///
/// A record consists of:
/// - A unique `i64` identifier
/// - A vector (embedding) of the configured dimension
/// - An opaque scalar payload, returned verbatim by lookups
/// - Named integer attributes usable as search filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier for the record.
    pub id: i64,

    /// The vector embedding.
    pub vector: Vec<f32>,

    /// Opaque payload bytes supplied by the caller.
    #[serde(default)]
    pub payload: Vec<u8>,

    /// Integer attributes, keyed by field name.
    #[serde(default)]
    pub fields: HashMap<String, i64>,
}

impl Record {
    /// Creates a new record without attributes.
    #[must_use]
    pub fn new(id: i64, vector: Vec<f32>, payload: Vec<u8>) -> Self {
        Self {
            id,
            vector,
            payload,
            fields: HashMap::new(),
        }
    }

    /// Creates a new record with attributes.
    #[must_use]
    pub fn with_fields(
        id: i64,
        vector: Vec<f32>,
        payload: Vec<u8>,
        fields: HashMap<String, i64>,
    ) -> Self {
        Self {
            id,
            vector,
            payload,
            fields,
        }
    }

    /// Returns the dimension of the vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// The envelope written into `Upsert` WAL frames and stored in the KV store.
///
/// Storing the full structured envelope (rather than the raw payload alone)
/// lets a replace derive each field's prior value from the previous
/// envelope, which is what keeps the attribute bitmaps disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// The ANN index kind this record is inserted into.
    pub kind: IndexKind,

    /// The record itself.
    pub record: Record,
}

impl UpsertRequest {
    /// Creates a new upsert envelope.
    #[must_use]
    pub const fn new(kind: IndexKind, record: Record) -> Self {
        Self { kind, record }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_bincode() {
        let record = Record::with_fields(
            7,
            vec![1.0, 2.0],
            b"X".to_vec(),
            HashMap::from([("color".to_string(), 3_i64)]),
        );
        let req = UpsertRequest::new(IndexKind::Flat, record.clone());

        let bytes = bincode::serialize(&req).unwrap();
        let decoded: UpsertRequest = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.kind, IndexKind::Flat);
        assert_eq!(decoded.record, record);
    }

    #[test]
    fn payload_defaults_to_empty() {
        let record = Record::new(1, vec![0.0], Vec::new());
        assert!(record.payload.is_empty());
        assert!(record.fields.is_empty());
        assert_eq!(record.dimension(), 1);
    }
}
