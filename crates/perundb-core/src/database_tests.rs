//! Engine-level tests: upsert/search/query contracts and replace
//! semantics. Restart and recovery scenarios live in `tests/`.

use std::collections::HashMap;

use tempfile::TempDir;

use super::bitmap::FilterOp;
use super::database::{Database, FieldFilter, SearchRequest};
use super::error::Error;
use super::index::{IndexKind, SENTINEL_ID};
use super::record::{Record, UpsertRequest};
use super::PerunConfig;

fn open_db(dir: &TempDir, dim: usize) -> Database {
    let mut config = PerunConfig::default();
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();
    config.index.dim = dim;
    Database::open(&config).unwrap()
}

fn upsert(db: &mut Database, kind: IndexKind, id: i64, vector: Vec<f32>, fields: &[(&str, i64)]) {
    let fields: HashMap<String, i64> = fields
        .iter()
        .map(|(name, value)| ((*name).to_string(), *value))
        .collect();
    db.upsert(UpsertRequest::new(
        kind,
        Record::with_fields(id, vector, format!("payload-{id}").into_bytes(), fields),
    ))
    .unwrap();
}

fn search_ids(db: &Database, request: &SearchRequest) -> Vec<i64> {
    db.search(request)
        .unwrap()
        .indices
        .into_iter()
        .filter(|id| *id != SENTINEL_ID)
        .collect()
}

fn eq_filter(field: &str, value: i64) -> Option<FieldFilter> {
    Some(FieldFilter {
        field: field.to_string(),
        op: FilterOp::Equal,
        value,
    })
}

#[test]
fn upsert_then_query_returns_exact_payload() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);

    db.upsert(UpsertRequest::new(
        IndexKind::Flat,
        Record::new(7, vec![1.0, 2.0], b"X".to_vec()),
    ))
    .unwrap();

    assert_eq!(db.query(7).unwrap().as_deref(), Some(b"X".as_ref()));
    assert!(db.query(8).unwrap().is_none());
}

#[test]
fn filtered_search_honors_equality_and_inequality() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Flat, 1, vec![0.0, 0.0], &[("color", 1)]);
    upsert(&mut db, IndexKind::Flat, 2, vec![0.0, 1.0], &[("color", 2)]);
    upsert(&mut db, IndexKind::Flat, 3, vec![0.0, 2.0], &[("color", 1)]);

    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 3,
            filter: eq_filter("color", 1),
        },
    );
    assert_eq!(ids, vec![1, 3]);

    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 3,
            filter: Some(FieldFilter {
                field: "color".to_string(),
                op: FilterOp::NotEqual,
                value: 1,
            }),
        },
    );
    assert_eq!(ids, vec![2]);
}

#[test]
fn replace_moves_bitmap_membership_and_vector() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Flat, 5, vec![1.0, 0.0], &[("color", 1)]);
    upsert(&mut db, IndexKind::Flat, 5, vec![0.0, 1.0], &[("color", 2)]);

    // Old attribute cell no longer yields the record.
    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 1.0],
            k: 3,
            filter: eq_filter("color", 1),
        },
    );
    assert!(ids.is_empty());

    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 1.0],
            k: 3,
            filter: eq_filter("color", 2),
        },
    );
    assert_eq!(ids, vec![5]);

    // The vector was replaced too: the record is the top hit near [0, 1].
    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 1.0],
            k: 1,
            filter: None,
        },
    );
    assert_eq!(ids, vec![5]);
}

#[test]
fn replace_derives_old_values_the_caller_never_supplied() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Flat, 9, vec![0.0, 0.0], &[("color", 1)]);
    // The replacing request only states the new value; the engine digs the
    // old one out of the prior envelope.
    upsert(&mut db, IndexKind::Flat, 9, vec![0.0, 0.0], &[("color", 3)]);

    let eq_one = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 3,
            filter: eq_filter("color", 1),
        },
    );
    assert!(eq_one.is_empty());
}

#[test]
fn hnsw_kind_supports_the_same_flow() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Hnsw, 1, vec![0.0, 0.0], &[("color", 1)]);
    upsert(&mut db, IndexKind::Hnsw, 2, vec![0.0, 1.0], &[("color", 2)]);
    upsert(&mut db, IndexKind::Hnsw, 3, vec![0.0, 2.0], &[("color", 1)]);

    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Hnsw,
            query: vec![0.0, 0.0],
            k: 3,
            filter: eq_filter("color", 1),
        },
    );
    assert_eq!(ids, vec![1, 3]);

    // Replace under HNSW tombstones the old vector.
    upsert(&mut db, IndexKind::Hnsw, 3, vec![9.0, 9.0], &[("color", 1)]);
    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Hnsw,
            query: vec![9.0, 9.0],
            k: 1,
            filter: None,
        },
    );
    assert_eq!(ids, vec![3]);
}

#[test]
fn invalid_arguments_have_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);

    let err = db
        .upsert(UpsertRequest::new(
            IndexKind::Flat,
            Record::new(1, vec![1.0, 2.0, 3.0], Vec::new()),
        ))
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));

    // The rejected record never reached any store.
    assert!(db.query(1).unwrap().is_none());

    assert!(matches!(
        db.search(&SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 0,
            filter: None,
        }),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        db.search(&SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0],
            k: 1,
            filter: None,
        }),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn filter_on_unknown_field_yields_no_hits() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Flat, 1, vec![0.0, 0.0], &[("color", 1)]);

    let ids = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 3,
            filter: eq_filter("shape", 1),
        },
    );
    assert!(ids.is_empty());
}

#[test]
fn same_id_can_live_in_both_kinds() {
    let dir = TempDir::new().unwrap();
    let mut db = open_db(&dir, 2);
    upsert(&mut db, IndexKind::Flat, 1, vec![0.0, 0.0], &[]);
    upsert(&mut db, IndexKind::Hnsw, 1, vec![5.0, 5.0], &[]);

    let flat = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Flat,
            query: vec![0.0, 0.0],
            k: 1,
            filter: None,
        },
    );
    let hnsw = search_ids(
        &db,
        &SearchRequest {
            kind: IndexKind::Hnsw,
            query: vec![5.0, 5.0],
            k: 1,
            filter: None,
        },
    );
    assert_eq!(flat, vec![1]);
    assert_eq!(hnsw, vec![1]);
}

#[test]
fn rejects_invalid_configuration() {
    let dir = TempDir::new().unwrap();
    let mut config = PerunConfig::default();
    config.storage.data_dir = dir.path().to_string_lossy().into_owned();
    config.index.dim = 0;
    assert!(matches!(Database::open(&config), Err(Error::Config(_))));
}
