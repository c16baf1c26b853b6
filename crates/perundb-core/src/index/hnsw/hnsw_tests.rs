//! Tests for the HNSW index wrapper: mappings, tombstones, persistence.

use roaring::RoaringTreemap;
use tempfile::tempdir;

use super::{HnswIndex, HnswParams};
use crate::distance::DistanceMetric;
use crate::error::Error;
use crate::index::{VectorIndex, SENTINEL_ID};

fn index() -> HnswIndex {
    HnswIndex::new(2, DistanceMetric::L2, HnswParams::default()).unwrap()
}

#[test]
fn rejects_undersized_m() {
    let params = HnswParams {
        m: 1,
        ..HnswParams::default()
    };
    let err = HnswIndex::new(2, DistanceMetric::L2, params).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn insert_and_search_roundtrip() {
    let mut idx = index();
    idx.insert(10, &[0.0, 0.0]).unwrap();
    idx.insert(20, &[0.0, 1.0]).unwrap();
    idx.insert(30, &[0.0, 2.0]).unwrap();

    let out = idx.search(&[0.0, 0.1], 2, None).unwrap();
    assert_eq!(out.indices, vec![10, 20]);
    assert!(out.distances[0] <= out.distances[1]);
}

#[test]
fn dimension_mismatch_is_rejected() {
    let mut idx = index();
    assert!(matches!(
        idx.insert(1, &[1.0]),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn removed_ids_stop_surfacing() {
    let mut idx = index();
    idx.insert(1, &[0.0, 0.0]).unwrap();
    idx.insert(2, &[0.0, 1.0]).unwrap();
    idx.remove(&[1]);

    let out = idx.search(&[0.0, 0.0], 2, None).unwrap();
    let hits: Vec<i64> = out
        .indices
        .into_iter()
        .filter(|id| *id != SENTINEL_ID)
        .collect();
    assert_eq!(hits, vec![2]);
    assert_eq!(idx.len(), 1);
}

#[test]
fn remove_of_unknown_id_is_a_noop() {
    let mut idx = index();
    idx.insert(1, &[0.0, 0.0]).unwrap();
    idx.remove(&[99]);
    assert_eq!(idx.len(), 1);
}

#[test]
fn reinsert_remaps_and_clears_tombstone() {
    let mut idx = index();
    idx.insert(5, &[1.0, 0.0]).unwrap();
    idx.remove(&[5]);
    idx.insert(5, &[0.0, 1.0]).unwrap();

    // The id is visible again, at its new position only.
    let out = idx.search(&[0.0, 1.0], 1, None).unwrap();
    assert_eq!(out.indices, vec![5]);
    assert!(out.distances[0] < 1e-6);

    let out = idx.search(&[1.0, 0.0], 1, None).unwrap();
    assert_eq!(out.indices, vec![5]);
    assert!(out.distances[0] > 1.0); // stale node does not answer
}

#[test]
fn allow_list_composes_with_tombstones() {
    let mut idx = index();
    idx.insert(1, &[0.0, 0.0]).unwrap();
    idx.insert(2, &[0.0, 1.0]).unwrap();
    idx.insert(3, &[0.0, 2.0]).unwrap();
    idx.remove(&[2]);

    let mut allow = RoaringTreemap::new();
    allow.insert(2);
    allow.insert(3);

    let out = idx.search(&[0.0, 0.0], 3, Some(&allow)).unwrap();
    let hits: Vec<i64> = out
        .indices
        .into_iter()
        .filter(|id| *id != SENTINEL_ID)
        .collect();
    assert_eq!(hits, vec![3]);
}

#[test]
fn save_load_roundtrip_preserves_tombstones() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hnsw.index");

    let mut idx = index();
    idx.insert(1, &[0.0, 0.0]).unwrap();
    idx.insert(2, &[3.0, 3.0]).unwrap();
    idx.remove(&[2]);
    idx.save(&path).unwrap();

    let mut loaded = index();
    loaded.load(&path).unwrap();
    let out = loaded.search(&[3.0, 3.0], 2, None).unwrap();
    let hits: Vec<i64> = out
        .indices
        .into_iter()
        .filter(|id| *id != SENTINEL_ID)
        .collect();
    assert_eq!(hits, vec![1]);
}

#[test]
fn load_of_absent_file_starts_empty() {
    let dir = tempdir().unwrap();
    let mut idx = index();
    idx.load(&dir.path().join("hnsw.index")).unwrap();
    assert!(idx.is_empty());
}

#[test]
fn load_rejects_garbage() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hnsw.index");
    std::fs::write(&path, b"not an index").unwrap();

    let mut idx = index();
    assert!(matches!(idx.load(&path), Err(Error::Corrupted(_))));
}
