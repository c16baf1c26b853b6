//! Configuration loading and validation tests.

use super::config::{ConfigError, PerunConfig};

#[test]
fn defaults_are_valid() {
    let config = PerunConfig::default();
    config.validate().unwrap();
    assert_eq!(config.index.dim, 1);
    assert_eq!(config.index.num_data, 1000);
    assert_eq!(config.hnsw.m, 16);
    assert_eq!(config.wal.version, 1);
}

#[test]
fn toml_overrides_defaults() {
    let config = PerunConfig::from_toml(
        r#"
        [storage]
        data_dir = "/tmp/perun"

        [index]
        dim = 128
        num_data = 50000

        [hnsw]
        ef_search = 128
        "#,
    )
    .unwrap();

    assert_eq!(config.storage.data_dir, "/tmp/perun");
    assert_eq!(config.index.dim, 128);
    assert_eq!(config.index.num_data, 50000);
    assert_eq!(config.hnsw.ef_search, 128);
    // Untouched sections keep their defaults.
    assert_eq!(config.hnsw.m, 16);
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let err = PerunConfig::from_toml("[index\ndim = ").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn zero_dim_is_rejected() {
    let config = PerunConfig::from_toml("[index]\ndim = 0").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "index.dim"));
}

#[test]
fn out_of_range_hnsw_m_is_rejected() {
    let config = PerunConfig::from_toml("[hnsw]\nm = 2").unwrap();
    assert!(config.validate().is_err());

    let config = PerunConfig::from_toml("[hnsw]\nm = 129").unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn zero_wal_version_is_rejected() {
    let config = PerunConfig::from_toml("[wal]\nversion = 0").unwrap();
    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "wal.version"));
}

#[test]
fn load_from_missing_file_uses_defaults() {
    let config = PerunConfig::load_from_path("/definitely/not/here/perundb.toml").unwrap();
    assert_eq!(config.index.dim, 1);
}
