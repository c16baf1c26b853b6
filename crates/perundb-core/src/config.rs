//! `PerunDB` configuration.
//!
//! Supports a `perundb.toml` configuration file, `PERUNDB_*` environment
//! variables and programmatic overrides.
//!
//! # Priority (highest to lowest)
//!
//! 1. Environment variables (`PERUNDB_*`, sections separated by `__`,
//!    e.g. `PERUNDB_HNSW__EF_SEARCH=128`)
//! 2. Configuration file (`perundb.toml`)
//! 3. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration sources.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key that failed validation.
        key: String,
        /// Validation error message.
        message: String,
    },
}

/// Storage configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the WAL, the KV store and snapshots.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./perundb_data".to_string(),
        }
    }
}

/// Index configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Vector dimension every record must match.
    pub dim: usize,
    /// Expected number of vectors; pre-sizes the HNSW arena.
    pub num_data: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: 1,
            num_data: 1000,
        }
    }
}

/// HNSW tuning section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Number of bi-directional links per node (M parameter).
    pub m: usize,
    /// Size of the candidate pool during construction.
    pub ef_construction: usize,
    /// Size of the candidate pool during search.
    pub ef_search: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// WAL configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Format version byte written into every WAL frame.
    pub version: u8,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self { version: 1 }
    }
}

/// Main `PerunDB` configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerunConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Index configuration.
    pub index: IndexConfig,
    /// HNSW tuning.
    pub hnsw: HnswConfig,
    /// WAL configuration.
    pub wal: WalConfig,
}

impl PerunConfig {
    /// Loads configuration from the default sources (`perundb.toml` plus
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("perundb.toml")
    }

    /// Loads configuration merging defaults, the given file and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PERUNDB_").split("__").lowercase(false));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Creates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(toml_str));

        figment
            .extract()
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=65536).contains(&self.index.dim) {
            return Err(ConfigError::InvalidValue {
                key: "index.dim".to_string(),
                message: format!("value {} is out of range [1, 65536]", self.index.dim),
            });
        }

        if self.index.num_data == 0 {
            return Err(ConfigError::InvalidValue {
                key: "index.num_data".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }

        if !(4..=128).contains(&self.hnsw.m) {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.m".to_string(),
                message: format!("value {} is out of range [4, 128]", self.hnsw.m),
            });
        }

        if !(8..=4096).contains(&self.hnsw.ef_construction) {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_construction".to_string(),
                message: format!(
                    "value {} is out of range [8, 4096]",
                    self.hnsw.ef_construction
                ),
            });
        }

        if !(1..=4096).contains(&self.hnsw.ef_search) {
            return Err(ConfigError::InvalidValue {
                key: "hnsw.ef_search".to_string(),
                message: format!("value {} is out of range [1, 4096]", self.hnsw.ef_search),
            });
        }

        if self.wal.version == 0 {
            return Err(ConfigError::InvalidValue {
                key: "wal.version".to_string(),
                message: "value must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}
