//! Error types for `PerunDB`.
//!
//! This module provides a unified error type for all `PerunDB` operations.
//! Error codes follow the pattern `PERUN-XXX` for easy debugging.

use thiserror::Error;

/// Result type alias for `PerunDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `PerunDB` operations.
///
/// Absent keys are not errors: lookups of non-existent records return
/// `Ok(None)` instead of a variant of this enum.
#[derive(Error, Debug)]
pub enum Error {
    /// No index registered for the requested kind (PERUN-001).
    #[error("[PERUN-001] No index registered for kind '{0}'")]
    UnknownIndex(String),

    /// Vector dimension mismatch (PERUN-002).
    #[error("[PERUN-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Invalid argument (PERUN-003).
    ///
    /// Rejected before any side effect: zero `k`, empty query buffers,
    /// malformed filter operators and the like.
    #[error("[PERUN-003] Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage engine error (PERUN-004).
    #[error("[PERUN-004] Storage error: {0}")]
    Storage(String),

    /// IO error (PERUN-005).
    #[error("[PERUN-005] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupted on-disk state (PERUN-006).
    ///
    /// A short or inconsistent WAL frame, an unreadable bitmap blob or an
    /// unparseable index snapshot. Fatal to reload and snapshot loading.
    #[error("[PERUN-006] Corrupted data: {0}")]
    Corrupted(String),

    /// Serialization error (PERUN-007).
    #[error("[PERUN-007] Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (PERUN-008).
    #[error("[PERUN-008] Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the error code (e.g., "PERUN-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownIndex(_) => "PERUN-001",
            Self::DimensionMismatch { .. } => "PERUN-002",
            Self::InvalidArgument(_) => "PERUN-003",
            Self::Storage(_) => "PERUN-004",
            Self::Io(_) => "PERUN-005",
            Self::Corrupted(_) => "PERUN-006",
            Self::Serialization(_) => "PERUN-007",
            Self::Config(_) => "PERUN-008",
        }
    }

    /// Returns true if this error is recoverable.
    ///
    /// Corruption is not: the affected store must be rebuilt or restored
    /// from a snapshot.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Corrupted(_))
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::UnknownIndex("ivf".into()).code(), "PERUN-001");
        assert_eq!(
            Error::DimensionMismatch {
                expected: 4,
                actual: 3
            }
            .code(),
            "PERUN-002"
        );
        assert_eq!(Error::Corrupted("bad frame".into()).code(), "PERUN-006");
    }

    #[test]
    fn corruption_is_not_recoverable() {
        assert!(!Error::Corrupted("truncated WAL".into()).is_recoverable());
        assert!(Error::InvalidArgument("k must be >= 1".into()).is_recoverable());
    }

    #[test]
    fn display_includes_code_and_detail() {
        let err = Error::DimensionMismatch {
            expected: 128,
            actual: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("PERUN-002"));
        assert!(msg.contains("128"));
        assert!(msg.contains("64"));
    }
}
