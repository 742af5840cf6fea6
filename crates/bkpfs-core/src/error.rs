//! Error types for the core crate.

use bkpfs_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type BkpResult<T> = Result<T, BkpError>;

/// Errors surfaced by the versioning engine.
#[derive(Debug, Error)]
pub enum BkpError {
    /// Backup container, snapshot or tracked file is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested version lies outside the retained window.
    #[error("version {requested} is outside the retained window [{old}, {curr})")]
    OutOfRange {
        requested: String,
        old: u64,
        curr: u64,
    },

    /// Argument not acceptable for the operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Node allocation or copy failed.
    #[error("storage failure: {0}")]
    ResourceExhausted(#[source] StorageError),

    /// Attempt to modify a read-only node.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Operation was cancelled before it completed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Ledger record cannot be decoded or violates its invariant.
    #[error("corrupted version record: {0}")]
    Corrupted(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl BkpError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }
}

impl From<StorageError> for BkpError {
    fn from(err: StorageError) -> Self {
        match err {
            e if e.is_not_found() => Self::NotFound(e.to_string()),
            StorageError::ReadOnly(path) => Self::Permission(path),
            StorageError::Cancelled(path) => Self::Cancelled(path),
            StorageError::InvalidPath(path) => Self::InvalidArgument(format!("invalid path: {path}")),
            other => Self::ResourceExhausted(other),
        }
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON syntax or shape.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_not_found_maps_to_not_found() {
        let err: BkpError = StorageError::NotFound(".a.bkp/.a.3".into()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn storage_read_only_maps_to_permission() {
        let err: BkpError = StorageError::ReadOnly(".a.bkp/.a.0".into()).into();
        assert!(matches!(err, BkpError::Permission(_)));
    }

    #[test]
    fn storage_io_maps_to_resource_exhausted() {
        let err: BkpError = StorageError::Io(std::io::Error::other("disk full")).into();
        assert!(matches!(err, BkpError::ResourceExhausted(_)));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn out_of_range_displays_window() {
        let err = BkpError::OutOfRange {
            requested: "1".into(),
            old: 2,
            curr: 4,
        };
        assert_eq!(
            err.to_string(),
            "version 1 is outside the retained window [2, 4)"
        );
        assert!(err.is_out_of_range());
    }
}
