//! Storage error types.

use std::path::Path;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error not covered by a more specific variant.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Attribute record (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Node does not exist.
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Node exists with a conflicting kind.
    #[error("Node already exists: {0}")]
    AlreadyExists(String),

    /// Attempt to modify a read-only node.
    #[error("Node is read-only: {0}")]
    ReadOnly(String),

    /// A directory operation targeted a file.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file operation targeted a directory.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Removal of a directory that still has entries.
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path is empty or escapes the backend root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Copy was cancelled between chunks.
    #[error("Copy cancelled: {0}")]
    Cancelled(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    /// Create a not found error for a path.
    pub fn not_found(path: &Path) -> Self {
        Self::NotFound(path.display().to_string())
    }

    /// Create a read-only error for a path.
    pub fn read_only(path: &Path) -> Self {
        Self::ReadOnly(path.display().to_string())
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: &Path) -> Self {
        Self::InvalidPath(path.display().to_string())
    }

    /// Whether this error means the node is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Map an IO error on `path` to the most specific variant.
    pub fn from_io(err: std::io::Error, path: &Path) -> Self {
        use std::io::ErrorKind;
        let shown = path.display().to_string();
        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(shown),
            ErrorKind::PermissionDenied => Self::ReadOnly(shown),
            ErrorKind::AlreadyExists => Self::AlreadyExists(shown),
            ErrorKind::NotADirectory => Self::NotADirectory(shown),
            ErrorKind::IsADirectory => Self::IsADirectory(shown),
            ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(shown),
            _ => Self::Io(err),
        }
    }
}
