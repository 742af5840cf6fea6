//! Storage layer for bkpfs.
//!
//! This crate provides the storage capability the versioning engine runs on:
//! a node-oriented backend abstraction with multiple implementations.
//! - Local directory storage (default)
//! - In-memory storage (for testing)
//!
//! Paths are always relative to the backend root; `""` names the root itself.

pub mod copy;
pub mod error;
pub mod local;
pub mod memory;

pub use copy::{copy_node, DEFAULT_CHUNK_SIZE};
pub use error::{StorageError, StorageResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::time::SystemTime;

/// Kind of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

/// Metadata for a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMeta {
    pub kind: NodeKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time, if the backend tracks one.
    pub modified: Option<SystemTime>,
    pub readonly: bool,
}

impl NodeMeta {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// A directory entry as returned by [`Backend::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: NodeKind,
}

/// Guard for a cross-process lock on a node. The lock is released on drop.
pub struct NodeLock {
    _held: Box<dyn Any + Send + Sync>,
}

impl NodeLock {
    pub fn new(held: impl Any + Send + Sync) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl fmt::Debug for NodeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeLock").finish_non_exhaustive()
    }
}

/// Abstract storage capability.
///
/// Everything the versioning engine does to persistent state goes through
/// this trait, so the engine can be exercised against [`MemoryBackend`] in
/// tests and run against [`LocalBackend`] for real trees.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Get metadata for a node.
    async fn stat(&self, path: &Path) -> StorageResult<NodeMeta>;

    /// Read up to `len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes (possibly none) when the range crosses end of file.
    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Write `data` at `offset`, extending the file as needed.
    ///
    /// Fails with [`StorageError::ReadOnly`] on a read-only node.
    async fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Set the file length, zero-filling on growth.
    async fn truncate(&self, path: &Path, len: u64) -> StorageResult<()>;

    /// Create an empty writable file if nothing exists at `path`.
    ///
    /// Returns `true` if a node was allocated, `false` if a file already
    /// existed (which is left untouched).
    async fn create_file(&self, path: &Path) -> StorageResult<bool>;

    /// Create a directory if nothing exists at `path`.
    ///
    /// Returns `true` if it was allocated, `false` if it already existed.
    async fn create_dir(&self, path: &Path) -> StorageResult<bool>;

    /// Mark a node read-only or writable.
    async fn set_readonly(&self, path: &Path, readonly: bool) -> StorageResult<()>;

    /// Set the modification time.
    async fn set_modified(&self, path: &Path, modified: SystemTime) -> StorageResult<()>;

    /// Remove a file or an empty directory.
    async fn remove(&self, path: &Path) -> StorageResult<()>;

    /// List the direct children of a directory, sorted by name.
    async fn list(&self, path: &Path) -> StorageResult<Vec<DirEntry>>;

    /// Read a named attribute of a node.
    async fn get_attr(&self, path: &Path, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replace a named attribute of a node in a single write.
    async fn set_attr(&self, path: &Path, name: &str, value: &[u8]) -> StorageResult<()>;

    /// Drop a named attribute. Absent attributes are not an error.
    async fn remove_attr(&self, path: &Path, name: &str) -> StorageResult<()>;

    /// Wait for an exclusive lock on `path` shared with other processes.
    ///
    /// Backends only reachable from one process return `None`.
    async fn lock_node(&self, _path: &Path) -> StorageResult<Option<NodeLock>> {
        Ok(None)
    }

    /// Check if a node exists.
    async fn exists(&self, path: &Path) -> bool {
        self.stat(path).await.is_ok()
    }
}
