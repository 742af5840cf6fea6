//! Per-file mutual exclusion.
//!
//! Tasks in one process queue on an async mutex per tracked file. When the
//! table is bound to a backend, the holder then also takes the backend's
//! node lock, which excludes other processes working on the same tree.

use crate::error::BkpResult;
use bkpfs_storage::{Backend, NodeLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive access to one tracked file, released on drop.
#[derive(Debug)]
pub struct FileGuard {
    _node: Option<NodeLock>,
    _local: OwnedMutexGuard<()>,
}

/// Lock table keyed by tracked file path.
///
/// Operations on different files never contend. Entries are dropped once no
/// guard or waiter references them.
#[derive(Clone, Default)]
pub struct FileLocks {
    table: Arc<Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>>,
    backend: Option<Arc<dyn Backend>>,
}

impl FileLocks {
    /// A table that only excludes tasks in this process.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table whose guards also hold `backend`'s node lock.
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::default()
        }
    }

    /// Wait for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> BkpResult<FileGuard> {
        let local = self.entry(path).lock_owned().await;
        let node = match &self.backend {
            Some(backend) => backend.lock_node(path).await?,
            None => None,
        };
        Ok(FileGuard {
            _node: node,
            _local: local,
        })
    }

    fn entry(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = table.get(path).and_then(Weak::upgrade) {
            return existing;
        }
        table.retain(|_, weak| weak.strong_count() > 0);
        let fresh = Arc::new(AsyncMutex::new(()));
        table.insert(path.to_path_buf(), Arc::downgrade(&fresh));
        fresh
    }

    /// Number of files with a live lock entry.
    pub fn len(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
