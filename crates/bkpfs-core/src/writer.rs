//! Snapshot writer.
//!
//! Runs once when a write session that actually wrote is closed: copies the
//! tracked file into the next ordinal, evicts the oldest snapshot when the
//! window is full and advances the ledger.

use crate::error::BkpResult;
use crate::ledger::{Ledger, VersionRange};
use crate::lock::FileLocks;
use crate::naming::TrackedFile;
use crate::store::{BackupStore, SnapshotNode};
use bkpfs_storage::{copy_node, Backend};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Creates snapshots and enforces the retention bound.
#[derive(Clone)]
pub struct SnapshotWriter {
    backend: Arc<dyn Backend>,
    ledger: Ledger,
    store: BackupStore,
    locks: FileLocks,
    maxver: u32,
    chunk_size: usize,
}

impl SnapshotWriter {
    pub fn new(
        backend: Arc<dyn Backend>,
        locks: FileLocks,
        maxver: u32,
        chunk_size: usize,
    ) -> Self {
        Self {
            ledger: Ledger::new(backend.clone()),
            store: BackupStore::new(backend.clone()),
            backend,
            locks,
            maxver,
            chunk_size,
        }
    }

    pub fn maxver(&self) -> u32 {
        self.maxver
    }

    /// Snapshot the current content of `file`.
    ///
    /// Returns the new window, or `None` when snapshots are disabled.
    pub async fn snapshot(
        &self,
        file: &TrackedFile,
        cancel: &CancellationToken,
    ) -> BkpResult<Option<VersionRange>> {
        if self.maxver == 0 {
            debug!(file = %file, "Snapshots disabled, skipping");
            return Ok(None);
        }

        let _guard = self.locks.lock(file.path()).await?;
        let mut range = self.ledger.get(file).await?;
        let node = self.store.create(file, range.curr_version).await?;

        if let Err(e) = self.fill(file, &node, cancel).await {
            if node.created {
                self.store.discard(&node).await;
            }
            warn!(file = %file, ordinal = node.ordinal, error = %e, "Snapshot aborted");
            return Err(e);
        }

        let mut evicted = None;
        if range.len() >= u64::from(self.maxver) {
            let victim = range.old_version;
            match self.store.delete(file, victim).await {
                Ok(()) => evicted = Some(victim),
                Err(e) if e.is_not_found() => {
                    warn!(file = %file, ordinal = victim, "Evicted snapshot was already missing");
                }
                Err(e) => {
                    self.discard_filled(&node).await;
                    return Err(e);
                }
            }
            range.old_version += 1;
        }
        range.curr_version += 1;

        if let Err(e) = self.ledger.set(file, range).await {
            self.discard_filled(&node).await;
            return Err(e);
        }

        info!(
            file = %file,
            ordinal = node.ordinal,
            evicted = ?evicted,
            old = range.old_version,
            curr = range.curr_version,
            "Snapshot created"
        );
        Ok(Some(range))
    }

    async fn fill(
        &self,
        file: &TrackedFile,
        node: &SnapshotNode,
        cancel: &CancellationToken,
    ) -> BkpResult<()> {
        copy_node(
            self.backend.as_ref(),
            file.path(),
            &node.path,
            self.chunk_size,
            cancel,
        )
        .await?;

        if let Ok(meta) = self.backend.stat(file.path()).await {
            if let Some(modified) = meta.modified {
                if let Err(e) = self.backend.set_modified(&node.path, modified).await {
                    debug!(
                        snapshot = %node.path.display(),
                        error = %e,
                        "Could not propagate mtime"
                    );
                }
            }
        }

        self.store.seal(node).await
    }

    async fn discard_filled(&self, node: &SnapshotNode) {
        if node.created {
            if let Err(e) = self.backend.set_readonly(&node.path, false).await {
                debug!(snapshot = %node.path.display(), error = %e, "Unseal failed");
            }
            self.store.discard(node).await;
        }
    }
}
