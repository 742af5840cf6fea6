//! Retrieval engine: resolves a version selector and materializes the
//! snapshot as a view or restore node beside the tracked file.

use crate::error::{BkpError, BkpResult};
use crate::ledger::{Ledger, VersionRange};
use crate::naming::TrackedFile;
use crate::store::BackupStore;
use crate::version::VersionSpec;
use bkpfs_storage::{copy_node, Backend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a retrieved version is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Ephemeral `name.N.vue`, removed once streamed.
    View,
    /// Persistent `.name.N.swp`.
    Restore,
}

/// A materialized version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Materialized {
    pub ordinal: u64,
    pub path: PathBuf,
    pub size: u64,
    pub mode: RetrievalMode,
}

/// Resolves selectors against the ledger and copies snapshots out.
#[derive(Clone)]
pub struct RetrievalEngine {
    backend: Arc<dyn Backend>,
    ledger: Ledger,
    store: BackupStore,
    chunk_size: usize,
}

impl RetrievalEngine {
    pub fn new(backend: Arc<dyn Backend>, chunk_size: usize) -> Self {
        Self {
            ledger: Ledger::new(backend.clone()),
            store: BackupStore::new(backend.clone()),
            backend,
            chunk_size,
        }
    }

    /// Resolve `spec` to an ordinal inside the retained window.
    pub fn resolve(range: VersionRange, spec: VersionSpec) -> BkpResult<u64> {
        let resolved = match spec {
            VersionSpec::Oldest => range.oldest(),
            VersionSpec::Newest => range.newest(),
            VersionSpec::Literal(n) => range.contains(n).then_some(n),
        };
        resolved.ok_or_else(|| BkpError::OutOfRange {
            requested: spec.to_string(),
            old: range.old_version,
            curr: range.curr_version,
        })
    }

    /// Copy the selected snapshot to its view or restore node.
    ///
    /// Callers must hold the file's lock. A destination left by an earlier
    /// run is replaced. On failure or cancellation the partial destination
    /// is removed before returning.
    pub async fn materialize(
        &self,
        file: &TrackedFile,
        spec: VersionSpec,
        mode: RetrievalMode,
        cancel: &CancellationToken,
    ) -> BkpResult<Materialized> {
        let range = self.ledger.get(file).await?;
        let ordinal = Self::resolve(range, spec)?;
        let source = self.store.open(file, ordinal).await?;

        let path = match mode {
            RetrievalMode::View => file.view_path(ordinal),
            RetrievalMode::Restore => file.restore_path(ordinal),
        };
        self.prepare_destination(&path).await?;

        let partial = PartialNode::new(self.backend.clone(), path.clone());
        let snapshot = file.snapshot_path(ordinal);
        let size = match copy_node(
            self.backend.as_ref(),
            &snapshot,
            &path,
            self.chunk_size,
            cancel,
        )
        .await
        {
            Ok(size) => size,
            Err(e) => {
                partial.discard().await;
                return Err(e.into());
            }
        };

        if let Some(modified) = source.modified {
            if let Err(e) = self.backend.set_modified(&path, modified).await {
                debug!(path = %path.display(), error = %e, "Could not propagate mtime");
            }
        }
        if let Err(e) = self.backend.set_readonly(&path, true).await {
            partial.discard().await;
            return Err(e.into());
        }
        partial.keep();

        info!(file = %file, ordinal, ?mode, bytes = size, "Materialized version");
        Ok(Materialized {
            ordinal,
            path,
            size,
            mode,
        })
    }

    async fn prepare_destination(&self, path: &Path) -> BkpResult<()> {
        match self.backend.stat(path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(BkpError::invalid_argument(format!(
                    "{} exists and is a directory",
                    path.display()
                )))
            }
            Ok(meta) if meta.readonly => {
                debug!(path = %path.display(), "Replacing earlier materialization");
                self.backend.set_readonly(path, false).await?;
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.backend.create_file(path).await?;
        Ok(())
    }
}

/// A destination node that is removed unless explicitly kept.
///
/// If the owning future is dropped mid-copy, removal is scheduled on the
/// current runtime.
pub(crate) struct PartialNode {
    backend: Arc<dyn Backend>,
    path: PathBuf,
    armed: bool,
}

impl PartialNode {
    pub(crate) fn new(backend: Arc<dyn Backend>, path: PathBuf) -> Self {
        Self {
            backend,
            path,
            armed: true,
        }
    }

    /// Remove the node now.
    pub(crate) async fn discard(mut self) {
        self.armed = false;
        remove_node(self.backend.as_ref(), &self.path).await;
    }

    /// Keep the node.
    pub(crate) fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialNode {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(path = %self.path.display(), "No runtime to remove partial node");
            return;
        };
        let backend = self.backend.clone();
        let path = std::mem::take(&mut self.path);
        handle.spawn(async move {
            remove_node(backend.as_ref(), &path).await;
        });
    }
}

async fn remove_node(backend: &dyn Backend, path: &Path) {
    // Some platforms refuse to unlink read-only files.
    match backend.set_readonly(path, false).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return,
        Err(e) => debug!(path = %path.display(), error = %e, "Could not unseal partial node"),
    }
    match backend.remove(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial node"),
        Err(e) if e.is_not_found() => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Could not remove partial node"),
    }
}
