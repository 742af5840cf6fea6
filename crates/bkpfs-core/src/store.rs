//! Backup store: snapshot nodes inside a file's backup container.

use crate::error::{BkpError, BkpResult};
use crate::naming::TrackedFile;
use bkpfs_storage::{Backend, NodeKind, NodeMeta};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A snapshot node returned by [`BackupStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotNode {
    pub ordinal: u64,
    pub path: PathBuf,
    /// Whether the node was allocated by this call.
    pub created: bool,
}

/// Creates, opens and deletes snapshot nodes.
#[derive(Clone)]
pub struct BackupStore {
    backend: Arc<dyn Backend>,
}

impl BackupStore {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Look up or allocate the snapshot for `ordinal`.
    ///
    /// The container is created on first use. An existing node is returned
    /// as is with `created: false`.
    pub async fn create(&self, file: &TrackedFile, ordinal: u64) -> BkpResult<SnapshotNode> {
        let container = file.container_path();
        if self.backend.create_dir(&container).await? {
            debug!(container = %container.display(), "Created backup container");
        }

        let path = file.snapshot_path(ordinal);
        let created = self.backend.create_file(&path).await?;
        debug!(snapshot = %path.display(), created, "Snapshot node ready");
        Ok(SnapshotNode {
            ordinal,
            path,
            created,
        })
    }

    /// Metadata of an existing snapshot.
    pub async fn open(&self, file: &TrackedFile, ordinal: u64) -> BkpResult<NodeMeta> {
        let path = file.snapshot_path(ordinal);
        match self.backend.stat(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(BkpError::not_found(format!(
                "snapshot {ordinal} of {file} is not a file"
            ))),
            Err(e) if e.is_not_found() => Err(BkpError::not_found(format!(
                "snapshot {ordinal} of {file}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the snapshot for `ordinal`. `NotFound` if absent.
    pub async fn delete(&self, file: &TrackedFile, ordinal: u64) -> BkpResult<()> {
        let path = file.snapshot_path(ordinal);
        self.backend.remove(&path).await.map_err(|e| {
            if e.is_not_found() {
                BkpError::not_found(format!("snapshot {ordinal} of {file}"))
            } else {
                e.into()
            }
        })?;
        info!(file = %file, ordinal, "Deleted snapshot");
        Ok(())
    }

    /// Mark a filled snapshot read-only.
    pub async fn seal(&self, node: &SnapshotNode) -> BkpResult<()> {
        self.backend.set_readonly(&node.path, true).await?;
        Ok(())
    }

    /// Remove a node this process allocated but could not complete.
    pub async fn discard(&self, node: &SnapshotNode) {
        if let Err(e) = self.backend.remove(&node.path).await {
            debug!(snapshot = %node.path.display(), error = %e, "Discard failed");
        }
    }

    /// Ordinals actually present in the container, ascending.
    pub async fn live_ordinals(&self, file: &TrackedFile) -> BkpResult<Vec<u64>> {
        let entries = match self.backend.list(&file.container_path()).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ordinals: Vec<u64> = entries
            .iter()
            .filter(|e| e.kind == NodeKind::File)
            .filter_map(|e| file.parse_snapshot_name(&e.name))
            .collect();
        ordinals.sort_unstable();
        Ok(ordinals)
    }

    /// Remove every snapshot and then the container itself.
    pub async fn remove_all(&self, file: &TrackedFile) -> BkpResult<usize> {
        let container = file.container_path();
        let entries = match self.backend.list(&container).await {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        for entry in &entries {
            self.backend.remove(&container.join(&entry.name)).await?;
        }
        self.backend.remove(&container).await?;
        info!(file = %file, removed = entries.len(), "Removed backup container");
        Ok(entries.len())
    }

    /// Whether the backup container exists.
    pub async fn has_container(&self, file: &TrackedFile) -> bool {
        self.backend.exists(&file.container_path()).await
    }
}
