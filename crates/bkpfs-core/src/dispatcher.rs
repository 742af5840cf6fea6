//! Command dispatcher for versioning control requests.
//!
//! Each request targets one tracked file. Every request except list runs
//! under that file's lock.

use crate::error::{BkpError, BkpResult};
use crate::ledger::{Ledger, VersionRange};
use crate::lock::FileLocks;
use crate::naming::TrackedFile;
use crate::retrieval::{Materialized, PartialNode, RetrievalEngine, RetrievalMode};
use crate::store::BackupStore;
use crate::version::{DeleteSpec, VersionSpec};
use bkpfs_storage::Backend;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionListing {
    pub old_version: u64,
    pub curr_version: u64,
    pub filename: String,
}

impl VersionListing {
    /// Retained ordinals, ascending.
    pub fn ordinals(&self) -> std::ops::Range<u64> {
        self.old_version..self.curr_version
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    /// Ordinals whose snapshot was removed.
    pub deleted: Vec<u64>,
    /// Ordinals dropped from the window whose snapshot was already gone.
    pub missing: Vec<u64>,
    /// Window after the delete.
    pub range: VersionRange,
}

/// Result of a verify request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub range: VersionRange,
    /// Ordinals inside the window with no snapshot.
    pub missing: Vec<u64>,
    /// Snapshots present outside the window.
    pub orphaned: Vec<u64>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.orphaned.is_empty()
    }
}

/// Serves list, delete, view, restore and verify requests.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    ledger: Ledger,
    store: BackupStore,
    retrieval: RetrievalEngine,
    locks: FileLocks,
    chunk_size: usize,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>, locks: FileLocks, chunk_size: usize) -> Self {
        Self {
            ledger: Ledger::new(backend.clone()),
            store: BackupStore::new(backend.clone()),
            retrieval: RetrievalEngine::new(backend.clone(), chunk_size),
            backend,
            locks,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Report the retained window. Snapshot existence is not checked.
    pub async fn list(&self, file: &TrackedFile) -> BkpResult<VersionListing> {
        let range = self.ledger.get(file).await?;
        Ok(VersionListing {
            old_version: range.old_version,
            curr_version: range.curr_version,
            filename: file.name().to_string(),
        })
    }

    /// Delete the oldest, the newest or every retained snapshot.
    pub async fn delete(&self, file: &TrackedFile, spec: DeleteSpec) -> BkpResult<DeleteReport> {
        let _guard = self.locks.lock(file.path()).await?;
        let before = self.ledger.get(file).await?;
        let out_of_range = || BkpError::OutOfRange {
            requested: spec.to_string(),
            old: before.old_version,
            curr: before.curr_version,
        };

        let mut range = before;
        let targets: Vec<u64> = match spec {
            DeleteSpec::Oldest => {
                let ordinal = before.oldest().ok_or_else(out_of_range)?;
                range.old_version += 1;
                vec![ordinal]
            }
            DeleteSpec::Newest => {
                let ordinal = before.newest().ok_or_else(out_of_range)?;
                range.curr_version -= 1;
                vec![ordinal]
            }
            DeleteSpec::All => {
                range.old_version = range.curr_version;
                before.ordinals().collect()
            }
        };

        let mut report = DeleteReport::default();
        for ordinal in targets {
            match self.store.delete(file, ordinal).await {
                Ok(()) => report.deleted.push(ordinal),
                Err(e) if e.is_not_found() => {
                    warn!(
                        file = %file,
                        ordinal,
                        "Snapshot already missing, dropping from window"
                    );
                    report.missing.push(ordinal);
                }
                Err(e) => {
                    // Keep the ledger in step with what was actually removed.
                    if spec == DeleteSpec::All && ordinal > before.old_version {
                        let partial = VersionRange::new(ordinal, before.curr_version)?;
                        self.ledger.set(file, partial).await?;
                    }
                    return Err(e);
                }
            }
        }

        self.ledger.set(file, range).await?;
        report.range = range;
        info!(
            file = %file,
            %spec,
            deleted = report.deleted.len(),
            missing = report.missing.len(),
            "Deleted versions"
        );
        Ok(report)
    }

    /// Stream the selected version into `sink`. Returns the bytes written.
    ///
    /// The file stays locked until the ephemeral view node is removed, which
    /// happens also on failure. Concurrent views of one version therefore
    /// take turns on the shared view node.
    pub async fn view<W>(
        &self,
        file: &TrackedFile,
        spec: VersionSpec,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> BkpResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let _guard = self.locks.lock(file.path()).await?;
        let materialized = self
            .retrieval
            .materialize(file, spec, RetrievalMode::View, cancel)
            .await?;

        let view = PartialNode::new(self.backend.clone(), materialized.path.clone());
        let streamed = self.stream(&materialized, sink, cancel).await;
        view.discard().await;
        let bytes = streamed?;
        debug!(file = %file, ordinal = materialized.ordinal, bytes, "Streamed view");
        Ok(bytes)
    }

    async fn stream<W>(
        &self,
        materialized: &Materialized,
        sink: &mut W,
        cancel: &CancellationToken,
    ) -> BkpResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut offset = 0u64;
        while offset < materialized.size {
            if cancel.is_cancelled() {
                return Err(BkpError::Cancelled(materialized.path.display().to_string()));
            }
            let chunk = self
                .backend
                .read_at(&materialized.path, offset, self.chunk_size)
                .await?;
            if chunk.is_empty() {
                break;
            }
            sink.write_all(&chunk)
                .await
                .map_err(|e| BkpError::ResourceExhausted(e.into()))?;
            offset += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| BkpError::ResourceExhausted(e.into()))?;
        Ok(offset)
    }

    /// Materialize the selected version as a persistent restore node.
    pub async fn restore(
        &self,
        file: &TrackedFile,
        spec: VersionSpec,
        cancel: &CancellationToken,
    ) -> BkpResult<Materialized> {
        let _guard = self.locks.lock(file.path()).await?;
        self.retrieval
            .materialize(file, spec, RetrievalMode::Restore, cancel)
            .await
    }

    /// Compare the ledger window with the snapshots actually present.
    pub async fn verify(&self, file: &TrackedFile) -> BkpResult<VerifyReport> {
        let _guard = self.locks.lock(file.path()).await?;
        let range = self.ledger.get(file).await?;
        let live = self.store.live_ordinals(file).await?;

        let missing = range.ordinals().filter(|n| !live.contains(n)).collect();
        let orphaned = live.into_iter().filter(|n| !range.contains(*n)).collect();
        let report = VerifyReport {
            range,
            missing,
            orphaned,
        };
        if !report.is_consistent() {
            warn!(
                file = %file,
                missing = ?report.missing,
                orphaned = ?report.orphaned,
                "Version window does not match backup container"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SnapshotWriter;
    use bkpfs_storage::MemoryBackend;
    use bkpfs_test_utils::{FaultOp, FaultyBackend};
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    struct Harness {
        backend: Arc<dyn Backend>,
        dispatcher: Dispatcher,
        writer: SnapshotWriter,
        file: TrackedFile,
    }

    impl Harness {
        async fn new(backend: Arc<dyn Backend>, maxver: u32) -> Self {
            backend.create_file(Path::new("a.txt")).await.unwrap();
            let locks = FileLocks::new();
            Self {
                dispatcher: Dispatcher::new(backend.clone(), locks.clone(), 3),
                writer: SnapshotWriter::new(backend.clone(), locks, maxver, 3),
                backend,
                file: TrackedFile::new("a.txt").unwrap(),
            }
        }

        async fn close(&self, content: &[u8]) {
            self.backend.truncate(self.file.path(), 0).await.unwrap();
            self.backend
                .write_at(self.file.path(), 0, content)
                .await
                .unwrap();
            self.writer
                .snapshot(&self.file, &CancellationToken::new())
                .await
                .unwrap();
        }

        async fn view(&self, spec: VersionSpec) -> BkpResult<Vec<u8>> {
            let mut sink = Vec::new();
            self.dispatcher
                .view(&self.file, spec, &mut sink, &CancellationToken::new())
                .await?;
            Ok(sink)
        }

        async fn listing(&self) -> (u64, u64) {
            let listing = self.dispatcher.list(&self.file).await.unwrap();
            (listing.old_version, listing.curr_version)
        }
    }

    #[tokio::test]
    async fn test_list_reports_window_and_name() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 2).await;
        for content in [b"v1", b"v2", b"v3"] {
            h.close(content).await;
        }
        let listing = h.dispatcher.list(&h.file).await.unwrap();
        assert_eq!(
            listing,
            VersionListing {
                old_version: 1,
                curr_version: 3,
                filename: "a.txt".into(),
            }
        );
        assert_eq!(listing.ordinals().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_list_missing_file() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 2).await;
        let ghost = TrackedFile::new("ghost.txt").unwrap();
        assert!(h.dispatcher.list(&ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_view_streams_and_cleans_up() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        h.close(b"first version").await;
        h.close(b"second").await;

        assert_eq!(h.view(VersionSpec::Oldest).await.unwrap(), b"first version");
        assert_eq!(h.view(VersionSpec::Newest).await.unwrap(), b"second");
        assert_eq!(h.view(VersionSpec::Literal(0)).await.unwrap(), b"first version");
        assert!(!h.backend.exists(&h.file.view_path(0)).await);
        assert!(!h.backend.exists(&h.file.view_path(1)).await);
    }

    #[tokio::test]
    async fn test_cancelled_view_leaves_no_node() {
        let faulty = FaultyBackend::new(Arc::new(MemoryBackend::new()));
        let h = Harness::new(Arc::new(faulty.clone()), 5).await;
        h.close(b"content that spans chunks").await;

        let cancel = CancellationToken::new();
        faulty.cancel_on(FaultOp::WriteAt, ".vue", cancel.clone());
        let mut sink = Vec::new();
        let err = h
            .dispatcher
            .view(&h.file, VersionSpec::Newest, &mut sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BkpError::Cancelled(_)));
        assert!(!h.backend.exists(&h.file.view_path(0)).await);
    }

    #[tokio::test]
    async fn test_concurrent_views_of_one_version() {
        let content = b"hello world, this spans chunks";
        let h = Arc::new(Harness::new(Arc::new(MemoryBackend::new()), 5).await);
        h.close(content).await;

        // A one-byte pipe keeps the first view mid-stream until it is drained.
        let (mut pipe, mut reader) = tokio::io::duplex(1);
        let first = {
            let h = h.clone();
            tokio::spawn(async move {
                h.dispatcher
                    .view(&h.file, VersionSpec::Newest, &mut pipe, &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = {
            let h = h.clone();
            tokio::spawn(async move { h.view(VersionSpec::Newest).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut streamed = Vec::new();
        reader.read_to_end(&mut streamed).await.unwrap();

        assert_eq!(first.await.unwrap().unwrap(), content.len() as u64);
        assert_eq!(streamed, content);
        assert_eq!(second.await.unwrap().unwrap(), content);
        assert!(!h.backend.exists(&h.file.view_path(0)).await);
    }

    #[tokio::test]
    async fn test_restore_persists() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        h.close(b"keep me").await;

        let restored = h
            .dispatcher
            .restore(&h.file, VersionSpec::Newest, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(restored.mode, RetrievalMode::Restore);
        assert_eq!(
            h.backend.read_at(&restored.path, 0, 64).await.unwrap(),
            b"keep me"
        );
    }

    #[tokio::test]
    async fn test_delete_oldest_and_newest() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        for content in [b"v1", b"v2", b"v3"] {
            h.close(content).await;
        }

        let report = h.dispatcher.delete(&h.file, DeleteSpec::Oldest).await.unwrap();
        assert_eq!(report.deleted, vec![0]);
        assert_eq!(h.listing().await, (1, 3));

        let report = h.dispatcher.delete(&h.file, DeleteSpec::Newest).await.unwrap();
        assert_eq!(report.deleted, vec![2]);
        assert_eq!(h.listing().await, (1, 2));
        assert_eq!(h.view(VersionSpec::Newest).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_delete_all_is_idempotent() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        for content in [b"v1", b"v2"] {
            h.close(content).await;
        }

        let report = h.dispatcher.delete(&h.file, DeleteSpec::All).await.unwrap();
        assert_eq!(report.deleted, vec![0, 1]);
        assert_eq!(h.listing().await, (2, 2));

        let report = h.dispatcher.delete(&h.file, DeleteSpec::All).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(h.listing().await, (2, 2));
    }

    #[tokio::test]
    async fn test_delete_on_empty_window() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        for spec in [DeleteSpec::Oldest, DeleteSpec::Newest] {
            let err = h.dispatcher.delete(&h.file, spec).await.unwrap_err();
            assert!(err.is_out_of_range());
        }
        assert_eq!(h.listing().await, (0, 0));
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_snapshot() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        for content in [b"v1", b"v2"] {
            h.close(content).await;
        }
        h.backend.remove(&h.file.snapshot_path(0)).await.unwrap();

        let report = h.dispatcher.delete(&h.file, DeleteSpec::All).await.unwrap();
        assert_eq!(report.missing, vec![0]);
        assert_eq!(report.deleted, vec![1]);
        assert_eq!(report.range, VersionRange::new(2, 2).unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_hard_failure_keeps_ledger_in_step() {
        let faulty = FaultyBackend::new(Arc::new(MemoryBackend::new()));
        let h = Harness::new(Arc::new(faulty.clone()), 5).await;
        for content in [b"v1", b"v2", b"v3"] {
            h.close(content).await;
        }

        faulty.fail_on(FaultOp::Remove, ".a.txt.2");
        assert!(h.dispatcher.delete(&h.file, DeleteSpec::All).await.is_err());
        assert_eq!(h.listing().await, (2, 3));
        assert_eq!(h.view(VersionSpec::Oldest).await.unwrap(), b"v3");
    }

    #[tokio::test]
    async fn test_verify_reports_gaps_and_orphans() {
        let h = Harness::new(Arc::new(MemoryBackend::new()), 5).await;
        for content in [b"v1", b"v2", b"v3"] {
            h.close(content).await;
        }
        assert!(h.dispatcher.verify(&h.file).await.unwrap().is_consistent());

        h.backend.remove(&h.file.snapshot_path(1)).await.unwrap();
        BackupStore::new(h.backend.clone())
            .create(&h.file, 9)
            .await
            .unwrap();

        let report = h.dispatcher.verify(&h.file).await.unwrap();
        assert_eq!(report.missing, vec![1]);
        assert_eq!(report.orphaned, vec![9]);
        assert!(h.view(VersionSpec::Literal(1)).await.unwrap_err().is_not_found());
    }
}
