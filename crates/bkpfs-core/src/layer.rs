//! Versioned layer over a storage backend.
//!
//! [`VersionedFs`] passes ordinary file operations through to the backend
//! and adds the versioning behavior on top: closing a session that wrote
//! takes a snapshot, listings hide backup containers, and control requests
//! are served by the dispatcher.

use crate::config::BkpConfig;
use crate::dispatcher::{DeleteReport, Dispatcher, VerifyReport, VersionListing};
use crate::error::{BkpError, BkpResult};
use crate::filter;
use crate::ledger::{Ledger, VersionRange};
use crate::lock::FileLocks;
use crate::naming::TrackedFile;
use crate::protocol::{ControlRequest, ControlResponse};
use crate::retrieval::Materialized;
use crate::store::BackupStore;
use crate::version::{DeleteSpec, Operation, VersionSpec};
use crate::writer::SnapshotWriter;
use bkpfs_storage::{Backend, DirEntry};
use bkpfs_util::path::normalize_relative;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a session opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only. Writes are refused.
    Read,
    /// Read and write from the start, keeping existing content.
    Write,
    /// Every write goes to the current end of file.
    Append,
    /// Discard existing content on open.
    Truncate,
}

/// An open handle on a tracked file.
///
/// The session remembers whether it wrote; only sessions that wrote trigger
/// a snapshot when passed to [`VersionedFs::close`]. Dropping a session
/// without closing it takes no snapshot.
pub struct WriteSession {
    backend: Arc<dyn Backend>,
    file: TrackedFile,
    mode: OpenMode,
    position: u64,
    dirty: bool,
}

impl WriteSession {
    pub fn file(&self) -> &TrackedFile {
        &self.file
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether this session has modified the file.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position;
    }

    /// Write at the current position (or at end of file in append mode).
    pub async fn write(&mut self, data: &[u8]) -> BkpResult<usize> {
        if self.mode == OpenMode::Read {
            return Err(BkpError::Permission(format!(
                "{} is open read-only",
                self.file
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let offset = match self.mode {
            OpenMode::Append => self.backend.stat(self.file.path()).await?.size,
            _ => self.position,
        };
        self.backend.write_at(self.file.path(), offset, data).await?;
        self.position = offset + data.len() as u64;
        self.dirty = true;
        Ok(data.len())
    }

    /// Read up to `len` bytes from the current position.
    pub async fn read(&mut self, len: usize) -> BkpResult<Vec<u8>> {
        let data = self
            .backend
            .read_at(self.file.path(), self.position, len)
            .await?;
        self.position += data.len() as u64;
        Ok(data)
    }
}

/// Versioned file layer.
pub struct VersionedFs {
    backend: Arc<dyn Backend>,
    config: BkpConfig,
    locks: FileLocks,
    ledger: Ledger,
    store: BackupStore,
    writer: SnapshotWriter,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl VersionedFs {
    /// Build the layer over `backend`. The config is validated first.
    pub fn new(backend: Arc<dyn Backend>, config: BkpConfig) -> BkpResult<Self> {
        config.validate()?;
        let locks = FileLocks::with_backend(backend.clone());
        let chunk_size = config.chunk_size();
        Ok(Self {
            ledger: Ledger::new(backend.clone()),
            store: BackupStore::new(backend.clone()),
            writer: SnapshotWriter::new(
                backend.clone(),
                locks.clone(),
                config.maxver(),
                chunk_size,
            ),
            dispatcher: Dispatcher::new(backend.clone(), locks.clone(), chunk_size),
            backend,
            config,
            locks,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &BkpConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Cancel every in-flight copy. Partial destinations are removed.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn op_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Create a tracked file with an empty version window.
    ///
    /// An existing file is left as is.
    pub async fn create(&self, path: impl AsRef<Path>) -> BkpResult<TrackedFile> {
        let file = TrackedFile::new(path)?;
        let _guard = self.locks.lock(file.path()).await?;
        if self.backend.create_file(file.path()).await? {
            self.backend.create_dir(&file.container_path()).await?;
            self.ledger.set(&file, VersionRange::default()).await?;
            debug!(file = %file, "Created tracked file");
        }
        Ok(file)
    }

    /// Open an existing file.
    pub async fn open(&self, path: impl AsRef<Path>, mode: OpenMode) -> BkpResult<WriteSession> {
        let file = TrackedFile::new(path)?;
        let meta = self.backend.stat(file.path()).await?;
        if meta.is_dir() {
            return Err(BkpError::invalid_argument(format!("{file} is a directory")));
        }

        let mut dirty = false;
        if mode == OpenMode::Truncate && meta.size > 0 {
            self.backend.truncate(file.path(), 0).await?;
            dirty = true;
        }
        Ok(WriteSession {
            backend: self.backend.clone(),
            file,
            mode,
            position: 0,
            dirty,
        })
    }

    /// Close a session, snapshotting the file if the session wrote.
    pub async fn close(&self, session: WriteSession) -> BkpResult<Option<VersionRange>> {
        if !session.dirty {
            debug!(file = %session.file, "Clean close, no snapshot");
            return Ok(None);
        }
        self.writer.snapshot(&session.file, &self.op_token()).await
    }

    /// Replace a file's content in one session, creating it if needed.
    pub async fn write_file(
        &self,
        path: impl AsRef<Path>,
        data: &[u8],
    ) -> BkpResult<Option<VersionRange>> {
        let file = self.create(path).await?;
        let mut session = self.open(file.path(), OpenMode::Truncate).await?;
        session.write(data).await?;
        self.close(session).await
    }

    /// Read a whole file.
    pub async fn read(&self, path: impl AsRef<Path>) -> BkpResult<Vec<u8>> {
        let file = TrackedFile::new(path)?;
        let size = self.backend.stat(file.path()).await?.size;
        let len = usize::try_from(size)
            .map_err(|_| BkpError::invalid_argument(format!("{file} is too large to read")))?;
        Ok(self.backend.read_at(file.path(), 0, len).await?)
    }

    /// List a directory with backup containers hidden.
    pub async fn read_dir(&self, dir: impl AsRef<Path>) -> BkpResult<Vec<DirEntry>> {
        let raw = dir.as_ref();
        let dir = normalize_relative(raw).ok_or_else(|| {
            BkpError::invalid_argument(format!("path escapes root: {}", raw.display()))
        })?;
        Ok(filter::visible(self.backend.list(&dir).await?))
    }

    /// Remove a tracked file together with its snapshots and record.
    pub async fn remove(&self, path: impl AsRef<Path>) -> BkpResult<()> {
        let file = TrackedFile::new(path)?;
        let _guard = self.locks.lock(file.path()).await?;
        self.backend.stat(file.path()).await?;

        let removed = self.store.remove_all(&file).await?;
        self.ledger.clear(&file).await?;
        self.backend.remove(file.path()).await?;
        info!(file = %file, snapshots = removed, "Removed tracked file");
        Ok(())
    }

    pub async fn list(&self, path: impl AsRef<Path>) -> BkpResult<VersionListing> {
        self.dispatcher.list(&TrackedFile::new(path)?).await
    }

    pub async fn delete(
        &self,
        path: impl AsRef<Path>,
        spec: DeleteSpec,
    ) -> BkpResult<DeleteReport> {
        self.dispatcher.delete(&TrackedFile::new(path)?, spec).await
    }

    /// Stream a version's content into `sink`.
    pub async fn view<W>(
        &self,
        path: impl AsRef<Path>,
        spec: VersionSpec,
        sink: &mut W,
    ) -> BkpResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let file = TrackedFile::new(path)?;
        self.dispatcher
            .view(&file, spec, sink, &self.op_token())
            .await
    }

    pub async fn restore(
        &self,
        path: impl AsRef<Path>,
        spec: VersionSpec,
    ) -> BkpResult<Materialized> {
        let file = TrackedFile::new(path)?;
        self.dispatcher.restore(&file, spec, &self.op_token()).await
    }

    pub async fn verify(&self, path: impl AsRef<Path>) -> BkpResult<VerifyReport> {
        self.dispatcher.verify(&TrackedFile::new(path)?).await
    }

    /// Serve a control request. View content goes to `sink`.
    pub async fn execute<W>(
        &self,
        request: &ControlRequest,
        sink: &mut W,
    ) -> BkpResult<ControlResponse>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        request.check()?;
        match request.op {
            Operation::List => Ok(ControlResponse::List(self.list(&request.file).await?)),
            Operation::Delete => Ok(ControlResponse::Delete(
                self.delete(&request.file, request.delete_spec()?).await?,
            )),
            Operation::View => {
                let bytes = self.view(&request.file, request.version_spec()?, sink).await?;
                Ok(ControlResponse::View { bytes })
            }
            Operation::Restore => Ok(ControlResponse::Restore(
                self.restore(&request.file, request.version_spec()?).await?,
            )),
        }
    }
}
