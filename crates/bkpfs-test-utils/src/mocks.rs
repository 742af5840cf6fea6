//! Mock backends for testing failure paths.

use async_trait::async_trait;
use bkpfs_storage::{Backend, DirEntry, NodeLock, NodeMeta, StorageError, StorageResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;

/// Backend operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Stat,
    ReadAt,
    WriteAt,
    Truncate,
    CreateFile,
    CreateDir,
    SetReadonly,
    Remove,
    List,
    GetAttr,
    SetAttr,
    LockNode,
}

#[derive(Clone)]
enum FaultAction {
    Fail,
    Cancel(CancellationToken),
}

#[derive(Clone)]
struct Fault {
    op: FaultOp,
    pattern: String,
    action: FaultAction,
}

/// Wraps a backend and injects failures into matching calls.
///
/// A fault matches when the operation is the same and the call's path
/// contains the configured pattern. Every call is counted per operation.
///
/// # Example
///
/// ```rust
/// use bkpfs_storage::{Backend, MemoryBackend};
/// use bkpfs_test_utils::mocks::{FaultOp, FaultyBackend};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # tokio_test_block(async {
/// let backend = FaultyBackend::new(Arc::new(MemoryBackend::new()));
/// backend.fail_on(FaultOp::CreateFile, "locked");
/// assert!(backend.create_file(Path::new("locked.txt")).await.is_err());
/// assert!(backend.create_file(Path::new("open.txt")).await.is_ok());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
/// # }
/// ```
#[derive(Clone)]
pub struct FaultyBackend {
    inner: Arc<dyn Backend>,
    faults: Arc<Mutex<Vec<Fault>>>,
    calls: Arc<Mutex<HashMap<FaultOp, usize>>>,
}

impl FaultyBackend {
    /// Wrap a backend with no faults configured.
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            faults: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fail every matching call with an IO error.
    pub fn fail_on(&self, op: FaultOp, pattern: &str) {
        self.push(op, pattern, FaultAction::Fail);
    }

    /// Cancel `token` when a matching call happens, then let it proceed.
    pub fn cancel_on(&self, op: FaultOp, pattern: &str, token: CancellationToken) {
        self.push(op, pattern, FaultAction::Cancel(token));
    }

    /// Remove all configured faults.
    pub fn clear(&self) {
        self.faults.lock().unwrap().clear();
    }

    /// Number of calls seen for `op`.
    pub fn calls(&self, op: FaultOp) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    fn push(&self, op: FaultOp, pattern: &str, action: FaultAction) {
        self.faults.lock().unwrap().push(Fault {
            op,
            pattern: pattern.to_string(),
            action,
        });
    }

    fn check(&self, op: FaultOp, path: &Path) -> StorageResult<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;

        let shown = path.to_string_lossy();
        let faults = self.faults.lock().unwrap().clone();
        for fault in faults
            .iter()
            .filter(|f| f.op == op && shown.contains(f.pattern.as_str()))
        {
            match &fault.action {
                FaultAction::Fail => {
                    return Err(StorageError::Io(std::io::Error::other(format!(
                        "injected {op:?} fault on {shown}"
                    ))))
                }
                FaultAction::Cancel(token) => token.cancel(),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FaultyBackend {
    async fn stat(&self, path: &Path) -> StorageResult<NodeMeta> {
        self.check(FaultOp::Stat, path)?;
        self.inner.stat(path).await
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.check(FaultOp::ReadAt, path)?;
        self.inner.read_at(path, offset, len).await
    }

    async fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.check(FaultOp::WriteAt, path)?;
        self.inner.write_at(path, offset, data).await
    }

    async fn truncate(&self, path: &Path, len: u64) -> StorageResult<()> {
        self.check(FaultOp::Truncate, path)?;
        self.inner.truncate(path, len).await
    }

    async fn create_file(&self, path: &Path) -> StorageResult<bool> {
        self.check(FaultOp::CreateFile, path)?;
        self.inner.create_file(path).await
    }

    async fn create_dir(&self, path: &Path) -> StorageResult<bool> {
        self.check(FaultOp::CreateDir, path)?;
        self.inner.create_dir(path).await
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> StorageResult<()> {
        self.check(FaultOp::SetReadonly, path)?;
        self.inner.set_readonly(path, readonly).await
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> StorageResult<()> {
        self.inner.set_modified(path, modified).await
    }

    async fn remove(&self, path: &Path) -> StorageResult<()> {
        self.check(FaultOp::Remove, path)?;
        self.inner.remove(path).await
    }

    async fn list(&self, path: &Path) -> StorageResult<Vec<DirEntry>> {
        self.check(FaultOp::List, path)?;
        self.inner.list(path).await
    }

    async fn get_attr(&self, path: &Path, name: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check(FaultOp::GetAttr, path)?;
        self.inner.get_attr(path, name).await
    }

    async fn set_attr(&self, path: &Path, name: &str, value: &[u8]) -> StorageResult<()> {
        self.check(FaultOp::SetAttr, path)?;
        self.inner.set_attr(path, name, value).await
    }

    async fn remove_attr(&self, path: &Path, name: &str) -> StorageResult<()> {
        self.inner.remove_attr(path, name).await
    }

    async fn lock_node(&self, path: &Path) -> StorageResult<Option<NodeLock>> {
        self.check(FaultOp::LockNode, path)?;
        self.inner.lock_node(path).await
    }
}
