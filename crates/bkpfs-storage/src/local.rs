//! Local directory backend.
//!
//! Nodes map onto real files under a root directory. Node attributes live
//! beside the node: every directory that holds attributed nodes gets a
//! record directory with one JSON record per node.
//!
//! ```text
//! root/
//!   notes.txt
//!   .notes.txt.bkp/
//!     .notes.txt.0
//!   bkpfs-attrs.bkp/
//!     notes.txt.json      # { "<attr>": [bytes...] }
//!     notes.txt.lock      # advisory lock for notes.txt
//! ```
//!
//! A node's records depend only on its own directory, so backends rooted at
//! different ancestors see the same attributes. Records are rewritten
//! atomically (uniquely named temp file, then rename). On unix,
//! [`Backend::lock_node`] takes an advisory `flock` on the node's lock file.

use crate::{Backend, DirEntry, NodeKind, NodeLock, NodeMeta, StorageError, StorageResult};
use async_trait::async_trait;
use bkpfs_util::path::{normalize_relative, split_name};
use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// Default name of the per-directory attribute record directory.
pub const DEFAULT_ATTR_DIR: &str = "bkpfs-attrs.bkp";

const RECORD_SUFFIX: &str = "json";
const LOCK_SUFFIX: &str = "lock";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

type AttrRecord = BTreeMap<String, Vec<u8>>;

/// Backend rooted at a directory on the local filesystem.
pub struct LocalBackend {
    root: PathBuf,
    attr_dir: String,
    /// Serializes read-modify-write cycles on attribute records in this process.
    attr_lock: Mutex<()>,
}

impl LocalBackend {
    /// Create a backend rooted at `root`, using the default record directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_attr_dir(root, DEFAULT_ATTR_DIR)
    }

    /// Create a backend with a custom record directory name.
    pub fn with_attr_dir(root: impl Into<PathBuf>, attr_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            attr_dir: attr_dir.into(),
            attr_lock: Mutex::new(()),
        }
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a backend path to a real path under the root.
    fn real(&self, path: &Path) -> StorageResult<PathBuf> {
        let relative = normalize_relative(path).ok_or_else(|| StorageError::invalid_path(path))?;
        Ok(self.root.join(relative))
    }

    /// Real path of a node's `suffix` sidecar in its directory's record directory.
    fn sidecar(&self, path: &Path, suffix: &str) -> StorageResult<PathBuf> {
        let relative = normalize_relative(path).ok_or_else(|| StorageError::invalid_path(path))?;
        let (parent, name) = split_name(&relative).ok_or_else(|| StorageError::invalid_path(path))?;
        Ok(self
            .root
            .join(parent)
            .join(&self.attr_dir)
            .join(format!("{name}.{suffix}")))
    }

    async fn load_record(&self, record: &Path) -> StorageResult<AttrRecord> {
        match fs::read_to_string(record).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(AttrRecord::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn store_record(&self, record: &Path, attrs: &AttrRecord) -> StorageResult<()> {
        if attrs.is_empty() {
            return match fs::remove_file(record).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StorageError::from_io(e, record)),
            };
        }
        if let Some(dir) = record.parent() {
            ensure_dir(dir).await?;
        }
        let content = serde_json::to_string(attrs)?;

        // Write atomically (write to temp file, then rename)
        let mut temp = record.as_os_str().to_owned();
        temp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let temp = PathBuf::from(temp);
        fs::write(&temp, &content).await?;
        fs::rename(&temp, record).await?;
        Ok(())
    }

    async fn require_writable(&self, real: &Path) -> StorageResult<()> {
        let meta = fs::metadata(real)
            .await
            .map_err(|e| StorageError::from_io(e, real))?;
        if meta.is_dir() {
            return Err(StorageError::IsADirectory(real.display().to_string()));
        }
        // Checked explicitly: permission bits are not enforced for privileged users.
        if meta.permissions().readonly() {
            return Err(StorageError::read_only(real));
        }
        Ok(())
    }
}

/// Create `dir` unless it exists. Its parent must exist.
async fn ensure_dir(dir: &Path) -> StorageResult<()> {
    match fs::create_dir(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(StorageError::from_io(e, dir)),
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn stat(&self, path: &Path) -> StorageResult<NodeMeta> {
        let real = self.real(path)?;
        let meta = fs::metadata(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;
        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        Ok(NodeMeta {
            kind,
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            readonly: meta.permissions().readonly(),
        })
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let real = self.real(path)?;
        let mut file = fs::File::open(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(len);
        file.take(len as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> StorageResult<()> {
        let real = self.real(path)?;
        self.require_writable(&real).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .open(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn truncate(&self, path: &Path, len: u64) -> StorageResult<()> {
        let real = self.real(path)?;
        self.require_writable(&real).await?;

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;
        file.set_len(len).await?;
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> StorageResult<bool> {
        let real = self.real(path)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&real)
            .await
        {
            Ok(_) => {
                debug!(path = %real.display(), "Allocated file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if fs::metadata(&real).await?.is_dir() {
                    Err(StorageError::IsADirectory(real.display().to_string()))
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(StorageError::from_io(e, &real)),
        }
    }

    async fn create_dir(&self, path: &Path) -> StorageResult<bool> {
        let real = self.real(path)?;
        match fs::create_dir(&real).await {
            Ok(()) => {
                debug!(path = %real.display(), "Allocated directory");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if fs::metadata(&real).await?.is_dir() {
                    Ok(false)
                } else {
                    Err(StorageError::AlreadyExists(real.display().to_string()))
                }
            }
            Err(e) => Err(StorageError::from_io(e, &real)),
        }
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> StorageResult<()> {
        let real = self.real(path)?;
        let mut permissions = fs::metadata(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?
            .permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(readonly);
        fs::set_permissions(&real, permissions).await?;
        Ok(())
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> StorageResult<()> {
        let real = self.real(path)?;
        let file = fs::File::open(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?
            .into_std()
            .await;
        tokio::task::spawn_blocking(move || file.set_modified(modified))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> StorageResult<()> {
        let real = self.real(path)?;
        if real == self.root {
            return Err(StorageError::invalid_path(path));
        }

        let meta = fs::metadata(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;
        let removed = if meta.is_dir() {
            fs::remove_dir(&real).await
        } else {
            fs::remove_file(&real).await
        };
        removed.map_err(|e| StorageError::from_io(e, &real))?;
        debug!(path = %real.display(), "Removed node");

        // Attributes die with their node.
        let record = self.sidecar(path, RECORD_SUFFIX)?;
        let _guard = self.attr_lock.lock().await;
        self.store_record(&record, &AttrRecord::new()).await
    }

    async fn list(&self, path: &Path) -> StorageResult<Vec<DirEntry>> {
        let real = self.real(path)?;
        let mut entries = fs::read_dir(&real)
            .await
            .map_err(|e| StorageError::from_io(e, &real))?;

        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            results.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        results.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(results)
    }

    async fn get_attr(&self, path: &Path, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let real = self.real(path)?;
        if !fs::try_exists(&real).await? {
            return Err(StorageError::not_found(path));
        }

        let record = self.sidecar(path, RECORD_SUFFIX)?;
        let _guard = self.attr_lock.lock().await;
        Ok(self.load_record(&record).await?.remove(name))
    }

    async fn set_attr(&self, path: &Path, name: &str, value: &[u8]) -> StorageResult<()> {
        let real = self.real(path)?;
        if !fs::try_exists(&real).await? {
            return Err(StorageError::not_found(path));
        }

        let record = self.sidecar(path, RECORD_SUFFIX)?;
        let _guard = self.attr_lock.lock().await;
        let mut attrs = self.load_record(&record).await?;
        attrs.insert(name.to_string(), value.to_vec());
        self.store_record(&record, &attrs).await
    }

    async fn remove_attr(&self, path: &Path, name: &str) -> StorageResult<()> {
        let record = self.sidecar(path, RECORD_SUFFIX)?;
        let _guard = self.attr_lock.lock().await;
        let mut attrs = self.load_record(&record).await?;
        if attrs.remove(name).is_some() {
            self.store_record(&record, &attrs).await?;
        }
        Ok(())
    }

    #[cfg(unix)]
    async fn lock_node(&self, path: &Path) -> StorageResult<Option<NodeLock>> {
        use nix::fcntl::{Flock, FlockArg};

        let lock_path = self.sidecar(path, LOCK_SUFFIX)?;
        if let Some(dir) = lock_path.parent() {
            ensure_dir(dir).await?;
        }
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .await
            .map_err(|e| StorageError::from_io(e, &lock_path))?
            .into_std()
            .await;

        // flock blocks the calling thread until the holder lets go.
        let held = tokio::task::spawn_blocking(move || {
            Flock::lock(file, FlockArg::LockExclusive)
                .map_err(|(_, errno)| std::io::Error::from(errno))
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        debug!(lock = %lock_path.display(), "Acquired node lock");
        Ok(Some(NodeLock::new(held)))
    }
}
