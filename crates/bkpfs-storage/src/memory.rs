//! In-memory backend implementation for testing.

use crate::{Backend, DirEntry, NodeKind, NodeMeta, StorageError, StorageResult};
use async_trait::async_trait;
use bkpfs_util::path::normalize_relative;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

#[derive(Debug, Clone)]
enum Content {
    File(Vec<u8>),
    Directory,
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    modified: SystemTime,
    readonly: bool,
    attrs: HashMap<String, Vec<u8>>,
}

impl Node {
    fn file() -> Self {
        Self {
            content: Content::File(Vec::new()),
            modified: SystemTime::now(),
            readonly: false,
            attrs: HashMap::new(),
        }
    }

    fn directory() -> Self {
        Self {
            content: Content::Directory,
            ..Self::file()
        }
    }

    fn meta(&self) -> NodeMeta {
        let (kind, size) = match &self.content {
            Content::File(data) => (NodeKind::File, data.len() as u64),
            Content::Directory => (NodeKind::Directory, 0),
        };
        NodeMeta {
            kind,
            size,
            modified: Some(self.modified),
            readonly: self.readonly,
        }
    }
}

/// In-memory backend.
///
/// Thread-safe via an internal `RwLock`. All data is lost when dropped.
/// Nodes are kept in a `BTreeMap` so listings come out sorted.
#[derive(Debug)]
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<PathBuf, Node>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new backend holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::new(), Node::directory());
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    fn key(path: &Path) -> StorageResult<PathBuf> {
        normalize_relative(path).ok_or_else(|| StorageError::invalid_path(path))
    }

    fn read_nodes(
        &self,
    ) -> StorageResult<std::sync::RwLockReadGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    fn write_nodes(
        &self,
    ) -> StorageResult<std::sync::RwLockWriteGuard<'_, BTreeMap<PathBuf, Node>>> {
        self.nodes
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    /// Ensure the parent of `key` exists and is a directory.
    fn check_parent(nodes: &BTreeMap<PathBuf, Node>, key: &Path) -> StorageResult<()> {
        let parent = key.parent().unwrap_or(Path::new(""));
        match nodes.get(parent) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => Ok(()),
            Some(_) => Err(StorageError::NotADirectory(parent.display().to_string())),
            None => Err(StorageError::not_found(parent)),
        }
    }

    /// Get a mutable file node that may be modified.
    fn writable_file<'a>(
        nodes: &'a mut BTreeMap<PathBuf, Node>,
        key: &Path,
    ) -> StorageResult<&'a mut Node> {
        let node = nodes.get_mut(key).ok_or_else(|| StorageError::not_found(key))?;
        if matches!(node.content, Content::Directory) {
            return Err(StorageError::IsADirectory(key.display().to_string()));
        }
        if node.readonly {
            return Err(StorageError::read_only(key));
        }
        Ok(node)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn stat(&self, path: &Path) -> StorageResult<NodeMeta> {
        let key = Self::key(path)?;
        let nodes = self.read_nodes()?;
        nodes
            .get(&key)
            .map(Node::meta)
            .ok_or_else(|| StorageError::not_found(&key))
    }

    async fn read_at(&self, path: &Path, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let key = Self::key(path)?;
        let nodes = self.read_nodes()?;
        match nodes.get(&key).map(|n| &n.content) {
            Some(Content::File(data)) => {
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Some(Content::Directory) => Err(StorageError::IsADirectory(key.display().to_string())),
            None => Err(StorageError::not_found(&key)),
        }
    }

    async fn write_at(&self, path: &Path, offset: u64, data: &[u8]) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = Self::writable_file(&mut nodes, &key)?;
        if let Content::File(bytes) = &mut node.content {
            let start = usize::try_from(offset).map_err(|_| StorageError::invalid_path(&key))?;
            let end = start + data.len();
            if bytes.len() < end {
                bytes.resize(end, 0);
            }
            bytes[start..end].copy_from_slice(data);
        }
        node.modified = SystemTime::now();
        Ok(())
    }

    async fn truncate(&self, path: &Path, len: u64) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = Self::writable_file(&mut nodes, &key)?;
        if let Content::File(bytes) = &mut node.content {
            let len = usize::try_from(len).map_err(|_| StorageError::invalid_path(&key))?;
            bytes.resize(len, 0);
        }
        node.modified = SystemTime::now();
        Ok(())
    }

    async fn create_file(&self, path: &Path) -> StorageResult<bool> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        match nodes.get(&key) {
            Some(Node {
                content: Content::File(_),
                ..
            }) => return Ok(false),
            Some(_) => return Err(StorageError::IsADirectory(key.display().to_string())),
            None => {}
        }
        Self::check_parent(&nodes, &key)?;
        nodes.insert(key, Node::file());
        Ok(true)
    }

    async fn create_dir(&self, path: &Path) -> StorageResult<bool> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        match nodes.get(&key) {
            Some(Node {
                content: Content::Directory,
                ..
            }) => return Ok(false),
            Some(_) => return Err(StorageError::AlreadyExists(key.display().to_string())),
            None => {}
        }
        Self::check_parent(&nodes, &key)?;
        nodes.insert(key, Node::directory());
        Ok(true)
    }

    async fn set_readonly(&self, path: &Path, readonly: bool) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = nodes.get_mut(&key).ok_or_else(|| StorageError::not_found(&key))?;
        node.readonly = readonly;
        Ok(())
    }

    async fn set_modified(&self, path: &Path, modified: SystemTime) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = nodes.get_mut(&key).ok_or_else(|| StorageError::not_found(&key))?;
        node.modified = modified;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> StorageResult<()> {
        let key = Self::key(path)?;
        if key.as_os_str().is_empty() {
            return Err(StorageError::invalid_path(path));
        }

        let mut nodes = self.write_nodes()?;
        match nodes.get(&key) {
            None => return Err(StorageError::not_found(&key)),
            Some(Node {
                content: Content::Directory,
                ..
            }) => {
                let has_children = nodes.keys().any(|k| k.parent() == Some(key.as_path()));
                if has_children {
                    return Err(StorageError::DirectoryNotEmpty(key.display().to_string()));
                }
            }
            Some(_) => {}
        }
        nodes.remove(&key);
        Ok(())
    }

    async fn list(&self, path: &Path) -> StorageResult<Vec<DirEntry>> {
        let key = Self::key(path)?;
        let nodes = self.read_nodes()?;
        match nodes.get(&key).map(|n| &n.content) {
            Some(Content::Directory) => {}
            Some(Content::File(_)) => {
                return Err(StorageError::NotADirectory(key.display().to_string()))
            }
            None => return Err(StorageError::not_found(&key)),
        }

        let entries = nodes
            .iter()
            .filter(|(k, _)| k.parent() == Some(key.as_path()))
            .filter_map(|(k, node)| {
                let name = k.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    kind: node.meta().kind,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn get_attr(&self, path: &Path, name: &str) -> StorageResult<Option<Vec<u8>>> {
        let key = Self::key(path)?;
        let nodes = self.read_nodes()?;
        let node = nodes.get(&key).ok_or_else(|| StorageError::not_found(&key))?;
        Ok(node.attrs.get(name).cloned())
    }

    async fn set_attr(&self, path: &Path, name: &str, value: &[u8]) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = nodes.get_mut(&key).ok_or_else(|| StorageError::not_found(&key))?;
        node.attrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove_attr(&self, path: &Path, name: &str) -> StorageResult<()> {
        let key = Self::key(path)?;
        let mut nodes = self.write_nodes()?;
        let node = nodes.get_mut(&key).ok_or_else(|| StorageError::not_found(&key))?;
        node.attrs.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_and_read() {
        let fs = MemoryBackend::new();
        assert!(fs.create_file(Path::new("a.txt")).await.unwrap());
        fs.write_at(Path::new("a.txt"), 0, b"hello world").await.unwrap();

        let data = fs.read_at(Path::new("a.txt"), 6, 100).await.unwrap();
        assert_eq!(data, b"world");

        let meta = fs.stat(Path::new("a.txt")).await.unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, 11);
    }

    #[tokio::test]
    async fn test_read_past_end_is_empty() {
        let fs = MemoryBackend::new();
        fs.create_file(Path::new("a.txt")).await.unwrap();
        fs.write_at(Path::new("a.txt"), 0, b"abc").await.unwrap();
        assert!(fs.read_at(Path::new("a.txt"), 10, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_file_is_idempotent() {
        let fs = MemoryBackend::new();
        assert!(fs.create_file(Path::new("a.txt")).await.unwrap());
        fs.write_at(Path::new("a.txt"), 0, b"keep").await.unwrap();
        assert!(!fs.create_file(Path::new("a.txt")).await.unwrap());
        assert_eq!(fs.read_at(Path::new("a.txt"), 0, 16).await.unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_create_requires_parent() {
        let fs = MemoryBackend::new();
        let err = fs.create_file(Path::new("missing/a.txt")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_readonly_rejects_writes() {
        let fs = MemoryBackend::new();
        fs.create_file(Path::new("a.txt")).await.unwrap();
        fs.set_readonly(Path::new("a.txt"), true).await.unwrap();

        let err = fs.write_at(Path::new("a.txt"), 0, b"x").await.unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly(_)));
        let err = fs.truncate(Path::new("a.txt"), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::ReadOnly(_)));

        // Unlinking is a directory operation and stays allowed.
        fs.remove(Path::new("a.txt")).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_direct() {
        let fs = MemoryBackend::new();
        fs.create_dir(Path::new("d")).await.unwrap();
        fs.create_file(Path::new("d/b")).await.unwrap();
        fs.create_file(Path::new("d/a")).await.unwrap();
        fs.create_dir(Path::new("d/sub")).await.unwrap();
        fs.create_file(Path::new("d/sub/deep")).await.unwrap();

        let names: Vec<_> = fs
            .list(Path::new("d"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "sub"]);
    }

    #[tokio::test]
    async fn test_remove_non_empty_directory_fails() {
        let fs = MemoryBackend::new();
        fs.create_dir(Path::new("d")).await.unwrap();
        fs.create_file(Path::new("d/a")).await.unwrap();

        let err = fs.remove(Path::new("d")).await.unwrap_err();
        assert!(matches!(err, StorageError::DirectoryNotEmpty(_)));
    }

    #[tokio::test]
    async fn test_attrs() {
        let fs = MemoryBackend::new();
        fs.create_file(Path::new("a.txt")).await.unwrap();
        assert_eq!(fs.get_attr(Path::new("a.txt"), "k").await.unwrap(), None);

        fs.set_attr(Path::new("a.txt"), "k", b"v1").await.unwrap();
        fs.set_attr(Path::new("a.txt"), "k", b"v2").await.unwrap();
        assert_eq!(
            fs.get_attr(Path::new("a.txt"), "k").await.unwrap(),
            Some(b"v2".to_vec())
        );

        fs.remove_attr(Path::new("a.txt"), "k").await.unwrap();
        assert_eq!(fs.get_attr(Path::new("a.txt"), "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let fs = MemoryBackend::new();
        let err = fs.stat(Path::new("../outside")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }
}
