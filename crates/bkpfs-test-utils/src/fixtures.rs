//! Test fixtures for creating reproducible directory trees.

use bkpfs_storage::LocalBackend;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary directory tree with configurable content.
///
/// The directory is removed when the built tree is dropped.
///
/// # Example
///
/// ```rust
/// use bkpfs_test_utils::fixtures::TestTree;
///
/// let tree = TestTree::new()
///     .with_file("docs/notes.txt", "first draft")
///     .with_dir("empty")
///     .build();
///
/// assert!(tree.path().join("docs/notes.txt").exists());
/// ```
pub struct TestTree {
    temp_dir: TempDir,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: Vec<PathBuf>,
}

impl TestTree {
    /// Create a new tree builder.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a file. Parent directories are created automatically.
    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.as_ref().to_vec());
        self
    }

    /// Add an empty directory.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a project config file at the root.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("bkpfs.json", config)
    }

    /// Create all files and directories.
    pub fn build(self) -> BuiltTestTree {
        let root = self.temp_dir.path();

        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent).unwrap_or_else(|e| {
                    panic!(
                        "Failed to create parent directory for {}: {}",
                        full_path.display(),
                        e
                    )
                });
            }
            fs::write(&full_path, contents)
                .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
        }

        BuiltTestTree {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A tree whose files exist on disk.
pub struct BuiltTestTree {
    temp_dir: TempDir,
}

impl BuiltTestTree {
    /// Root of the tree.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A local backend rooted at the tree.
    pub fn backend(&self) -> Arc<LocalBackend> {
        Arc::new(LocalBackend::new(self.path()))
    }

    /// Read a file relative to the root.
    pub fn read(&self, path: impl AsRef<Path>) -> Vec<u8> {
        let full_path = self.path().join(path);
        fs::read(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    /// Overwrite a file relative to the root, bypassing the versioning layer.
    pub fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let full_path = self.path().join(path);
        fs::write(&full_path, contents)
            .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
    }

    /// Whether a path exists relative to the root.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path).exists()
    }

    /// Names in a directory, sorted.
    pub fn entries(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let full_path = self.path().join(dir);
        let mut names: Vec<String> = fs::read_dir(&full_path)
            .unwrap_or_else(|e| panic!("Failed to list {}: {}", full_path.display(), e))
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
