//! Storage-boundary names derived from a tracked file.
//!
//! For a tracked file `name` in directory `dir`:
//!
//! | node              | location                       |
//! |-------------------|--------------------------------|
//! | backup container  | `dir/.name.bkp`                |
//! | snapshot N        | `dir/.name.bkp/.name.N`        |
//! | view of N         | `dir/name.N.vue`               |
//! | restore of N      | `dir/.name.N.swp`              |
//!
//! These strings are the on-disk format and must stay exact.

use crate::error::{BkpError, BkpResult};
use crate::filter;
use bkpfs_util::path::{normalize_relative, split_name};
use std::fmt;
use std::path::{Path, PathBuf};

/// A regular file whose writes are versioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackedFile {
    path: PathBuf,
    parent: PathBuf,
    name: String,
}

impl TrackedFile {
    /// Resolve a user-supplied path to a tracked file.
    pub fn new(path: impl AsRef<Path>) -> BkpResult<Self> {
        let raw = path.as_ref();
        let path = normalize_relative(raw).ok_or_else(|| {
            BkpError::invalid_argument(format!("path escapes root: {}", raw.display()))
        })?;
        let (parent, name) = split_name(&path).ok_or_else(|| {
            BkpError::invalid_argument(format!("not a file path: {}", raw.display()))
        })?;
        if filter::is_hidden(&name) {
            return Err(BkpError::invalid_argument(format!(
                "{name} is a backup container, not a tracked file"
            )));
        }
        Ok(Self { path, parent, name })
    }

    /// Backend path of the tracked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the tracked file.
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container_name(&self) -> String {
        format!(".{}.bkp", self.name)
    }

    pub fn snapshot_name(&self, ordinal: u64) -> String {
        format!(".{}.{}", self.name, ordinal)
    }

    pub fn view_name(&self, ordinal: u64) -> String {
        format!("{}.{}.vue", self.name, ordinal)
    }

    pub fn restore_name(&self, ordinal: u64) -> String {
        format!(".{}.{}.swp", self.name, ordinal)
    }

    pub fn container_path(&self) -> PathBuf {
        self.parent.join(self.container_name())
    }

    pub fn snapshot_path(&self, ordinal: u64) -> PathBuf {
        self.container_path().join(self.snapshot_name(ordinal))
    }

    pub fn view_path(&self, ordinal: u64) -> PathBuf {
        self.parent.join(self.view_name(ordinal))
    }

    pub fn restore_path(&self, ordinal: u64) -> PathBuf {
        self.parent.join(self.restore_name(ordinal))
    }

    /// Parse a container entry name back into its ordinal.
    ///
    /// Only canonical decimal ordinals are accepted, so stray files in the
    /// container are ignored.
    pub fn parse_snapshot_name(&self, entry: &str) -> Option<u64> {
        let digits = entry
            .strip_prefix('.')?
            .strip_prefix(self.name.as_str())?
            .strip_prefix('.')?;
        if digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || (digits.len() > 1 && digits.starts_with('0'))
        {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for TrackedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
