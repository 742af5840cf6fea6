//! Per-file version ledger.
//!
//! Each tracked file carries one attribute record holding its retained
//! window `[old_version, curr_version)`. Both fields are written together in
//! a single attribute write, and every read-modify-write cycle runs under
//! the file's lock in [`crate::lock::FileLocks`].

use crate::error::{BkpError, BkpResult};
use crate::naming::TrackedFile;
use bkpfs_storage::Backend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Attribute name holding the version record.
pub const LEDGER_ATTR: &str = "user.bkpfs.versions";

/// Retained version window of a tracked file.
///
/// `old_version` is the oldest retained ordinal, `curr_version` the next
/// ordinal to assign. Retained ordinals are `old_version..curr_version`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    pub old_version: u64,
    pub curr_version: u64,
}

impl VersionRange {
    /// Build a range, rejecting `old > curr`.
    pub fn new(old_version: u64, curr_version: u64) -> BkpResult<Self> {
        let range = Self {
            old_version,
            curr_version,
        };
        range.check()?;
        Ok(range)
    }

    fn check(&self) -> BkpResult<()> {
        if self.old_version > self.curr_version {
            return Err(BkpError::Corrupted(format!(
                "old_version {} exceeds curr_version {}",
                self.old_version, self.curr_version
            )));
        }
        Ok(())
    }

    /// Number of retained ordinals.
    pub fn len(&self) -> u64 {
        self.curr_version.saturating_sub(self.old_version)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, ordinal: u64) -> bool {
        (self.old_version..self.curr_version).contains(&ordinal)
    }

    pub fn oldest(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.old_version)
    }

    pub fn newest(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.curr_version - 1)
    }

    /// Retained ordinals in ascending order.
    pub fn ordinals(&self) -> std::ops::Range<u64> {
        self.old_version..self.curr_version
    }
}

/// Reads and writes version records through the backend's attributes.
#[derive(Clone)]
pub struct Ledger {
    backend: Arc<dyn Backend>,
}

impl Ledger {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Stored range, or `{0, 0}` if the file has no record yet.
    ///
    /// Fails with `NotFound` if the tracked file itself is absent.
    pub async fn get(&self, file: &TrackedFile) -> BkpResult<VersionRange> {
        let Some(raw) = self.backend.get_attr(file.path(), LEDGER_ATTR).await? else {
            return Ok(VersionRange::default());
        };
        let range: VersionRange = serde_json::from_slice(&raw)
            .map_err(|e| BkpError::Corrupted(format!("{file}: {e}")))?;
        range
            .check()
            .map_err(|e| BkpError::Corrupted(format!("{file}: {e}")))?;
        Ok(range)
    }

    /// Persist both fields in one record write.
    pub async fn set(&self, file: &TrackedFile, range: VersionRange) -> BkpResult<()> {
        range.check()?;
        let raw = serde_json::to_vec(&range)
            .map_err(|e| BkpError::Corrupted(format!("{file}: {e}")))?;
        self.backend.set_attr(file.path(), LEDGER_ATTR, &raw).await?;
        debug!(
            file = %file,
            old = range.old_version,
            curr = range.curr_version,
            "Ledger updated"
        );
        Ok(())
    }

    /// Read, transform and write back the record.
    ///
    /// Callers must hold the file's lock.
    pub async fn update<F>(&self, file: &TrackedFile, f: F) -> BkpResult<VersionRange>
    where
        F: FnOnce(VersionRange) -> BkpResult<VersionRange> + Send,
    {
        let range = f(self.get(file).await?)?;
        self.set(file, range).await?;
        Ok(range)
    }

    /// Drop the record. A missing file or record is not an error.
    pub async fn clear(&self, file: &TrackedFile) -> BkpResult<()> {
        match self.backend.remove_attr(file.path(), LEDGER_ATTR).await {
            Err(e) if !e.is_not_found() => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bkpfs_storage::MemoryBackend;
    use std::path::Path;

    async fn setup() -> (Ledger, Arc<MemoryBackend>, TrackedFile) {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_file(Path::new("a.txt")).await.unwrap();
        let ledger = Ledger::new(backend.clone());
        (ledger, backend, TrackedFile::new("a.txt").unwrap())
    }

    #[test]
    fn test_range_window() {
        let range = VersionRange::new(2, 4).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range.oldest(), Some(2));
        assert_eq!(range.newest(), Some(3));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(!range.contains(1));

        let empty = VersionRange::new(4, 4).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.oldest(), None);
        assert_eq!(empty.newest(), None);

        assert!(matches!(
            VersionRange::new(5, 4),
            Err(BkpError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_record_is_empty_window() {
        let (ledger, _, file) = setup().await;
        assert_eq!(ledger.get(&file).await.unwrap(), VersionRange::default());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (ledger, _, file) = setup().await;
        let range = VersionRange::new(1, 3).unwrap();
        ledger.set(&file, range).await.unwrap();
        assert_eq!(ledger.get(&file).await.unwrap(), range);
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let (ledger, _, _) = setup().await;
        let other = TrackedFile::new("b.txt").unwrap();
        assert!(ledger.get(&other).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_corrupted_record() {
        let (ledger, backend, file) = setup().await;
        backend
            .set_attr(
                file.path(),
                LEDGER_ATTR,
                br#"{"old_version":5,"curr_version":1}"#,
            )
            .await
            .unwrap();
        assert!(matches!(
            ledger.get(&file).await,
            Err(BkpError::Corrupted(_))
        ));

        backend
            .set_attr(file.path(), LEDGER_ATTR, b"garbage")
            .await
            .unwrap();
        assert!(matches!(
            ledger.get(&file).await,
            Err(BkpError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_clear() {
        let (ledger, _, file) = setup().await;
        let range = ledger
            .update(&file, |mut r| {
                r.curr_version += 2;
                Ok(r)
            })
            .await
            .unwrap();
        assert_eq!(range, VersionRange::new(0, 2).unwrap());

        ledger.clear(&file).await.unwrap();
        assert_eq!(ledger.get(&file).await.unwrap(), VersionRange::default());
        ledger.clear(&TrackedFile::new("gone.txt").unwrap()).await.unwrap();
    }
}
