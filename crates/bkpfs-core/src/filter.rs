//! Directory listing filter.
//!
//! Backup containers are kept beside the files they shadow. Any entry whose
//! name ends in `.bkp` is dropped from listings, which also hides the local
//! backend's attribute record directories. View and restore nodes stay visible.

use bkpfs_storage::DirEntry;

/// Suffix marking entries that listings never show.
pub const HIDDEN_SUFFIX: &str = ".bkp";

/// Whether a directory entry name is hidden from listings.
pub fn is_hidden(name: &str) -> bool {
    name.ends_with(HIDDEN_SUFFIX)
}

/// Drop hidden entries, keeping the order of the rest.
pub fn visible(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries.into_iter().filter(|e| !is_hidden(&e.name)).collect()
}
