//! Assertion helpers for backup trees on disk.

use std::path::Path;

/// Assert that a file's content equals `expected` exactly.
pub fn assert_file_bytes(path: &Path, expected: &[u8]) {
    let content = std::fs::read(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    assert_eq!(
        content,
        expected,
        "File {} content does not match.\nExpected: {:?}\nActual: {:?}",
        path.display(),
        String::from_utf8_lossy(expected),
        String::from_utf8_lossy(&content)
    );
}

/// Assert that the snapshots present in a backup container are exactly
/// `ordinals`, for the tracked file `name`.
pub fn assert_snapshots(container: &Path, name: &str, ordinals: &[u64]) {
    let mut found: Vec<u64> = match std::fs::read_dir(container) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let entry_name = entry.file_name().to_string_lossy().into_owned();
                entry_name
                    .strip_prefix(&format!(".{name}."))
                    .and_then(|n| n.parse().ok())
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    found.sort_unstable();

    assert_eq!(
        found,
        ordinals,
        "Snapshots in {} do not match",
        container.display()
    );
}

/// Assert that a path does not exist.
pub fn assert_not_exists(path: &Path) {
    assert!(
        !path.exists(),
        "Expected {} to not exist",
        path.display()
    );
}
