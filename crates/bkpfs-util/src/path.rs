//! Path utilities.
//!
//! Backend paths are always relative to a backend root. These helpers turn
//! user-supplied paths into that form and locate bkpfs configuration.

use std::path::{Component, Path, PathBuf};

/// Get the bkpfs configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/bkpfs` if set
/// - `~/.config/bkpfs` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bkpfs"))
}

/// Normalize a backend path: strip leading `/`, drop `.` and resolve `..`.
///
/// Returns `None` if the path would climb above the root.
pub fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                if !result.pop() {
                    return None;
                }
            }
            Component::Normal(s) => result.push(s),
        }
    }
    Some(result)
}

/// Split a backend path into its parent directory and final name.
///
/// The parent of a top-level entry is the empty path (the root).
pub fn split_name(path: &Path) -> Option<(PathBuf, String)> {
    let name = path.file_name()?.to_str()?.to_string();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Some((parent, name))
}
