//! Resolution of the FILE argument against the backend root.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// A tracked file located inside a backend root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Absolute backend root.
    pub root: PathBuf,
    /// Path of the file relative to `root`.
    pub file: PathBuf,
}

/// Locate `file` under `root`, defaulting the root to the file's directory.
///
/// The file must already exist unless `allow_missing` is set; its directory
/// must always exist.
pub fn resolve_target(file: &Path, root: Option<&Path>, allow_missing: bool) -> Result<Target> {
    let cwd = std::env::current_dir().context("Cannot determine current directory")?;
    let absolute = cwd.join(file);
    let name = absolute
        .file_name()
        .with_context(|| format!("{} does not name a file", file.display()))?
        .to_owned();
    let parent = absolute.parent().unwrap_or(Path::new("/"));
    let parent = parent
        .canonicalize()
        .with_context(|| format!("Cannot open directory {}", parent.display()))?;
    let absolute = parent.join(name);

    if absolute.is_dir() {
        bail!("{} is a directory", file.display());
    }
    if !allow_missing && !absolute.is_file() {
        bail!("Cannot open file {}", file.display());
    }

    let root = match root {
        Some(root) => cwd
            .join(root)
            .canonicalize()
            .with_context(|| format!("Cannot open root {}", root.display()))?,
        None => parent,
    };
    let relative = absolute
        .strip_prefix(&root)
        .with_context(|| format!("{} is not under {}", file.display(), root.display()))?
        .to_path_buf();

    Ok(Target {
        root,
        file: relative,
    })
}
