//! bkpctl - control tool for bkpfs versioned files.
//!
//! Lists, deletes, views and restores the snapshots kept for a file, and
//! can store new content through a write session.

mod commands;

use anyhow::Context;
use bkpfs_core::{BkpConfig, VersionedFs};
use bkpfs_storage::LocalBackend;
use clap::{ArgGroup, Parser};
use commands::{init_logging, resolve_target, run_action, Action};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "bkpctl")]
#[command(author, version, about = "Manage backup versions of a file", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["list", "delete", "view", "restore", "write", "verify"])
))]
struct Cli {
    /// List retained versions
    #[arg(short = 'l', long)]
    list: bool,

    /// Delete versions: newest, oldest or all
    #[arg(short = 'd', long, value_name = "ARG")]
    delete: Option<String>,

    /// Print a version to stdout: newest, oldest or N
    #[arg(short = 'v', long, value_name = "ARG")]
    view: Option<String>,

    /// Restore a version next to FILE: newest, oldest or N
    #[arg(short = 'r', long, value_name = "ARG")]
    restore: Option<String>,

    /// Replace FILE with stdin through a write session
    #[arg(short = 'w', long)]
    write: bool,

    /// Check that every retained version is present
    #[arg(long)]
    verify: bool,

    /// Maximum number of versions retained per file
    #[arg(long, value_name = "N")]
    maxver: Option<u32>,

    /// Extra config file, applied after the standard sources
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend root (defaults to the directory of FILE)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// The file to operate on
    file: PathBuf,
}

impl Cli {
    fn action(&self) -> Action {
        if let Some(arg) = &self.delete {
            Action::Delete(arg.clone())
        } else if let Some(arg) = &self.view {
            Action::View(arg.clone())
        } else if let Some(arg) = &self.restore {
            Action::Restore(arg.clone())
        } else if self.write {
            Action::Write
        } else if self.verify {
            Action::Verify
        } else {
            Action::List
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let action = cli.action();

    let target = resolve_target(&cli.file, cli.root.as_deref(), action == Action::Write)?;

    let (mut config, sources) = BkpConfig::load(Some(&target.root))
        .await
        .context("Failed to load configuration")?;
    if let Some(path) = &cli.config {
        let extra = BkpConfig::load_file(path)
            .await
            .with_context(|| format!("Failed to load {}", path.display()))?;
        config = config.merge(extra);
    }
    if let Some(maxver) = cli.maxver {
        config.maxver = Some(maxver);
    }

    init_logging(cli.verbose, config.log_level());
    debug!(
        root = %target.root.display(),
        file = %target.file.display(),
        sources = ?sources,
        maxver = config.maxver(),
        "Resolved target"
    );

    let backend = Arc::new(LocalBackend::with_attr_dir(&target.root, config.attr_dir()));
    let fs = VersionedFs::new(backend, config).context("Invalid configuration")?;

    let ok = run_action(&fs, &target.file, &action, cli.json).await?;
    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
