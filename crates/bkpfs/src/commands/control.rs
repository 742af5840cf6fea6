//! Versioning commands: list, delete, view, restore, write and verify.

use anyhow::{Context, Result};
use bkpfs_core::{
    ControlRequest, ControlResponse, DeleteReport, Materialized, Operation, VerifyReport,
    VersionListing, VersionedFs,
};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Action selected on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    List,
    Delete(String),
    View(String),
    Restore(String),
    Write,
    Verify,
}

impl Action {
    /// The control request this action sends, if any.
    pub fn request(&self, file: &Path) -> Result<Option<ControlRequest>> {
        let (op, arg) = match self {
            Action::List => (Operation::List, None),
            Action::Delete(arg) => (Operation::Delete, Some(arg.as_str())),
            Action::View(arg) => (Operation::View, Some(arg.as_str())),
            Action::Restore(arg) => (Operation::Restore, Some(arg.as_str())),
            Action::Write | Action::Verify => return Ok(None),
        };
        let request = ControlRequest::parse(op, file, arg)
            .with_context(|| format!("Invalid {op} argument"))?;
        Ok(Some(request))
    }
}

/// Run an action. Returns `false` when verification found problems.
pub async fn run_action(
    fs: &VersionedFs,
    file: &Path,
    action: &Action,
    json: bool,
) -> Result<bool> {
    if let Some(request) = action.request(file)? {
        let mut stdout = tokio::io::stdout();
        let response = fs
            .execute(&request, &mut stdout)
            .await
            .with_context(|| format!("{} failed for {}", request.op, file.display()))?;
        print_response(&response, json)?;
        return Ok(true);
    }

    match action {
        Action::Write => write_stdin(fs, file).await.map(|_| true),
        Action::Verify => {
            let report = fs
                .verify(file)
                .await
                .with_context(|| format!("verify failed for {}", file.display()))?;
            print_verify(&report, json)?;
            Ok(report.is_consistent())
        }
        _ => Ok(true),
    }
}

async fn write_stdin(fs: &VersionedFs, file: &Path) -> Result<()> {
    let mut data = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut data)
        .await
        .context("Cannot read stdin")?;
    let range = fs
        .write_file(file, &data)
        .await
        .with_context(|| format!("Cannot write {}", file.display()))?;
    match range {
        Some(range) => println!(
            "Stored version {} of {} ({} bytes)",
            range.curr_version - 1,
            file.display(),
            data.len()
        ),
        None => println!(
            "Wrote {} bytes to {} (snapshots disabled)",
            data.len(),
            file.display()
        ),
    }
    Ok(())
}

fn print_response(response: &ControlResponse, json: bool) -> Result<()> {
    if json {
        if !matches!(response, ControlResponse::View { .. }) {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        return Ok(());
    }
    match response {
        ControlResponse::List(listing) => print_listing(listing),
        ControlResponse::Delete(report) => print_delete(report),
        ControlResponse::View { .. } => {}
        ControlResponse::Restore(materialized) => print_restore(materialized),
    }
    Ok(())
}

fn print_listing(listing: &VersionListing) {
    if listing.old_version == listing.curr_version {
        println!("No backups of {}", listing.filename);
        return;
    }
    println!("Backups of {}:", listing.filename);
    for ordinal in listing.ordinals() {
        println!("  {ordinal}\t.{}.{ordinal}", listing.filename);
    }
}

fn print_delete(report: &DeleteReport) {
    if report.deleted.is_empty() && report.missing.is_empty() {
        println!("Nothing to delete");
    } else {
        let count = report.deleted.len() + report.missing.len();
        println!("Deleted {count} version(s)");
    }
    if !report.missing.is_empty() {
        eprintln!("Warning: versions {:?} were already missing", report.missing);
    }
    println!(
        "Retained window: [{}, {})",
        report.range.old_version, report.range.curr_version
    );
}

fn print_restore(materialized: &Materialized) {
    println!(
        "Restored version {} to {} ({} bytes)",
        materialized.ordinal,
        materialized.path.display(),
        materialized.size
    );
}

fn print_verify(report: &VerifyReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "Window: [{}, {})",
        report.range.old_version, report.range.curr_version
    );
    if report.is_consistent() {
        println!("All retained versions present");
    }
    if !report.missing.is_empty() {
        println!("Missing: {:?}", report.missing);
    }
    if !report.orphaned.is_empty() {
        println!("Orphaned: {:?}", report.orphaned);
    }
    Ok(())
}
