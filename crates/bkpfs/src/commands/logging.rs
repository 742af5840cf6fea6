//! Logging initialization.

use bkpfs_util::log::{self, LogConfig, LogLevel};
use std::io::IsTerminal;

/// Initialize logging to stderr.
///
/// `--verbose` wins over a level from configuration. `RUST_LOG` overrides
/// both.
pub fn init_logging(verbose: bool, configured: Option<LogLevel>) {
    let base = if verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: configured.unwrap_or_default(),
            ..LogConfig::default()
        }
    };
    let config = LogConfig {
        ansi: std::io::stderr().is_terminal(),
        ..base
    };
    if !log::init(config) {
        eprintln!("Warning: logging was already initialized");
    }
}
