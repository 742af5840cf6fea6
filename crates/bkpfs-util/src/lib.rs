//! Shared utilities for bkpfs.
//!
//! This crate provides common utilities used across the bkpfs workspace:
//! - Logging setup with tracing
//! - Path utilities for backend-relative paths and config locations

pub mod log;
pub mod path;

pub use log::{LogConfig, LogLevel};
