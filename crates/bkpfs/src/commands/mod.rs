//! Command handlers for the bkpctl CLI.

pub mod control;
pub mod logging;
pub mod target;

pub use control::*;
pub use logging::*;
pub use target::*;
