//! Core versioning engine for bkpfs.
//!
//! Every close of a write session that changed a regular file stores a copy
//! of the file's full content as a numbered snapshot inside a hidden backup
//! container next to the file. A bounded number of snapshots is retained per
//! file, oldest evicted first. Control requests list the retained window,
//! delete the oldest, newest or all snapshots, stream a version out, or
//! restore it as a hidden sibling file.
//!
//! The entry point is [`VersionedFs`], built over any
//! [`bkpfs_storage::Backend`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod layer;
pub mod ledger;
pub mod lock;
pub mod naming;
pub mod protocol;
pub mod retrieval;
pub mod store;
pub mod version;
pub mod writer;

pub use config::BkpConfig;
pub use dispatcher::{DeleteReport, Dispatcher, VerifyReport, VersionListing};
pub use error::{BkpError, BkpResult, ConfigError};
pub use layer::{OpenMode, VersionedFs, WriteSession};
pub use ledger::{Ledger, VersionRange};
pub use lock::FileLocks;
pub use naming::TrackedFile;
pub use protocol::{ControlRequest, ControlResponse};
pub use retrieval::{Materialized, RetrievalEngine, RetrievalMode};
pub use store::{BackupStore, SnapshotNode};
pub use version::{DeleteSpec, Operation, VersionArg, VersionSpec};
pub use writer::SnapshotWriter;
