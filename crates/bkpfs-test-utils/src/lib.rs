//! Testing utilities, fixtures, and mocks for bkpfs.
//!
//! - **Fixtures**: temporary directory trees served by a [`LocalBackend`]
//! - **Mocks**: a backend wrapper that injects faults or cancellations
//! - **Assertions**: helpers for checking backup trees on disk
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use bkpfs_test_utils::{fixtures::TestTree, mocks::{FaultyBackend, FaultOp}};
//!
//! #[tokio::test]
//! async fn test_copy_failure() {
//!     let tree = TestTree::new().with_file("a.txt", "v1").build();
//!     let faulty = FaultyBackend::new(tree.backend());
//!     faulty.fail_on(FaultOp::WriteAt, ".a.txt.bkp/");
//!     // Hand `faulty` to the engine under test...
//! }
//! ```
//!
//! [`LocalBackend`]: bkpfs_storage::LocalBackend

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{BuiltTestTree, TestTree};
pub use mocks::{FaultOp, FaultyBackend};
