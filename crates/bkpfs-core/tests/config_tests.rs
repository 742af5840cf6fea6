//! Configuration integration tests.
//!
//! Tests for config loading and layering, and for how the loaded config
//! drives a real tree.

use bkpfs_core::{BkpConfig, BkpError, ConfigError, VersionedFs};
use bkpfs_storage::LocalBackend;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn no_env(_: &str) -> Option<String> {
    None
}

/// Test that config loads from the project directory.
#[tokio::test]
async fn test_load_project_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        temp.path().join("bkpfs.json"),
        r#"{ "maxver": 3, "chunk_size": 4096 }"#,
    )
    .expect("Failed to write config");

    let (config, sources) = BkpConfig::load_from(None, Some(temp.path()), no_env)
        .await
        .expect("Failed to load config");

    assert_eq!(config.maxver(), 3);
    assert_eq!(config.chunk_size(), 4096);
    assert_eq!(sources, vec![temp.path().join("bkpfs.json")]);
}

/// Test default config when no file exists.
#[tokio::test]
async fn test_default_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let (config, sources) = BkpConfig::load_from(None, Some(temp.path()), no_env)
        .await
        .expect("Failed to load config");

    assert_eq!(config, BkpConfig::default());
    assert_eq!(config.maxver(), bkpfs_core::config::DEFAULT_MAXVER);
    assert!(sources.is_empty());
}

/// Test that the project file overrides the global one field by field.
#[tokio::test]
async fn test_project_overrides_global() {
    let global = TempDir::new().expect("Failed to create temp dir");
    let project = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        global.path().join("config.json"),
        r#"{ "maxver": 7, "log_level": "debug" }"#,
    )
    .expect("Failed to write config");
    fs::write(project.path().join("bkpfs.json"), r#"{ "maxver": 2 }"#)
        .expect("Failed to write config");

    let (config, sources) =
        BkpConfig::load_from(Some(global.path()), Some(project.path()), no_env)
            .await
            .expect("Failed to load config");

    assert_eq!(config.maxver(), 2);
    assert_eq!(config.log_level.as_deref(), Some("debug"));
    assert_eq!(sources.len(), 2);
}

/// Test that a malformed project file is reported with its path.
#[tokio::test]
async fn test_invalid_json_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("bkpfs.json"), "{ maxver: ").expect("Failed to write config");

    let err = BkpConfig::load_from(None, Some(temp.path()), no_env)
        .await
        .unwrap_err();

    match err {
        BkpError::Config(ConfigError::InvalidJson { path, .. }) => {
            assert!(path.ends_with("bkpfs.json"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// Test that a configured record directory is used by the local backend.
#[tokio::test]
async fn test_attr_dir_used_by_tree() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        temp.path().join("bkpfs.json"),
        r#"{ "maxver": 1, "attr_dir": "records.bkp" }"#,
    )
    .expect("Failed to write config");

    let (config, _) = BkpConfig::load_from(None, Some(temp.path()), no_env)
        .await
        .expect("Failed to load config");
    let backend = Arc::new(LocalBackend::with_attr_dir(temp.path(), config.attr_dir()));
    let fs = VersionedFs::new(backend, config).expect("Failed to build layer");

    fs.write_file("a.txt", b"v1").await.unwrap();
    fs.write_file("a.txt", b"v2").await.unwrap();

    assert!(temp.path().join("records.bkp/a.txt.json").is_file());
    let listing = fs.list("a.txt").await.unwrap();
    assert_eq!((listing.old_version, listing.curr_version), (1, 2));

    let names: Vec<String> = fs
        .read_dir("")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["a.txt", "bkpfs.json"]);
}
