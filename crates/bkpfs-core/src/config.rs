//! Configuration for the versioning layer.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/bkpfs/config.json`
//! 2. Environment variable: `BKPFS_CONFIG_CONTENT`
//! 3. Project config: `bkpfs.json` in the mount root
//! 4. Environment override: `BKPFS_MAXVER`
//!
//! Command-line flags are merged on top by the caller.

use crate::error::{BkpResult, ConfigError};
use bkpfs_storage::{local::DEFAULT_ATTR_DIR, DEFAULT_CHUNK_SIZE};
use bkpfs_util::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of snapshots retained per file when nothing else is configured.
pub const DEFAULT_MAXVER: u32 = 10;

/// Project-level config file name.
pub const PROJECT_CONFIG_FILE: &str = "bkpfs.json";

/// Layered configuration. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BkpConfig {
    /// Maximum number of snapshots retained per tracked file. `0` disables
    /// snapshotting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxver: Option<u32>,

    /// Chunk size used when copying content, in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Name of the per-directory attribute record directory kept by the local
    /// backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr_dir: Option<String>,

    /// Log level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl BkpConfig {
    /// Config with only `maxver` set.
    pub fn with_maxver(maxver: u32) -> Self {
        Self {
            maxver: Some(maxver),
            ..Self::default()
        }
    }

    pub fn maxver(&self) -> u32 {
        self.maxver.unwrap_or(DEFAULT_MAXVER)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn attr_dir(&self) -> &str {
        self.attr_dir.as_deref().unwrap_or(DEFAULT_ATTR_DIR)
    }

    /// Configured log level, if any and valid.
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Merge another config into this one. Set fields in `other` win.
    pub fn merge(mut self, other: Self) -> Self {
        if other.maxver.is_some() {
            self.maxver = other.maxver;
        }
        if other.chunk_size.is_some() {
            self.chunk_size = other.chunk_size;
        }
        if other.attr_dir.is_some() {
            self.attr_dir = other.attr_dir;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == Some(0) {
            return Err(ConfigError::Validation {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if let Some(name) = &self.attr_dir {
            if !name.ends_with(".bkp") || name.contains('/') || name.starts_with('.') {
                return Err(ConfigError::Validation {
                    message: format!(
                        "attr_dir '{name}' must be a plain directory name ending in .bkp"
                    ),
                });
            }
        }
        if let Some(level) = &self.log_level {
            if LogLevel::parse(level).is_none() {
                return Err(ConfigError::Validation {
                    message: format!("unknown log_level '{level}'"),
                });
            }
        }
        Ok(())
    }

    /// Load configuration from all sources.
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> BkpResult<(Self, Vec<PathBuf>)> {
        let global = bkpfs_util::path::config_dir();
        Self::load_from(global.as_deref(), project_dir, |key| std::env::var(key).ok()).await
    }

    /// Load configuration with an explicit global directory and environment.
    pub async fn load_from(
        global_dir: Option<&Path>,
        project_dir: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> BkpResult<(Self, Vec<PathBuf>)> {
        let mut config = Self::default();
        let mut sources = Vec::new();

        // 1. Global config
        if let Some(dir) = global_dir {
            let path = dir.join("config.json");
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        // 2. Inline config from the environment
        if let Some(content) = env("BKPFS_CONFIG_CONTENT") {
            config = config.merge(Self::parse(&content, "<env>")?);
        }

        // 3. Project config
        if let Some(dir) = project_dir {
            let path = dir.join(PROJECT_CONFIG_FILE);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                config = config.merge(Self::load_file(&path).await?);
                sources.push(path);
            }
        }

        // 4. Single-value override
        if let Some(raw) = env("BKPFS_MAXVER") {
            let maxver = raw.trim().parse::<u32>().map_err(|_| ConfigError::Validation {
                message: format!("BKPFS_MAXVER must be a non-negative integer, got '{raw}'"),
            })?;
            config.maxver = Some(maxver);
        }

        config.validate()?;
        Ok((config, sources))
    }

    /// Load a single config file.
    pub async fn load_file(path: &Path) -> BkpResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> BkpResult<Self> {
        serde_json::from_str(content).map_err(|e| {
            ConfigError::InvalidJson {
                path: origin.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}
