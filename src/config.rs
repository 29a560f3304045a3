//! Configuration management for taskflow.
//!
//! This module handles the `.taskflow/config.yaml` file which stores
//! per-project engine settings. Every field is optional in the file.

use crate::error::Result;
use crate::flow::StoreSettings;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file path relative to project root.
pub const CONFIG_FILE_PATH: &str = ".taskflow/config.yaml";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Database file. Relative paths resolve against the project root.
    /// None means the per-project file under the user data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// How long to wait on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Largest accepted batch.
    pub max_batch_ops: usize,

    /// Default batch deadline in milliseconds. None means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_timeout_ms: Option<u64>,

    /// Log filter used when `TASKFLOW_LOG` is unset (e.g. "info,taskflow=debug").
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: 5000,
            max_batch_ops: 1000,
            batch_timeout_ms: None,
            log_filter: "warn".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load config from a specific base directory, returning None if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(base_dir: &Path) -> Result<Option<Self>> {
        let config_path = Self::config_path(base_dir);
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Save config to a specific base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, base_dir: &Path) -> Result<()> {
        let config_path = Self::config_path(base_dir);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the config file path for a base directory.
    pub fn config_path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE_PATH)
    }

    /// Database file to use for the project rooted at `base_dir`.
    ///
    /// Falls back to `.taskflow/taskflow.sqlite3` inside the project when the
    /// platform has no user data directory.
    pub fn resolve_database_path(&self, base_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => base_dir.join(path),
            None => paths::project_db_path(base_dir).unwrap_or_else(|| {
                base_dir.join(".taskflow").join(paths::DATABASE_FILENAME)
            }),
        }
    }

    /// Store tunables derived from this config.
    #[must_use]
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_batch_ops: self.max_batch_ops,
            batch_timeout: self.batch_timeout_ms.map(Duration::from_millis),
        }
    }
}
