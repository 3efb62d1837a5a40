//! Configuration management for fnstage

pub mod schema;

pub use schema::Config;

use crate::error::{StageError, StageResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the configuration inside the buildpack directory
pub const CONFIG_FILE: &str = "fnstage.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager reading from the buildpack directory
    pub fn new(buildpack_dir: &Path) -> Self {
        Self {
            config_path: Self::default_config_path(buildpack_dir),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path(buildpack_dir: &Path) -> PathBuf {
        buildpack_dir.join(CONFIG_FILE)
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> StageResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StageResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StageError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| StageError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}
