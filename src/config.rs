//! Configuration management
//!
//! Manages store location, workspace namespace prefix, and transfer
//! signing settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::StoreConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pattern store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Workspace scoping settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Bundle transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Workspace scoping settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Namespace prefix that marks workspace-scoped patterns
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,
}

fn default_namespace_prefix() -> String {
    "workspace.".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
        }
    }
}

/// Bundle transfer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Shared secret for HMAC bundle signatures. When unset, bundles carry
    /// an unkeyed digest (tamper evidence only). Both instances must agree.
    #[serde(default)]
    pub signing_secret: Option<String>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent().context("Config path has no parent")?;

        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents).context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "patternbank", "patternbank")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "patternbank", "patternbank")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
