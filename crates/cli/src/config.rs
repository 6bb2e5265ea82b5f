//! Configuration management for the CLI

use anyhow::{Context, Result};
use scaler_lib::config::Profile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI preferences, read from `~/.config/sqlscaler/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliConfig {
    /// Project used when `--project` is not given
    pub default_project: Option<String>,
    /// Profile used when `--profile` is not given
    pub default_profile: Option<Profile>,
    /// Static access token
    pub access_token: Option<String>,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("sqlscaler").join("config.json"))
    }
}
