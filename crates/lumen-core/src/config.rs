//! Configuration management for Lumen.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.
//! Everything here is read once, when a registry is built; holders never see
//! configuration changes after they are opened.

use crate::error::{LumenError, Result};
use crate::locator::{LocatorLayout, StorageLocator};
use crate::types::{MergeTuning, ReaderMode};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for Lumen.
///
/// ## Example Configuration File (lumen.toml)
///
/// ```toml
/// [storage]
/// base_dir = "/var/lib/lumen"
/// layout = "per-index"
///
/// [readers]
/// mode = "realtime"
///
/// [merge]
/// merge_factor = 5
/// max_merge_mb = 1000
/// ram_buffer_mb = 16
/// use_compound_file = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LumenConfig {
    /// Where index data lives
    pub storage: StorageConfig,

    /// How read snapshots are derived
    pub readers: ReadersConfig,

    /// Writer merge policy and buffering
    pub merge: MergeTuning,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for index data (None = default data directory)
    pub base_dir: Option<PathBuf>,

    /// One directory per index, or one shared directory
    pub layout: LocatorLayout,
}

/// Reader configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReadersConfig {
    /// Realtime (writer-backed) or snapshot (commit-backed) readers
    pub mode: ReaderMode,
}

impl LumenConfig {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(LumenConfig::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: LumenConfig = toml::from_str(&contents).map_err(|e| LumenError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| LumenError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Check values that serde alone cannot reject.
    pub fn validate(&self) -> Result<()> {
        self.merge
            .validate()
            .map_err(|reason| LumenError::Config { reason })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "lumen").ok_or_else(|| LumenError::Config {
            reason: "Could not determine config directory".to_string(),
        })?;

        Ok(dirs.config_dir().join("lumen.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "lumen").ok_or_else(|| LumenError::Config {
            reason: "Could not determine data directory".to_string(),
        })?;

        Ok(dirs.data_dir().join("indexes"))
    }

    /// Get the base directory (from config or default).
    pub fn base_dir(&self) -> Result<PathBuf> {
        match self.storage.base_dir {
            Some(ref path) => Ok(path.clone()),
            None => Self::default_data_dir(),
        }
    }

    /// Build the storage locator described by this configuration.
    pub fn locator(&self) -> Result<StorageLocator> {
        Ok(StorageLocator::with_layout(
            self.storage.layout,
            self.base_dir()?,
        ))
    }
}
