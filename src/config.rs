// src/config.rs

//! Configuration file parsing for deltaforge
//!
//! Supports TOML configuration files with the following sections:
//! - [storage] - Server-side store root (archives, patches, catalog db)
//! - [tools]   - External diff/apply tool locations and timeout
//! - [client]  - Local installed-version state directory
//! - [update]  - Patch efficiency threshold
//!
//! Tool locations are deliberately configuration, not compiled-in
//! constants: deployments swap diff implementations without rebuilding.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/deltaforge/config.toml";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server-side storage settings
    #[serde(default)]
    pub storage: StorageSection,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsSection,

    /// Client-side state settings
    #[serde(default)]
    pub client: ClientSection,

    /// Update strategy settings
    #[serde(default)]
    pub update: UpdateSection,
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Root directory for archives, patches, and the catalog database
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageSection {
    /// Path of the catalog database under the storage root
    pub fn db_path(&self) -> PathBuf {
        self.root.join("catalog.db")
    }
}

/// External tool configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// Diff-generation tool, invoked as `tool -f <source> <target> <out>`
    #[serde(default = "default_diff_tool")]
    pub diff_tool: PathBuf,

    /// Patch-apply tool, invoked as `tool -f <source> <patch> <out>`
    #[serde(default = "default_apply_tool")]
    pub apply_tool: PathBuf,

    /// Subprocess timeout in seconds; the tool is killed on expiry
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            diff_tool: default_diff_tool(),
            apply_tool: default_apply_tool(),
            timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl ToolsSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Client-side state configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Directory holding installed versions and the current pointer
    #[serde(default = "default_client_root")]
    pub root: PathBuf,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            root: default_client_root(),
        }
    }
}

/// Update strategy configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSection {
    /// A patch is worth using only if its size is at most this fraction of
    /// the full target archive size
    #[serde(default = "default_patch_size_ratio")]
    pub patch_size_ratio: f64,
}

impl Default for UpdateSection {
    fn default() -> Self {
        Self {
            patch_size_ratio: default_patch_size_ratio(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/var/lib/deltaforge")
}

fn default_diff_tool() -> PathBuf {
    PathBuf::from("/usr/bin/hdiffz")
}

fn default_apply_tool() -> PathBuf {
    PathBuf::from("/usr/bin/hpatchz")
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_client_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("deltaforge")
}

fn default_patch_size_ratio() -> f64 {
    0.8
}

impl Config {
    /// Parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location if present,
    /// or fall back to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.update.patch_size_ratio) {
            return Err(Error::Config(format!(
                "update.patch_size_ratio must be within [0, 1], got {}",
                self.update.patch_size_ratio
            )));
        }
        if self.tools.timeout_secs == 0 {
            return Err(Error::Config(
                "tools.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
