//! Configuration file loading and atomic write-back
//!
//! Resolution order for every setting is ENV -> TOML file -> compiled
//! default. This module owns the TOML tier: locating the file, parsing
//! it, and writing it back atomically (write-temp-then-rename).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk TOML configuration for the fincat tools
///
/// All fields are optional; absent fields fall through to environment
/// variables and compiled defaults at resolution time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root directory for the page cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    /// Classifier model identifier (e.g. "gpt-5")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Classifier endpoint URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// API key for the classifier endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Exemplars per model request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    /// Concurrent in-flight page requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

/// Default configuration file path for the platform
///
/// `~/.config/fincat/config.toml` (or the platform equivalent).
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("fincat").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Read a TOML config file, returning defaults when the file is absent
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML config file atomically
///
/// Serializes to `<path>.tmp` and then renames into place so a crash
/// mid-write never leaves a partially written, readable file.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }
    Ok(())
}
