//! Configuration management for kforward

mod forward;
pub(crate) mod duration;

pub use forward::{ForwardConfig, ReconnectPolicy};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kforward")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Get the default directory holding template files
pub fn default_templates_dir() -> PathBuf {
    default_config_dir().join("templates")
}

/// On-disk configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Engine tuning
    pub forward: ForwardConfig,
    /// Directory searched for `*.toml` templates
    pub templates_dir: PathBuf,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            forward: ForwardConfig::default(),
            templates_dir: default_templates_dir(),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write {}: {}", path.display(), e)))?;

    Ok(())
}

/// Load the config file at `path`, or the default location, or defaults
///
/// An explicitly given path must exist; a missing default file is not an error.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                load_config(&default_path)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}
