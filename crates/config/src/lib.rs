//! Configuration loading and validation for Mosaic.
//!
//! Loads configuration from the file named by `MOSAIC_CONFIG` with
//! environment variable overrides. A missing file yields defaults.

use mosaic_core::{BufferDType, UnsupportedDType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "MOSAIC_CONFIG";

/// Environment variable overriding `buffer_dtype`.
pub const BUFFER_DTYPE_ENV: &str = "MOSAIC_BUFFER_DTYPE";

/// The root configuration structure for an assembler instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Element type of accumulation buffers
    #[serde(default)]
    pub buffer_dtype: BufferDType,
}

impl AssemblerConfig {
    /// Load configuration from `$MOSAIC_CONFIG` (defaults when unset).
    ///
    /// `MOSAIC_BUFFER_DTYPE` takes precedence over the file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load), reading variables through `lookup`.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(dtype) = lookup(BUFFER_DTYPE_ENV) {
            config.buffer_dtype = dtype
                .parse()
                .map_err(|e: UnsupportedDType| ConfigError::ValidationError(e.to_string()))?;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
