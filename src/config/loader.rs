use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/ptyscribe/config.toml` on Unix, or the platform
    /// equivalent via `dirs::config_dir()`. Falls back to the current
    /// directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("ptyscribe").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// A missing file yields `Config::default()`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Config::default());
        }

        Self::load_from(&path)
    }

    /// Loads and validates an explicit config file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - chunk size is between 1 and 64 KiB
    /// - the slave path bound is non-zero
    /// - the shell environment variable name is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunk_size = self.relay.chunk_size;
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "relay.chunk_size must be between 1 and {}, got {}",
                    MAX_CHUNK_SIZE, chunk_size
                ),
            });
        }

        if self.pty.max_slave_path == 0 {
            return Err(ConfigError::ValidationError {
                message: "pty.max_slave_path must be greater than zero".to_string(),
            });
        }

        let env_var = &self.shell.env_var;
        if env_var.is_empty() || env_var.contains('=') || env_var.contains('\0') {
            return Err(ConfigError::ValidationError {
                message: format!("shell.env_var '{}' is not a valid variable name", env_var),
            });
        }

        Ok(())
    }
}
