//! Loading the configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::ServiceConfig;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Failed to parse configuration text
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A required key is absent
    #[error("Missing configuration key: {section}.{key}")]
    MissingKey { section: String, key: String },

    /// A layer references an undeclared source
    #[error("Layer '{layer}' references unknown source '{source_name}'")]
    UnknownSource { layer: String, source_name: String },

    /// A layer lists no source
    #[error("Layer '{0}' has no sources")]
    NoSources(String),

    /// The upstream HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] crate::provider::FetchError),
}

impl ServiceConfig {
    /// Loads configuration from `path`.
    ///
    /// Unlike most settings files, a missing file is an error: the service
    /// has nothing to serve without layers.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        super::parser::parse_ini(&ini)
    }
}

/// Default configuration file (`~/.hipslayer/config.ini`).
pub fn config_file_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hipslayer")
        .join("config.ini")
}
