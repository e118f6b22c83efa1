//! Error handling for the ridelink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] ridelink_core::RidelinkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("No device matching '{0}' was found")]
    DeviceNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
