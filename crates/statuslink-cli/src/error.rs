//! Error handling for the probe CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync core error: {0}")]
    Core(#[from] statuslink_core::StatusLinkError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] statuslink_core::ConfigError),

    #[error("Realtime error: {0}")]
    Runtime(#[from] statuslink_runtime::RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
