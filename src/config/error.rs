//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    #[error("Cannot access config file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("{field} must be between 0 and 1, got {value}")]
    NotAProbability { field: &'static str, value: f64 },

    #[error("Invalid timeout for {0}")]
    InvalidTimeout(&'static str),

    #[error("enabled_intents cannot be empty")]
    NoIntentsEnabled,

    #[error("Field key '{key}' in {list} is empty or duplicated")]
    InvalidFieldKey { list: &'static str, key: String },

    #[error("Invalid URL for {0}")]
    InvalidUrl(&'static str),

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Database pool size {0} is outside 1..=64")]
    InvalidPoolSize(u32),

    #[error("Invalid log level '{0}'")]
    InvalidLogLevel(String),
}
