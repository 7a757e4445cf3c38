//! Core error types for eloguard-core.
//!
//! None of these are fatal to the process. The engine degrades to
//! "no new lock decisions" instead of crashing: data-source failures leave
//! the current state in place, persistence failures are logged and
//! dropped, and a missing player keeps the guard disengaged.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::GameMode;

/// Core error type for eloguard-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Rating fetch failed or returned no usable rating
    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    /// Store read/write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Rating source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// Transport-level failure (DNS, TLS, timeout, ...)
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("Rating service returned status {status}")]
    Status { status: u16 },

    /// The response carried no rating for the requested mode
    #[error("No {mode} rating found for '{player}'")]
    NoRating { player: String, mode: GameMode },

    /// Response body could not be decoded
    #[error("Failed to decode rating response: {0}")]
    Decode(String),
}

/// Store-specific errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// A previous holder of the connection panicked
    #[error("Store connection poisoned")]
    Poisoned,

    /// Value could not be encoded or decoded
    #[error("Failed to encode value for '{key}': {message}")]
    Encode { key: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    PersistenceError::Locked
                } else {
                    PersistenceError::QueryFailed(err.to_string())
                }
            }
            _ => PersistenceError::QueryFailed(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for DataSourceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            DataSourceError::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            DataSourceError::Decode(err.to_string())
        } else {
            DataSourceError::Request(err.to_string())
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
