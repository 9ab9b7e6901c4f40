//! Error types for the optimistic cache

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache error types
///
/// None of these are fatal: a failed mutation is rolled back locally and the
/// error is surfaced through the notifier and the mutation outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Remote operation reported a failure
    #[error("Remote operation failed: {0}")]
    Remote(String),

    /// Network error reaching the remote
    #[error("Network error: {0}")]
    Network(String),

    /// Server confirmed a record with an id inside the temporary range
    #[error("Server returned reserved identifier {0}")]
    ReservedServerId(i64),

    /// Temporary identifier space ran out
    #[error("Temporary identifier space exhausted")]
    TempIdsExhausted,

    /// Entity not found
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}
