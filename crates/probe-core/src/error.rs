//! Error types for probe-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid identity key: {0}")]
    InvalidIdentity(String),

    #[error("Invalid network key: {0}")]
    InvalidNetwork(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
