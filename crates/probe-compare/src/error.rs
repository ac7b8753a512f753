//! Comparison error types.

use probe_core::SourceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Source missing from window: {0}")]
    MissingSource(SourceId),

    #[error("All stream sources unavailable")]
    AllSourcesUnavailable,
}

pub type CompareResult<T> = Result<T, CompareError>;
