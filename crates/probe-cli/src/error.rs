//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] probe_core::CoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] probe_feed::FeedError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] probe_lookup::LookupError),

    #[error("Comparison error: {0}")]
    Compare(#[from] probe_compare::CompareError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] probe_telemetry::TelemetryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
