//! Lookup error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Invalid lookup configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Lookup timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LookupError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::HttpClient(_) => "http_client",
            Self::Status { .. } => "status",
            Self::Timeout(_) => "timeout",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

pub type LookupResult<T> = Result<T, LookupError>;
