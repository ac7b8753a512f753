//! Feed error types.

use probe_core::SourceId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid collector configuration: {0}")]
    InvalidConfig(String),

    #[error("Window is {0}")]
    WindowState(&'static str),

    #[error("Source not registered: {0}")]
    UnknownSource(SourceId),

    #[error("Core error: {0}")]
    Core(#[from] probe_core::CoreError),
}

pub type FeedResult<T> = Result<T, FeedError>;
