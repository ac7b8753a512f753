//! Transport error types.
//!
//! Every variant returned from `FeedAdapter::run` is a transport failure for
//! the run: the driver marks the source unavailable and does not retry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connect timeout after {0}ms")]
    ConnectTimeout(u64),

    #[error("Handshake timeout after {0}ms")]
    HandshakeTimeout(u64),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("Frame decode error: {0}")]
    Decode(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::HandshakeTimeout(_) => "handshake_timeout",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::SubscriptionRejected(_) => "subscription_rejected",
            Self::Decode(_) => "decode",
            Self::Tungstenite(_) => "tungstenite",
            Self::Json(_) => "json",
        }
    }
}

pub type WsResult<T> = Result<T, WsError>;
