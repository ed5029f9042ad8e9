//! Twitter client error types.

use std::time::Duration;

use thiserror::Error;
use tweets_streaming::StreamError;

use crate::rest::RateLimitState;

/// Errors produced by the REST dispatcher, the stream session, and the
/// high-level client.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// OAuth signature generation or token exchange failed
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Missing credentials or malformed call arguments
    #[error("Configuration error: {0}")]
    Config(String),

    /// The call did not settle within its timeout, counted from enqueue
    #[error("Request to {bucket} timed out after {timeout:?}")]
    Timeout { bucket: String, timeout: Duration },

    /// The API answered 429; the bucket is frozen for `retry_after`
    #[error("Rate limited on {bucket}, retry after {retry_after:?}")]
    RateLimited {
        bucket: String,
        retry_after: Duration,
        rate_limit: RateLimitState,
    },

    /// Twitter API returned a non-success status
    #[error("Twitter API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        error_code: Option<i64>,
        body: serde_json::Value,
    },

    /// The stream handshake failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stream framing or reconnect error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Operation not allowed in the session's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The bucket worker is gone
    #[error("Request bucket closed")]
    BucketClosed,
}

impl TwitterError {
    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status >= 500,
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Connection(_) => true,
            Self::Stream(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Result type for Twitter operations.
pub type TwitterResult<T> = Result<T, TwitterError>;
