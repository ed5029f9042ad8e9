//! Streaming error types.

/// Streaming errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A frame was not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Reconnection limit exceeded.
    #[error("Reconnection limit exceeded after {attempts} attempts")]
    ReconnectLimitExceeded {
        /// Number of reconnection attempts.
        attempts: u32,
    },

    /// Buffer overflow.
    #[error("Buffer overflow: {size} bytes exceeds limit of {limit}")]
    BufferOverflow {
        /// Current size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },
}

impl StreamError {
    /// Whether the stream can keep going after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::BufferOverflow { .. })
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
