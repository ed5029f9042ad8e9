//! Tweets Streaming - framing and reconnect support for push streams
//!
//! The streaming endpoints deliver one JSON document per frame, each frame
//! terminated by `\r\n`. This crate holds the protocol-agnostic parts of a
//! stream consumer:
//!
//! - **Framing**: [`FrameDecoder`] turns arbitrary byte chunks into frames
//! - **Reconnect**: [`ReconnectConfig`] / [`ReconnectHandler`] pace repeated
//!   connection attempts
//!
//! # Quick Start
//!
//! ```rust
//! use tweets_streaming::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::new();
//! assert!(decoder.decode(b"{\"text\":").frames.is_empty());
//!
//! let frames = decoder.decode(b"\"hi\"}\r\n\r\n").frames;
//! assert_eq!(frames.len(), 2);
//! assert!(frames[1].is_heartbeat());
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod frame;
mod reconnect;

pub use error::*;
pub use frame::*;
pub use reconnect::*;

use std::time::Duration;

/// Frame terminator used by the streaming endpoints.
pub const FRAME_DELIMITER: &[u8] = b"\r\n";

/// Default delay before the second reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnection delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Default cap on bytes buffered while waiting for a frame terminator.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Serde adapter storing a `Duration` as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
