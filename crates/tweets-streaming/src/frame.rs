//! CRLF frame decoding.
//!
//! The stream body is a continuous byte sequence; frames are the segments
//! between `\r\n` terminators. Chunk boundaries carry no meaning, so a frame
//! may arrive split across any number of chunks, and one chunk may carry
//! several frames.

use bytes::{Buf, Bytes, BytesMut};
use serde::de::DeserializeOwned;

use crate::{DEFAULT_MAX_FRAME_SIZE, FRAME_DELIMITER, StreamError, StreamResult};

/// One complete frame, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from its payload.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Consume the frame, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Back-to-back terminators produce an empty frame, which the server
    /// sends as a keep-alive.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Parse the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> StreamResult<T> {
        serde_json::from_slice(&self.payload).map_err(|e| StreamError::Parse(e.to_string()))
    }
}

/// Result of feeding one chunk to a [`FrameDecoder`].
#[derive(Debug, Default)]
pub struct Decoded {
    /// Frames completed by the chunk, in order.
    pub frames: Vec<Frame>,
    /// Set when the unterminated remainder outgrew the size limit and was
    /// discarded. Frames completed before it are still in `frames`.
    pub overflow: Option<StreamError>,
}

/// Incremental CRLF frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default frame size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder that rejects partial frames larger than `max_frame_size`.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Number of bytes held for an unterminated frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk and return every frame it completes, in order.
    ///
    /// When the unterminated remainder grows past the size limit it is
    /// discarded and reported in [`Decoded::overflow`].
    pub fn decode(&mut self, chunk: &[u8]) -> Decoded {
        // Bytes already buffered hold no terminator, except one split
        // across the chunk boundary.
        let mut from = self
            .buffer
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);
        self.buffer.extend_from_slice(chunk);
        let mut decoded = Decoded::default();

        while let Some(end) = self.find_delimiter(from) {
            let payload = self.buffer.split_to(end).freeze();
            self.buffer.advance(FRAME_DELIMITER.len());
            decoded.frames.push(Frame { payload });
            from = 0;
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.buffer.clear();
            decoded.overflow = Some(StreamError::BufferOverflow {
                size,
                limit: self.max_frame_size,
            });
        }

        decoded
    }

    fn find_delimiter(&self, from: usize) -> Option<usize> {
        self.buffer[from..]
            .windows(FRAME_DELIMITER.len())
            .position(|window| window == FRAME_DELIMITER)
            .map(|pos| from + pos)
    }
}
