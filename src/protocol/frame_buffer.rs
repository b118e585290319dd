//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: need at least 7 bytes
//! - `WaitingForPayload`: header parsed, need payload plus the end marker
//!
//! A frame whose trailing byte is not `0xCE` is rejected as malformed and
//! yields no frame; the error leaves already-extracted frames untouched.

use bytes::BytesMut;

use super::wire_format::{FrameHeader, DEFAULT_MAX_FRAME_SIZE, FRAME_END, FRAME_HEADER_SIZE};
use super::Frame;
use crate::error::{AmqpError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header (need 7 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes plus the end marker.
    WaitingForPayload { header: FrameHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// All data is stored in a single `BytesMut` buffer to minimize allocations.
pub struct FrameBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed frame payload size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom frame size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming data from the stream.
    /// Returns a vector of complete frames. If data is fragmented, partial
    /// data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Fails with [`AmqpError::MalformedFrame`] on an unknown frame type or
    /// a missing end marker, and [`AmqpError::FrameTooLarge`] when the
    /// declared payload exceeds the frame size limit. Both indicate stream
    /// corruption: the connection should be torn down, not resumed.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();

        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a framing violation
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                let header = match FrameHeader::decode(&self.buffer)? {
                    Some(h) => h,
                    None => return Ok(None),
                };

                header.validate(self.max_frame_size)?;

                // Consume header bytes
                let _ = self.buffer.split_to(FRAME_HEADER_SIZE);

                self.state = State::WaitingForPayload { header };

                // The payload (possibly empty) and end marker may already
                // be buffered.
                self.try_extract_one()
            }

            State::WaitingForPayload { header } => {
                let payload_len = header.payload_length as usize;

                // Payload plus one byte for the end marker.
                if self.buffer.len() < payload_len + 1 {
                    return Ok(None);
                }

                if self.buffer[payload_len] != FRAME_END {
                    return Err(AmqpError::MalformedFrame(format!(
                        "frame-end marker missing, got {:#04x}",
                        self.buffer[payload_len]
                    )));
                }

                // Extract payload (zero-copy freeze), then drop the marker.
                let payload = self.buffer.split_to(payload_len).freeze();
                let _ = self.buffer.split_to(1);
                let header = *header;

                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, payload)))
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
