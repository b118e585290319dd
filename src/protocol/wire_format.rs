//! Frame envelope encoding and decoding.
//!
//! Implements the 7-byte frame header plus trailing end marker:
//! ```text
//! ┌──────────┬───────────┬───────────┬─────────┬──────────┐
//! │ Type     │ Channel   │ Length    │ Payload │ End      │
//! │ 1 byte   │ 2 bytes   │ 4 bytes   │ N bytes │ 1 byte   │
//! │          │ uint16 BE │ uint32 BE │         │ 0xCE     │
//! └──────────┴───────────┴───────────┴─────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{AmqpError, Result};

/// Frame header size in bytes (fixed, exactly 7).
pub const FRAME_HEADER_SIZE: usize = 7;

/// Fixed sentinel byte that terminates every frame.
pub const FRAME_END: u8 = 0xCE;

/// Default maximum frame payload size (128 KiB, the customary frame-max).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 131_072;

/// The four frame types of AMQP 0-9-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Method = 1,
    Header = 2,
    Body = 3,
    Heartbeat = 8,
}

impl FrameKind {
    /// Map a wire byte to a frame kind.
    ///
    /// An unrecognized type byte indicates stream corruption.
    pub fn from_wire(byte: u8) -> Result<FrameKind> {
        match byte {
            1 => Ok(FrameKind::Method),
            2 => Ok(FrameKind::Header),
            3 => Ok(FrameKind::Body),
            8 => Ok(FrameKind::Heartbeat),
            other => Err(AmqpError::MalformedFrame(format!(
                "unknown frame type {other}"
            ))),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame type.
    pub kind: FrameKind,
    /// Channel number (0 = connection-level).
    pub channel: u16,
    /// Payload length in bytes (excludes the end marker).
    pub payload_length: u32,
}

impl FrameHeader {
    /// Create a new frame header.
    pub fn new(kind: FrameKind, channel: u16, payload_length: u32) -> Self {
        Self {
            kind,
            channel,
            payload_length,
        }
    }

    /// Encode the header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode the header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than `FRAME_HEADER_SIZE` (7 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= FRAME_HEADER_SIZE);
        buf[0] = self.kind as u8;
        buf[1..3].copy_from_slice(&self.channel.to_be_bytes());
        buf[3..7].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode a header from bytes.
    ///
    /// Returns `Ok(None)` if the buffer is too short; fails with
    /// [`AmqpError::MalformedFrame`] on an unknown frame type.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let kind = FrameKind::from_wire(buf[0])?;
        Ok(Some(Self {
            kind,
            channel: u16::from_be_bytes([buf[1], buf[2]]),
            payload_length: u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]),
        }))
    }

    /// Validate the header against the frame size limit.
    pub fn validate(&self, max_frame_size: u32) -> Result<()> {
        if self.payload_length > max_frame_size {
            return Err(AmqpError::FrameTooLarge {
                size: self.payload_length,
                max: max_frame_size,
            });
        }
        Ok(())
    }
}
