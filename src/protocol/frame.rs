//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.

use bytes::Bytes;

use super::wire_format::{FrameHeader, FrameKind, FRAME_END, FRAME_HEADER_SIZE};

/// A complete protocol frame.
///
/// The end marker is part of the wire representation only; a decoded
/// frame's payload never contains it.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: FrameHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }

    /// Get the channel number.
    #[inline]
    pub fn channel(&self) -> u16 {
        self.header.channel
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this is a method frame.
    #[inline]
    pub fn is_method(&self) -> bool {
        self.header.kind == FrameKind::Method
    }

    /// Check if this is a content header frame.
    #[inline]
    pub fn is_header(&self) -> bool {
        self.header.kind == FrameKind::Header
    }

    /// Check if this is a content body frame.
    #[inline]
    pub fn is_body(&self) -> bool {
        self.header.kind == FrameKind::Body
    }

    /// Check if this is a heartbeat frame.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        self.header.kind == FrameKind::Heartbeat
    }
}

/// Build a complete wire frame as a single byte vector.
///
/// Encodes the 7-byte header, appends the payload and the end marker.
/// Intended for fixed payloads; method frames with a length that is only
/// known after encoding go through
/// [`FrameBuilder`](crate::codec::FrameBuilder) instead.
pub fn build_frame(kind: FrameKind, channel: u16, payload: &[u8]) -> Vec<u8> {
    let header = FrameHeader::new(kind, channel, payload.len() as u32);
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + 1);
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf.push(FRAME_END);
    buf
}
