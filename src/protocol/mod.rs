//! Protocol module - frame envelope, framing, and frame types.
//!
//! This module implements the outer layer of the AMQP 0-9-1 wire protocol:
//! - 7-byte frame header encoding/decoding plus the fixed end marker
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    FrameHeader, FrameKind, DEFAULT_MAX_FRAME_SIZE, FRAME_END, FRAME_HEADER_SIZE,
};
