//! Codec module - AMQP primitive value encoding and decoding.
//!
//! This module implements the inner layer of the wire protocol:
//! - Big-endian scalars, short strings, long strings
//! - Packed boolean bit-fields (8 flags per byte, LSB first)
//! - Self-describing field tables
//! - Frame construction with a backpatched payload-length field
//!
//! The encode side appends to a `BytesMut`; the decode side reads through
//! a checked [`ByteCursor`] that fails with `MalformedFrame` instead of
//! panicking on truncated input.

mod decode;
mod encode;
mod table;

pub use decode::ByteCursor;
pub use encode::{FrameBuilder, WireWrite};
pub use table::{FieldTable, FieldValue};
