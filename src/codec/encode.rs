//! Encode side of the value codec.
//!
//! [`WireWrite`] extends `BytesMut` with the AMQP primitive writers;
//! [`FrameBuilder`] wraps a buffer in the frame envelope, writing a zeroed
//! payload-length placeholder up front and backpatching it once the payload
//! is complete.

use bytes::{BufMut, BytesMut};

use super::table::{FieldTable, FieldValue};
use crate::error::{AmqpError, Result};
use crate::protocol::{FrameKind, FRAME_END, FRAME_HEADER_SIZE};

/// Maximum byte length of a short string (1-byte length prefix).
pub const SHORT_STRING_MAX: usize = 255;

/// AMQP primitive writers over a growable buffer.
///
/// Multi-byte integers are Big Endian throughout. Only
/// [`put_short_string`](WireWrite::put_short_string) can fail; everything
/// else appends unconditionally.
pub trait WireWrite {
    /// Write a short string: 1-byte length prefix + UTF-8 bytes.
    ///
    /// Strings longer than 255 bytes are a caller error, not a wire
    /// condition, and fail with [`AmqpError::Protocol`].
    fn put_short_string(&mut self, s: &str) -> Result<()>;

    /// Write a long string: 4-byte length prefix + bytes.
    fn put_long_string(&mut self, s: &[u8]);

    /// Pack boolean flags into bit-fields, 8 flags per byte, first flag in
    /// the least significant bit.
    fn put_bits(&mut self, bits: &[bool]);

    /// Write a field table; `None` encodes as a zero-length table.
    fn put_field_table(&mut self, table: Option<&FieldTable>) -> Result<()>;

    /// Write one tagged field value (tag byte + payload).
    fn put_field_value(&mut self, value: &FieldValue) -> Result<()>;
}

impl WireWrite for BytesMut {
    fn put_short_string(&mut self, s: &str) -> Result<()> {
        if s.len() > SHORT_STRING_MAX {
            return Err(AmqpError::Protocol(format!(
                "short string of {} bytes exceeds 255",
                s.len()
            )));
        }
        self.put_u8(s.len() as u8);
        self.put_slice(s.as_bytes());
        Ok(())
    }

    fn put_long_string(&mut self, s: &[u8]) {
        self.put_u32(s.len() as u32);
        self.put_slice(s);
    }

    fn put_bits(&mut self, bits: &[bool]) {
        for chunk in bits.chunks(8) {
            let mut octet = 0u8;
            for (i, bit) in chunk.iter().enumerate() {
                if *bit {
                    octet |= 1 << i;
                }
            }
            self.put_u8(octet);
        }
    }

    fn put_field_table(&mut self, table: Option<&FieldTable>) -> Result<()> {
        let len_at = self.len();
        self.put_u32(0);

        if let Some(table) = table {
            for (key, value) in table.iter() {
                self.put_short_string(key)?;
                self.put_field_value(value)?;
            }
        }

        let table_len = (self.len() - len_at - 4) as u32;
        self[len_at..len_at + 4].copy_from_slice(&table_len.to_be_bytes());
        Ok(())
    }

    fn put_field_value(&mut self, value: &FieldValue) -> Result<()> {
        self.put_u8(value.tag());
        match value {
            FieldValue::Bool(v) => self.put_u8(*v as u8),
            FieldValue::I8(v) => self.put_i8(*v),
            FieldValue::I16(v) => self.put_i16(*v),
            FieldValue::I32(v) => self.put_i32(*v),
            FieldValue::I64(v) => self.put_i64(*v),
            FieldValue::Float(v) => self.put_f32(*v),
            FieldValue::Double(v) => self.put_f64(*v),
            FieldValue::Decimal { scale, mantissa } => {
                self.put_u8(*scale);
                self.put_i32(*mantissa);
            }
            FieldValue::LongString(v) => self.put_long_string(v.as_bytes()),
            FieldValue::Array(values) => {
                let len_at = self.len();
                self.put_u32(0);
                for v in values {
                    self.put_field_value(v)?;
                }
                let array_len = (self.len() - len_at - 4) as u32;
                self[len_at..len_at + 4].copy_from_slice(&array_len.to_be_bytes());
            }
            FieldValue::Timestamp(v) => self.put_u64(*v),
            FieldValue::Table(table) => self.put_field_table(Some(table))?,
            FieldValue::Bytes(v) => {
                self.put_u32(v.len() as u32);
                self.put_slice(v);
            }
            FieldValue::Void => {}
        }
        Ok(())
    }
}

/// Builds one wire frame with a backpatched payload length.
///
/// The envelope header is written immediately with a zero length; the
/// caller appends payload through [`buffer`](FrameBuilder::buffer), and
/// [`finish`](FrameBuilder::finish) patches the length and appends the end
/// marker. Dropping a builder without finishing discards the frame, which
/// keeps a failed encode from leaking a half-written envelope to the wire.
pub struct FrameBuilder {
    buf: BytesMut,
}

impl FrameBuilder {
    /// Start a frame of the given kind on the given channel.
    pub fn new(kind: FrameKind, channel: u16) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_u8(kind as u8);
        buf.put_u16(channel);
        buf.put_u32(0); // payload length, patched in finish()
        Self { buf }
    }

    /// Start a method frame and write the class/method identifiers.
    pub fn method(channel: u16, class_id: u16, method_id: u16) -> Self {
        let mut builder = Self::new(FrameKind::Method, channel);
        builder.buf.put_u16(class_id);
        builder.buf.put_u16(method_id);
        builder
    }

    /// The payload buffer; append arguments here via [`WireWrite`].
    pub fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Backpatch the payload length, append the end marker, and return the
    /// finished wire frame.
    pub fn finish(mut self) -> bytes::Bytes {
        let payload_len = (self.buf.len() - FRAME_HEADER_SIZE) as u32;
        self.buf[3..7].copy_from_slice(&payload_len.to_be_bytes());
        self.buf.put_u8(FRAME_END);
        self.buf.freeze()
    }
}
