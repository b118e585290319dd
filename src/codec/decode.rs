//! Decode side of the value codec.
//!
//! [`ByteCursor`] walks a borrowed byte slice with checked reads. Every
//! failure mode during decode - truncated input, a length prefix that
//! overruns the buffer, invalid UTF-8, an unrecognized value tag - is
//! [`AmqpError::MalformedFrame`]; a cursor never panics on hostile input.

use super::table::{FieldTable, FieldValue};
use crate::error::{AmqpError, Result};

/// A checked read cursor over a byte slice.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor at the start of the slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(AmqpError::MalformedFrame(format!(
                "need {n} bytes, {} remain",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Read one packed-bit octet and expose the flag in its lowest bit.
    ///
    /// Methods with a single boolean argument (deliver's `redelivered`,
    /// qos's `global`) arrive this way.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? & 0x01 != 0)
    }

    /// Read a short string: 1-byte length prefix + UTF-8 bytes.
    pub fn read_short_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AmqpError::MalformedFrame("short string is not UTF-8".into()))
    }

    /// Read a long string: 4-byte length prefix + bytes.
    pub fn read_long_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| AmqpError::MalformedFrame("long string is not UTF-8".into()))
    }

    /// Read a length-prefixed field table.
    pub fn read_field_table(&mut self) -> Result<FieldTable> {
        let len = self.read_u32()? as usize;
        let inner = self.read_bytes(len)?;

        let mut cursor = ByteCursor::new(inner);
        let mut table = FieldTable::new();
        while cursor.remaining() > 0 {
            let key = cursor.read_short_string()?;
            let value = cursor.read_field_value()?;
            table.insert(key, value);
        }
        Ok(table)
    }

    /// Read one tagged field value.
    pub fn read_field_value(&mut self) -> Result<FieldValue> {
        let tag = self.read_u8()?;
        let value = match tag {
            b't' => FieldValue::Bool(self.read_u8()? != 0),
            b'b' => FieldValue::I8(self.read_i8()?),
            b's' => FieldValue::I16(self.read_i16()?),
            b'I' => FieldValue::I32(self.read_i32()?),
            b'l' => FieldValue::I64(self.read_i64()?),
            b'f' => FieldValue::Float(self.read_f32()?),
            b'd' => FieldValue::Double(self.read_f64()?),
            b'D' => FieldValue::Decimal {
                scale: self.read_u8()?,
                mantissa: self.read_i32()?,
            },
            b'S' => FieldValue::LongString(self.read_long_string()?),
            b'A' => {
                let len = self.read_u32()? as usize;
                let inner = self.read_bytes(len)?;
                let mut cursor = ByteCursor::new(inner);
                let mut values = Vec::new();
                while cursor.remaining() > 0 {
                    values.push(cursor.read_field_value()?);
                }
                FieldValue::Array(values)
            }
            b'T' => FieldValue::Timestamp(self.read_u64()?),
            b'F' => FieldValue::Table(self.read_field_table()?),
            b'x' => {
                let len = self.read_u32()? as usize;
                FieldValue::Bytes(self.read_bytes(len)?.to_vec())
            }
            b'V' => FieldValue::Void,
            other => {
                return Err(AmqpError::MalformedFrame(format!(
                    "unknown field value tag {:#04x}",
                    other
                )))
            }
        };
        Ok(value)
    }
}
