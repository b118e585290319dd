//! Basic-class message properties.
//!
//! The content header frame carries a 16-bit property-flags word followed
//! by the present properties in flag order, highest bit first. A message
//! with no properties encodes as flags `0x0000` and nothing else.

use bytes::{BufMut, BytesMut};

use crate::codec::{ByteCursor, FieldTable, WireWrite};
use crate::error::Result;

// Property-flag bit positions, per the basic class grammar.
const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;

/// Message properties for publish and delivery.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: Option<FieldTable>,
    /// 1 = transient, 2 = persistent.
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    /// POSIX timestamp, seconds.
    pub timestamp: Option<u64>,
    pub message_type: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    /// Compute the property-flags word.
    fn flags(&self) -> u16 {
        let mut flags = 0u16;
        if self.content_type.is_some() {
            flags |= FLAG_CONTENT_TYPE;
        }
        if self.content_encoding.is_some() {
            flags |= FLAG_CONTENT_ENCODING;
        }
        if self.headers.is_some() {
            flags |= FLAG_HEADERS;
        }
        if self.delivery_mode.is_some() {
            flags |= FLAG_DELIVERY_MODE;
        }
        if self.priority.is_some() {
            flags |= FLAG_PRIORITY;
        }
        if self.correlation_id.is_some() {
            flags |= FLAG_CORRELATION_ID;
        }
        if self.reply_to.is_some() {
            flags |= FLAG_REPLY_TO;
        }
        if self.expiration.is_some() {
            flags |= FLAG_EXPIRATION;
        }
        if self.message_id.is_some() {
            flags |= FLAG_MESSAGE_ID;
        }
        if self.timestamp.is_some() {
            flags |= FLAG_TIMESTAMP;
        }
        if self.message_type.is_some() {
            flags |= FLAG_TYPE;
        }
        if self.user_id.is_some() {
            flags |= FLAG_USER_ID;
        }
        if self.app_id.is_some() {
            flags |= FLAG_APP_ID;
        }
        if self.cluster_id.is_some() {
            flags |= FLAG_CLUSTER_ID;
        }
        flags
    }

    /// Append the flags word and present properties.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.flags());

        if let Some(v) = &self.content_type {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.content_encoding {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.headers {
            buf.put_field_table(Some(v))?;
        }
        if let Some(v) = self.delivery_mode {
            buf.put_u8(v);
        }
        if let Some(v) = self.priority {
            buf.put_u8(v);
        }
        if let Some(v) = &self.correlation_id {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.reply_to {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.expiration {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.message_id {
            buf.put_short_string(v)?;
        }
        if let Some(v) = self.timestamp {
            buf.put_u64(v);
        }
        if let Some(v) = &self.message_type {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.user_id {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.app_id {
            buf.put_short_string(v)?;
        }
        if let Some(v) = &self.cluster_id {
            buf.put_short_string(v)?;
        }
        Ok(())
    }

    /// Read the flags word and present properties.
    pub fn decode(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let flags = cursor.read_u16()?;
        let mut props = BasicProperties::default();

        if flags & FLAG_CONTENT_TYPE != 0 {
            props.content_type = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_CONTENT_ENCODING != 0 {
            props.content_encoding = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_HEADERS != 0 {
            props.headers = Some(cursor.read_field_table()?);
        }
        if flags & FLAG_DELIVERY_MODE != 0 {
            props.delivery_mode = Some(cursor.read_u8()?);
        }
        if flags & FLAG_PRIORITY != 0 {
            props.priority = Some(cursor.read_u8()?);
        }
        if flags & FLAG_CORRELATION_ID != 0 {
            props.correlation_id = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_REPLY_TO != 0 {
            props.reply_to = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_EXPIRATION != 0 {
            props.expiration = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_MESSAGE_ID != 0 {
            props.message_id = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_TIMESTAMP != 0 {
            props.timestamp = Some(cursor.read_u64()?);
        }
        if flags & FLAG_TYPE != 0 {
            props.message_type = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_USER_ID != 0 {
            props.user_id = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_APP_ID != 0 {
            props.app_id = Some(cursor.read_short_string()?);
        }
        if flags & FLAG_CLUSTER_ID != 0 {
            props.cluster_id = Some(cursor.read_short_string()?);
        }
        Ok(props)
    }
}
