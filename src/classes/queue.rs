//! Queue-class operations.

use bytes::BufMut;

use crate::channel::Channel;
use crate::codec::{ByteCursor, FieldTable, FrameBuilder, WireWrite};
use crate::error::Result;
use crate::methods::Method;

/// Reply of `queue.declare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclareOk {
    /// The queue name; server-generated when declared with an empty name.
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// Queue operations on one channel.
pub struct QueueOps<'a> {
    channel: &'a Channel,
}

impl<'a> QueueOps<'a> {
    pub(crate) fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    fn request(&self, method: Method) -> FrameBuilder {
        let (class_id, method_id) = method.ids();
        FrameBuilder::method(self.channel.number(), class_id, method_id)
    }

    /// Declare a queue and await `declare-ok`.
    ///
    /// Declaring with an empty name asks the broker to generate one; the
    /// reply carries it.
    pub async fn declare(
        &self,
        queue: &str,
        passive: bool,
        durable: bool,
        exclusive: bool,
        auto_delete: bool,
        arguments: Option<&FieldTable>,
    ) -> Result<QueueDeclareOk> {
        let mut builder = self.request(Method::QueueDeclare);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_bits(&[passive, durable, exclusive, auto_delete, false]);
        buf.put_field_table(arguments)?;

        let reply = self
            .channel
            .call(Method::QueueDeclareOk, builder.finish())
            .await?;

        let mut cursor = ByteCursor::new(&reply);
        Ok(QueueDeclareOk {
            queue: cursor.read_short_string()?,
            message_count: cursor.read_u32()?,
            consumer_count: cursor.read_u32()?,
        })
    }

    /// Bind a queue to an exchange and await `bind-ok`.
    pub async fn bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> Result<()> {
        let mut builder = self.request(Method::QueueBind);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_short_string(exchange)?;
        buf.put_short_string(routing_key)?;
        buf.put_bits(&[false]);
        buf.put_field_table(arguments)?;

        self.channel
            .call(Method::QueueBindOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Remove a binding and await `unbind-ok`.
    ///
    /// Unlike bind, the unbind grammar carries no no-wait bit.
    pub async fn unbind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> Result<()> {
        let mut builder = self.request(Method::QueueUnbind);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_short_string(exchange)?;
        buf.put_short_string(routing_key)?;
        buf.put_field_table(arguments)?;

        self.channel
            .call(Method::QueueUnbindOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Purge a queue; returns the number of messages discarded.
    pub async fn purge(&self, queue: &str) -> Result<u32> {
        let mut builder = self.request(Method::QueuePurge);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_bits(&[false]);

        let reply = self
            .channel
            .call(Method::QueuePurgeOk, builder.finish())
            .await?;

        ByteCursor::new(&reply).read_u32()
    }

    /// Delete a queue; returns the number of messages it still held.
    pub async fn delete(&self, queue: &str, if_unused: bool, if_empty: bool) -> Result<u32> {
        let mut builder = self.request(Method::QueueDelete);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_bits(&[if_unused, if_empty, false]);

        let reply = self
            .channel
            .call(Method::QueueDeleteOk, builder.finish())
            .await?;

        ByteCursor::new(&reply).read_u32()
    }
}
