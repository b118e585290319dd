//! Exchange-class operations.

use bytes::BufMut;

use crate::channel::Channel;
use crate::codec::{FieldTable, FrameBuilder, WireWrite};
use crate::error::Result;
use crate::methods::Method;

/// Exchange operations on one channel.
pub struct ExchangeOps<'a> {
    channel: &'a Channel,
}

impl<'a> ExchangeOps<'a> {
    pub(crate) fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    fn request(&self, method: Method) -> FrameBuilder {
        let (class_id, method_id) = method.ids();
        FrameBuilder::method(self.channel.number(), class_id, method_id)
    }

    /// Declare an exchange and await `declare-ok`.
    pub async fn declare(
        &self,
        exchange: &str,
        kind: &str,
        passive: bool,
        durable: bool,
        auto_delete: bool,
        internal: bool,
        arguments: Option<&FieldTable>,
    ) -> Result<()> {
        let mut builder = self.request(Method::ExchangeDeclare);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(exchange)?;
        buf.put_short_string(kind)?;
        buf.put_bits(&[passive, durable, auto_delete, internal, false]);
        buf.put_field_table(arguments)?;

        self.channel
            .call(Method::ExchangeDeclareOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Delete an exchange and await `delete-ok`.
    pub async fn delete(&self, exchange: &str, if_unused: bool) -> Result<()> {
        let mut builder = self.request(Method::ExchangeDelete);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(exchange)?;
        buf.put_bits(&[if_unused, false]);

        self.channel
            .call(Method::ExchangeDeleteOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Bind `destination` to `source` and await `bind-ok`.
    pub async fn bind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> Result<()> {
        let mut builder = self.request(Method::ExchangeBind);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(destination)?;
        buf.put_short_string(source)?;
        buf.put_short_string(routing_key)?;
        buf.put_bits(&[false]);
        buf.put_field_table(arguments)?;

        self.channel
            .call(Method::ExchangeBindOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Remove a binding and await `unbind-ok`.
    pub async fn unbind(
        &self,
        destination: &str,
        source: &str,
        routing_key: &str,
        arguments: Option<&FieldTable>,
    ) -> Result<()> {
        let mut builder = self.request(Method::ExchangeUnbind);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(destination)?;
        buf.put_short_string(source)?;
        buf.put_short_string(routing_key)?;
        buf.put_bits(&[false]);
        buf.put_field_table(arguments)?;

        self.channel
            .call(Method::ExchangeUnbindOk, builder.finish())
            .await?;
        Ok(())
    }
}
