//! Basic-class operations.
//!
//! The content-bearing class: qos/consume/cancel/recover are ordinary
//! synchronous calls, while publish and ack are fire-and-forget. Publish
//! splits its content across a method frame, a header frame, and as many
//! body frames as the frame-size limit requires, submitted to the writer
//! as one contiguous unit.

use bytes::{BufMut, Bytes};
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::codec::{ByteCursor, FieldTable, FrameBuilder, WireWrite};
use crate::content::Delivery;
use crate::error::Result;
use crate::methods::{class, Method};
use crate::properties::BasicProperties;
use crate::protocol::FrameKind;
use crate::writer::OutboundFrame;

/// A live consumer: the server-assigned tag and the delivery stream.
pub struct Consumer {
    pub tag: String,
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
}

/// Basic operations on one channel.
pub struct BasicOps<'a> {
    channel: &'a Channel,
}

impl<'a> BasicOps<'a> {
    pub(crate) fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    fn request(&self, method: Method) -> FrameBuilder {
        let (class_id, method_id) = method.ids();
        FrameBuilder::method(self.channel.number(), class_id, method_id)
    }

    /// Set prefetch limits and await `qos-ok`.
    pub async fn qos(&self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Result<()> {
        let mut builder = self.request(Method::BasicQos);
        let buf = builder.buffer();
        buf.put_u32(prefetch_size);
        buf.put_u16(prefetch_count);
        buf.put_bits(&[global]);

        self.channel
            .call(Method::BasicQosOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Start a consumer and await `consume-ok`.
    ///
    /// The returned [`Consumer`] carries the server-assigned tag (the
    /// requested one, or generated when empty) and the stream that
    /// reassembled deliveries for that tag arrive on.
    pub async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        no_local: bool,
        auto_ack: bool,
        exclusive: bool,
        arguments: Option<&FieldTable>,
    ) -> Result<Consumer> {
        let mut builder = self.request(Method::BasicConsume);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(queue)?;
        buf.put_short_string(consumer_tag)?;
        buf.put_bits(&[no_local, auto_ack, exclusive, false]);
        buf.put_field_table(arguments)?;

        let reply = self
            .channel
            .call(Method::BasicConsumeOk, builder.finish())
            .await?;

        let tag = ByteCursor::new(&reply).read_short_string()?;
        let deliveries = self.channel.consumers().register(&tag);
        Ok(Consumer { tag, deliveries })
    }

    /// Cancel a consumer and await `cancel-ok`; returns the tag.
    pub async fn cancel(&self, consumer_tag: &str) -> Result<String> {
        let mut builder = self.request(Method::BasicCancel);
        let buf = builder.buffer();
        buf.put_short_string(consumer_tag)?;
        buf.put_bits(&[false]);

        let reply = self
            .channel
            .call(Method::BasicCancelOk, builder.finish())
            .await?;

        let tag = ByteCursor::new(&reply).read_short_string()?;
        self.channel.consumers().deregister(&tag);
        Ok(tag)
    }

    /// Redeliver unacknowledged messages and await `recover-ok`.
    pub async fn recover(&self, requeue: bool) -> Result<()> {
        let mut builder = self.request(Method::BasicRecover);
        builder.buffer().put_bits(&[requeue]);

        self.channel
            .call(Method::BasicRecoverOk, builder.finish())
            .await?;
        Ok(())
    }

    /// Acknowledge a delivery. Fire-and-forget.
    pub async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        let mut builder = self.request(Method::BasicAck);
        let buf = builder.buffer();
        buf.put_u64(delivery_tag);
        buf.put_bits(&[multiple]);

        self.channel
            .send(OutboundFrame::single(builder.finish()))
            .await
    }

    /// Publish a message. Fire-and-forget: no reply exists, so the
    /// correlator is never involved.
    ///
    /// An unroutable message published with `mandatory` comes back as a
    /// `basic.return`; install the channel's return hook to observe it.
    pub async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        immediate: bool,
        properties: &BasicProperties,
        body: &[u8],
    ) -> Result<()> {
        let channel_number = self.channel.number();

        let mut builder = self.request(Method::BasicPublish);
        let buf = builder.buffer();
        buf.put_u16(0); // reserved
        buf.put_short_string(exchange)?;
        buf.put_short_string(routing_key)?;
        buf.put_bits(&[mandatory, immediate]);
        let method_frame = builder.finish();

        let mut builder = FrameBuilder::new(FrameKind::Header, channel_number);
        let buf = builder.buffer();
        buf.put_u16(class::BASIC);
        buf.put_u16(0); // weight
        buf.put_u64(body.len() as u64);
        properties.encode(buf)?;
        let header_frame = builder.finish();

        let mut frames = vec![method_frame, header_frame];
        frames.extend(body_frames(channel_number, self.channel.max_frame_size(), body));

        self.channel.send(OutboundFrame::group(frames)).await
    }
}

/// Split a body across frames honoring the frame-size limit.
fn body_frames(channel: u16, max_frame_size: u32, body: &[u8]) -> Vec<Bytes> {
    body.chunks(max_frame_size as usize)
        .map(|chunk| {
            let mut builder = FrameBuilder::new(FrameKind::Body, channel);
            builder.buffer().put_slice(chunk);
            builder.finish()
        })
        .collect()
}
