//! Per-channel protocol engine.
//!
//! A [`Channel`] owns the RPC correlator, the content reassembler, and the
//! consumer registry for one channel number, and is the dispatch target
//! for every inbound frame on that channel. The class operations
//! (exchange/queue/basic) hang off it as thin façades.
//!
//! Frame processing for a channel is serialized: the dispatcher task is
//! the only caller of [`handle_frame`](Channel::handle_frame), so channel
//! state never sees concurrent mutation. Callers on the request side only
//! touch the correlator's gate, which is its own synchronization point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::classes::{BasicOps, ExchangeOps, QueueOps};
use crate::codec::{ByteCursor, FrameBuilder};
use crate::consumer::ConsumerRegistry;
use crate::content::{Assembled, ContentReassembler, ReturnedMessage};
use crate::error::{AmqpError, Result};
use crate::methods::Method;
use crate::protocol::{Frame, FrameKind, DEFAULT_MAX_FRAME_SIZE};
use crate::rpc::{Correlation, RpcCorrelator};
use crate::writer::{OutboundFrame, WriterHandle};

struct ChannelInner {
    number: u16,
    writer: WriterHandle,
    max_frame_size: u32,
    rpc: RpcCorrelator,
    content: Mutex<ContentReassembler>,
    consumers: ConsumerRegistry,
    closed: AtomicBool,
}

/// One logical AMQP channel multiplexed over the connection.
///
/// Cheaply cloneable; clones share the same channel state. Channel-open
/// negotiation is the transport layer's job - a `Channel` assumes its
/// number is already open on the broker.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel bound to a connection's writer.
    pub fn new(number: u16, writer: WriterHandle) -> Self {
        Self::with_max_frame_size(number, writer, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a channel with a specific negotiated frame size.
    pub fn with_max_frame_size(number: u16, writer: WriterHandle, max_frame_size: u32) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                number,
                writer,
                max_frame_size,
                rpc: RpcCorrelator::new(),
                content: Mutex::new(ContentReassembler::new()),
                consumers: ConsumerRegistry::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The channel number.
    #[inline]
    pub fn number(&self) -> u16 {
        self.inner.number
    }

    /// Exchange-class operations on this channel.
    pub fn exchange(&self) -> ExchangeOps<'_> {
        ExchangeOps::new(self)
    }

    /// Queue-class operations on this channel.
    pub fn queue(&self) -> QueueOps<'_> {
        QueueOps::new(self)
    }

    /// Basic-class operations on this channel.
    pub fn basic(&self) -> BasicOps<'_> {
        BasicOps::new(self)
    }

    /// Stream of `basic.return` bounces (mandatory publishes the broker
    /// could not route).
    pub fn returns(&self) -> mpsc::UnboundedReceiver<ReturnedMessage> {
        self.inner.consumers.returns()
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the channel locally: fail the pending call, discard any
    /// partial reassembly, drop consumer registrations.
    pub fn close(&self) {
        self.close_with(AmqpError::ChannelClosed);
    }

    pub(crate) fn close_with(&self, reason: AmqpError) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(channel = self.inner.number, %reason, "channel closed");
        self.inner.rpc.fail_all(reason);
        self.inner.content.lock().unwrap().reset();
        self.inner.consumers.clear();
    }

    /// Process one inbound frame for this channel.
    ///
    /// Called from the connection's dispatch task; returns the protocol
    /// violation if the frame is unacceptable, leaving close policy to
    /// the caller.
    pub fn handle_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            tracing::debug!(channel = self.inner.number, "frame for closed channel dropped");
            return Ok(());
        }

        match frame.kind() {
            FrameKind::Method => self.handle_method(frame.payload),
            FrameKind::Header => {
                let assembled = self.inner.content.lock().unwrap().on_header(&frame.payload)?;
                self.route_assembled(assembled);
                Ok(())
            }
            FrameKind::Body => {
                let assembled = self.inner.content.lock().unwrap().on_body(&frame.payload)?;
                self.route_assembled(assembled);
                Ok(())
            }
            FrameKind::Heartbeat => Err(AmqpError::Protocol(format!(
                "heartbeat on channel {}",
                self.inner.number
            ))),
        }
    }

    fn handle_method(&self, payload: Bytes) -> Result<()> {
        let mut cursor = ByteCursor::new(&payload);
        let class_id = cursor.read_u16()?;
        let method_id = cursor.read_u16()?;
        let method = Method::from_ids(class_id, method_id)?;
        let arguments = payload.slice(4..);

        if method.starts_content() {
            let mut content = self.inner.content.lock().unwrap();
            return match method {
                Method::BasicDeliver => content.on_deliver(&arguments),
                Method::BasicReturn => content.on_return(&arguments),
                _ => unreachable!("starts_content covers deliver and return"),
            };
        }

        if method.is_control() {
            return self.handle_control(method, &arguments);
        }

        match self.inner.rpc.on_method(method, arguments)? {
            Correlation::Resolved => Ok(()),
            Correlation::Unsolicited(_) => Err(AmqpError::Protocol(format!(
                "unsolicited {} with no call pending",
                method.name()
            ))),
        }
    }

    /// Channel-level control methods. Lifecycle negotiation lives in the
    /// transport layer; here a broker-initiated close tears down local
    /// state and acknowledges, so no caller is left suspended.
    fn handle_control(&self, method: Method, arguments: &[u8]) -> Result<()> {
        match method {
            Method::ChannelClose => {
                let mut cursor = ByteCursor::new(arguments);
                let reply_code = cursor.read_u16()?;
                let reply_text = cursor.read_short_string()?;
                tracing::warn!(
                    channel = self.inner.number,
                    reply_code,
                    reply_text = %reply_text,
                    "broker closed channel"
                );

                // Best effort: the broker is waiting for close-ok.
                let ok = FrameBuilder::method(
                    self.inner.number,
                    Method::ChannelCloseOk.ids().0,
                    Method::ChannelCloseOk.ids().1,
                )
                .finish();
                let _ = self.inner.writer.try_send(OutboundFrame::single(ok));

                self.close_with(AmqpError::ChannelClosed);
                Ok(())
            }
            Method::ChannelCloseOk => {
                tracing::debug!(channel = self.inner.number, "channel.close-ok");
                self.close_with(AmqpError::ChannelClosed);
                Ok(())
            }
            other => {
                tracing::warn!(
                    channel = self.inner.number,
                    method = other.name(),
                    "unsupported control method ignored"
                );
                Ok(())
            }
        }
    }

    fn route_assembled(&self, assembled: Option<Assembled>) {
        match assembled {
            Some(Assembled::Delivery(delivery)) => {
                self.inner.consumers.route_delivery(delivery);
            }
            Some(Assembled::Returned(returned)) => {
                self.inner.consumers.route_return(returned);
            }
            None => {}
        }
    }

    // Internals shared by the class façades.

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(AmqpError::ChannelClosed);
        }
        Ok(())
    }

    /// Run one synchronous call: gate, send, await the reply's arguments.
    ///
    /// If the request frame never reaches the writer the pending slot is
    /// rolled back so the channel returns to idle.
    pub(crate) async fn call(&self, expected: Method, request: Bytes) -> Result<Bytes> {
        self.ensure_open()?;
        let pending = self.inner.rpc.begin_call(expected).await?;

        if let Err(e) = self.inner.writer.send(OutboundFrame::single(request)).await {
            self.inner.rpc.cancel_pending();
            return Err(e);
        }

        pending.await_reply().await
    }

    /// Send without expecting a reply (publish, ack).
    pub(crate) async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.ensure_open()?;
        self.inner.writer.send(frame).await
    }

    pub(crate) fn consumers(&self) -> &ConsumerRegistry {
        &self.inner.consumers
    }

    pub(crate) fn max_frame_size(&self) -> u32 {
        self.inner.max_frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireWrite;
    use crate::methods::class;
    use crate::properties::BasicProperties;
    use crate::protocol::FrameHeader;
    use crate::writer::{spawn_writer_task, WriterConfig};
    use bytes::{BufMut, BytesMut};
    use tokio::io::duplex;

    fn test_channel() -> Channel {
        let (tx_side, _rx_side) = duplex(64 * 1024);
        let (writer, _task) = spawn_writer_task(tx_side, WriterConfig::default());
        Channel::new(1, writer)
    }

    fn method_frame(channel: u16, method: Method, arguments: &[u8]) -> Frame {
        let (class_id, method_id) = method.ids();
        let mut payload = BytesMut::new();
        payload.put_u16(class_id);
        payload.put_u16(method_id);
        payload.put_slice(arguments);
        Frame::new(
            FrameHeader::new(FrameKind::Method, channel, payload.len() as u32),
            payload.freeze(),
        )
    }

    fn deliver_frames(channel: u16, consumer_tag: &str, body: &[u8]) -> Vec<Frame> {
        let mut args = BytesMut::new();
        args.put_short_string(consumer_tag).unwrap();
        args.put_u64(41);
        args.put_bits(&[false]);
        args.put_short_string("ex").unwrap();
        args.put_short_string("rk").unwrap();

        let mut header = BytesMut::new();
        header.put_u16(class::BASIC);
        header.put_u16(0);
        header.put_u64(body.len() as u64);
        BasicProperties::default().encode(&mut header).unwrap();

        vec![
            method_frame(channel, Method::BasicDeliver, &args),
            Frame::new(
                FrameHeader::new(FrameKind::Header, channel, header.len() as u32),
                header.freeze(),
            ),
            Frame::new(
                FrameHeader::new(FrameKind::Body, channel, body.len() as u32),
                Bytes::copy_from_slice(body),
            ),
        ]
    }

    #[tokio::test]
    async fn test_delivery_reaches_registered_consumer() {
        let channel = test_channel();
        let mut deliveries = channel.consumers().register("ctag-7");

        for frame in deliver_frames(1, "ctag-7", b"payload") {
            channel.handle_frame(frame).unwrap();
        }

        let delivery = deliveries.recv().await.unwrap();
        assert_eq!(delivery.delivery_tag, 41);
        assert_eq!(&delivery.body[..], b"payload");
    }

    #[tokio::test]
    async fn test_unknown_method_is_surfaced() {
        let channel = test_channel();
        let mut payload = BytesMut::new();
        payload.put_u16(40);
        payload.put_u16(99);
        let frame = Frame::new(
            FrameHeader::new(FrameKind::Method, 1, 4),
            payload.freeze(),
        );

        let err = channel.handle_frame(frame).unwrap_err();
        assert!(matches!(err, AmqpError::UnknownMethod { .. }));
    }

    #[tokio::test]
    async fn test_body_frame_while_idle_is_violation() {
        let channel = test_channel();
        let frame = Frame::new(
            FrameHeader::new(FrameKind::Body, 1, 4),
            Bytes::from_static(b"oops"),
        );
        let err = channel.handle_frame(frame).unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_heartbeat_on_channel_is_violation() {
        let channel = test_channel();
        let frame = Frame::new(FrameHeader::new(FrameKind::Heartbeat, 1, 0), Bytes::new());
        assert!(channel.handle_frame(frame).is_err());
    }

    #[tokio::test]
    async fn test_unsolicited_reply_is_violation() {
        let channel = test_channel();
        let frame = method_frame(1, Method::ExchangeDeclareOk, &[]);
        let err = channel.handle_frame(frame).unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_broker_close_fails_channel() {
        let channel = test_channel();

        let mut args = BytesMut::new();
        args.put_u16(406);
        args.put_short_string("PRECONDITION_FAILED").unwrap();
        args.put_u16(0);
        args.put_u16(0);

        channel
            .handle_frame(method_frame(1, Method::ChannelClose, &args))
            .unwrap();

        assert!(channel.is_closed());
        assert!(matches!(
            channel.ensure_open(),
            Err(AmqpError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_frames_after_close_are_dropped() {
        let channel = test_channel();
        channel.close();

        // Would be a violation on an open channel.
        let frame = Frame::new(
            FrameHeader::new(FrameKind::Body, 1, 1),
            Bytes::from_static(b"x"),
        );
        assert!(channel.handle_frame(frame).is_ok());
    }
}
