//! Inbound frame dispatch.
//!
//! One task owns the connection's read half: it pulls bytes off the
//! stream, extracts frames through the [`FrameBuffer`], and routes each
//! frame to its channel. Channel 0 carries connection-level traffic
//! (heartbeats, `connection.close`); everything else goes to a registered
//! [`Channel`].
//!
//! This single-task design is what serializes per-channel state: each
//! channel's correlator and reassembler are only ever driven from here,
//! and reply handling never re-enters a channel's call gate.
//!
//! Failure policy, per error kind:
//! - `MalformedFrame` / `FrameTooLarge` / I/O errors poison the stream:
//!   the loop stops and every channel fails with the connection error.
//! - `Protocol` violations are scoped to the offending channel, which is
//!   closed while the connection keeps running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::channel::Channel;
use crate::codec::ByteCursor;
use crate::error::{AmqpError, Result};
use crate::methods::Method;
use crate::protocol::{Frame, FrameBuffer, FrameKind, DEFAULT_MAX_FRAME_SIZE};

/// Routes inbound frames to per-channel engines.
#[derive(Clone)]
pub struct Dispatcher {
    channels: Arc<Mutex<HashMap<u16, Channel>>>,
    max_frame_size: u32,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            max_frame_size,
        }
    }

    /// Register a channel as the dispatch target for its number.
    pub fn attach(&self, channel: &Channel) {
        self.channels
            .lock()
            .unwrap()
            .insert(channel.number(), channel.clone());
    }

    /// Remove a channel from dispatch.
    pub fn detach(&self, number: u16) {
        self.channels.lock().unwrap().remove(&number);
    }

    /// Drive the read loop until EOF or a connection-fatal error.
    ///
    /// On exit - clean or not - every attached channel is failed, so no
    /// pending call and no partial reassembly outlives the stream.
    pub async fn run<R>(&self, mut reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let result = self.pump(&mut reader).await;

        let reason = match &result {
            Ok(()) => AmqpError::ConnectionClosed,
            Err(e) => e.duplicate(),
        };
        self.fail_all_channels(reason);

        result
    }

    async fn pump<R>(&self, reader: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_frame_size(self.max_frame_size);
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                // Clean EOF.
                return Ok(());
            }

            for frame in frame_buffer.push(&buf[..n])? {
                self.dispatch(frame)?;
            }
        }
    }

    /// Route one frame. Returns `Err` only for connection-fatal
    /// conditions; per-channel violations close the channel here.
    fn dispatch(&self, frame: Frame) -> Result<()> {
        if frame.channel() == 0 {
            return self.on_connection_frame(frame);
        }

        let channel = self
            .channels
            .lock()
            .unwrap()
            .get(&frame.channel())
            .cloned();

        let channel = match channel {
            Some(c) => c,
            None => {
                // A frame for a channel nobody opened means request and
                // reply streams no longer line up.
                return Err(AmqpError::Protocol(format!(
                    "frame for unknown channel {}",
                    frame.channel()
                )));
            }
        };

        if let Err(e) = channel.handle_frame(frame) {
            match e {
                AmqpError::MalformedFrame(_) | AmqpError::FrameTooLarge { .. } | AmqpError::Io(_) => {
                    return Err(e)
                }
                violation => {
                    tracing::warn!(
                        channel = channel.number(),
                        error = %violation,
                        "channel failed"
                    );
                    channel.close_with(violation);
                    self.detach(channel.number());
                }
            }
        }
        Ok(())
    }

    /// Connection-level frames. Negotiation and heartbeat scheduling are
    /// the transport's concern; the engine only has to recognize a close
    /// and keep heartbeats from looking like violations.
    fn on_connection_frame(&self, frame: Frame) -> Result<()> {
        match frame.kind() {
            FrameKind::Heartbeat => Ok(()),
            FrameKind::Method => {
                let mut cursor = ByteCursor::new(frame.payload());
                let class_id = cursor.read_u16()?;
                let method_id = cursor.read_u16()?;
                match Method::from_ids(class_id, method_id)? {
                    Method::ConnectionClose => {
                        let reply_code = cursor.read_u16()?;
                        let reply_text = cursor.read_short_string()?;
                        tracing::warn!(reply_code, reply_text = %reply_text, "broker closed connection");
                        Err(AmqpError::ConnectionClosed)
                    }
                    Method::ConnectionCloseOk => Ok(()),
                    other => Err(AmqpError::Protocol(format!(
                        "unexpected connection-level method {}",
                        other.name()
                    ))),
                }
            }
            other => Err(AmqpError::Protocol(format!(
                "{other:?} frame on channel 0"
            ))),
        }
    }

    fn fail_all_channels(&self, reason: AmqpError) {
        let channels: Vec<Channel> = self.channels.lock().unwrap().drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.close_with(reason.duplicate());
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
