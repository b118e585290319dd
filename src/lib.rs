//! # rabbitwire
//!
//! Client-side AMQP 0-9-1 protocol engine, as spoken by RabbitMQ.
//!
//! This crate covers the protocol itself, not the socket: the frame and
//! value codec, the per-channel synchronous-call correlation, and the
//! reassembly of deliveries split across method/header/body frames. The
//! transport (TCP/TLS, connect, negotiation, heartbeat scheduling) is the
//! caller's, which hands the engine a split duplex stream.
//!
//! ## Architecture
//!
//! - **Outbound**: class operations encode method frames and submit them
//!   to a dedicated writer task that owns the write half, so frames from
//!   concurrent channels never interleave mid-frame.
//! - **Inbound**: a [`Dispatcher`] owns the read half, extracts frames,
//!   and drives each channel's correlator and content reassembler.
//! - **Per channel**: at most one synchronous call is in flight at a
//!   time; replies are matched to the call that expects them, and broker
//!   pushes are reassembled and routed to consumers by tag.
//!
//! ## Example
//!
//! ```ignore
//! use rabbitwire::{Channel, Dispatcher};
//! use rabbitwire::writer::{spawn_writer_task, WriterConfig};
//!
//! #[tokio::main]
//! async fn main() -> rabbitwire::Result<()> {
//!     // `stream` is a negotiated AMQP connection from your transport.
//!     let (read_half, write_half) = tokio::io::split(stream);
//!
//!     let (writer, _writer_task) = spawn_writer_task(write_half, WriterConfig::default());
//!     let dispatcher = Dispatcher::new();
//!
//!     let channel = Channel::new(1, writer);
//!     dispatcher.attach(&channel);
//!     tokio::spawn({
//!         let dispatcher = dispatcher.clone();
//!         async move { dispatcher.run(read_half).await }
//!     });
//!
//!     channel
//!         .exchange()
//!         .declare("events", "fanout", false, true, false, false, None)
//!         .await?;
//!
//!     let mut consumer = channel
//!         .basic()
//!         .consume("inbox", "", false, true, false, None)
//!         .await?;
//!     while let Some(delivery) = consumer.deliveries.recv().await {
//!         println!("got {} bytes", delivery.body.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod classes;
pub mod codec;
pub mod consumer;
pub mod content;
pub mod dispatcher;
pub mod error;
pub mod methods;
pub mod properties;
pub mod protocol;
pub mod rpc;
pub mod writer;

pub use channel::Channel;
pub use classes::{Consumer, QueueDeclareOk};
pub use codec::{FieldTable, FieldValue};
pub use content::{Delivery, ReturnedMessage};
pub use dispatcher::Dispatcher;
pub use error::{AmqpError, Result};
pub use methods::Method;
pub use properties::BasicProperties;
