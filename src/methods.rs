//! Static method registry.
//!
//! Maps `(class-id, method-id)` pairs to the operation they represent and
//! back. This is immutable process-wide data; both the encode path (class
//! operations stamping outgoing frames) and the decode path (the inbound
//! dispatcher classifying frames) go through it. A lookup miss is an
//! [`UnknownMethod`](crate::error::AmqpError::UnknownMethod) protocol
//! error, never a silent drop.

use crate::error::{AmqpError, Result};

/// Protocol class identifiers.
pub mod class {
    pub const CONNECTION: u16 = 10;
    pub const CHANNEL: u16 = 20;
    pub const EXCHANGE: u16 = 40;
    pub const QUEUE: u16 = 50;
    pub const BASIC: u16 = 60;
}

/// Which side of the wire originates a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Caller-initiated request.
    Client,
    /// Broker-initiated reply or notification.
    Server,
}

/// Every protocol method this engine knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ConnectionClose,
    ConnectionCloseOk,
    ChannelOpen,
    ChannelOpenOk,
    ChannelFlow,
    ChannelFlowOk,
    ChannelClose,
    ChannelCloseOk,
    ExchangeDeclare,
    ExchangeDeclareOk,
    ExchangeDelete,
    ExchangeDeleteOk,
    ExchangeBind,
    ExchangeBindOk,
    ExchangeUnbind,
    ExchangeUnbindOk,
    QueueDeclare,
    QueueDeclareOk,
    QueueBind,
    QueueBindOk,
    QueuePurge,
    QueuePurgeOk,
    QueueDelete,
    QueueDeleteOk,
    QueueUnbind,
    QueueUnbindOk,
    BasicQos,
    BasicQosOk,
    BasicConsume,
    BasicConsumeOk,
    BasicCancel,
    BasicCancelOk,
    BasicPublish,
    BasicReturn,
    BasicDeliver,
    BasicAck,
    BasicRecoverAsync,
    BasicRecover,
    BasicRecoverOk,
}

/// One row of the registry: ids, operation, wire name, origin.
type Entry = (u16, u16, Method, &'static str, Origin);

/// The full (class-id, method-id) table, in protocol order.
const REGISTRY: &[Entry] = &[
    (class::CONNECTION, 50, Method::ConnectionClose, "connection.close", Origin::Client),
    (class::CONNECTION, 51, Method::ConnectionCloseOk, "connection.close-ok", Origin::Server),
    (class::CHANNEL, 10, Method::ChannelOpen, "channel.open", Origin::Client),
    (class::CHANNEL, 11, Method::ChannelOpenOk, "channel.open-ok", Origin::Server),
    (class::CHANNEL, 20, Method::ChannelFlow, "channel.flow", Origin::Client),
    (class::CHANNEL, 21, Method::ChannelFlowOk, "channel.flow-ok", Origin::Server),
    (class::CHANNEL, 40, Method::ChannelClose, "channel.close", Origin::Client),
    (class::CHANNEL, 41, Method::ChannelCloseOk, "channel.close-ok", Origin::Server),
    (class::EXCHANGE, 10, Method::ExchangeDeclare, "exchange.declare", Origin::Client),
    (class::EXCHANGE, 11, Method::ExchangeDeclareOk, "exchange.declare-ok", Origin::Server),
    (class::EXCHANGE, 20, Method::ExchangeDelete, "exchange.delete", Origin::Client),
    (class::EXCHANGE, 21, Method::ExchangeDeleteOk, "exchange.delete-ok", Origin::Server),
    (class::EXCHANGE, 30, Method::ExchangeBind, "exchange.bind", Origin::Client),
    (class::EXCHANGE, 31, Method::ExchangeBindOk, "exchange.bind-ok", Origin::Server),
    (class::EXCHANGE, 40, Method::ExchangeUnbind, "exchange.unbind", Origin::Client),
    (class::EXCHANGE, 51, Method::ExchangeUnbindOk, "exchange.unbind-ok", Origin::Server),
    (class::QUEUE, 10, Method::QueueDeclare, "queue.declare", Origin::Client),
    (class::QUEUE, 11, Method::QueueDeclareOk, "queue.declare-ok", Origin::Server),
    (class::QUEUE, 20, Method::QueueBind, "queue.bind", Origin::Client),
    (class::QUEUE, 21, Method::QueueBindOk, "queue.bind-ok", Origin::Server),
    (class::QUEUE, 30, Method::QueuePurge, "queue.purge", Origin::Client),
    (class::QUEUE, 31, Method::QueuePurgeOk, "queue.purge-ok", Origin::Server),
    (class::QUEUE, 40, Method::QueueDelete, "queue.delete", Origin::Client),
    (class::QUEUE, 41, Method::QueueDeleteOk, "queue.delete-ok", Origin::Server),
    (class::QUEUE, 50, Method::QueueUnbind, "queue.unbind", Origin::Client),
    (class::QUEUE, 51, Method::QueueUnbindOk, "queue.unbind-ok", Origin::Server),
    (class::BASIC, 10, Method::BasicQos, "basic.qos", Origin::Client),
    (class::BASIC, 11, Method::BasicQosOk, "basic.qos-ok", Origin::Server),
    (class::BASIC, 20, Method::BasicConsume, "basic.consume", Origin::Client),
    (class::BASIC, 21, Method::BasicConsumeOk, "basic.consume-ok", Origin::Server),
    (class::BASIC, 30, Method::BasicCancel, "basic.cancel", Origin::Client),
    (class::BASIC, 31, Method::BasicCancelOk, "basic.cancel-ok", Origin::Server),
    (class::BASIC, 40, Method::BasicPublish, "basic.publish", Origin::Client),
    (class::BASIC, 50, Method::BasicReturn, "basic.return", Origin::Server),
    (class::BASIC, 60, Method::BasicDeliver, "basic.deliver", Origin::Server),
    (class::BASIC, 80, Method::BasicAck, "basic.ack", Origin::Client),
    (class::BASIC, 100, Method::BasicRecoverAsync, "basic.recover-async", Origin::Client),
    (class::BASIC, 110, Method::BasicRecover, "basic.recover", Origin::Client),
    (class::BASIC, 111, Method::BasicRecoverOk, "basic.recover-ok", Origin::Server),
];

impl Method {
    /// Look up a method by its wire identifiers.
    pub fn from_ids(class_id: u16, method_id: u16) -> Result<Method> {
        REGISTRY
            .iter()
            .find(|(c, m, ..)| *c == class_id && *m == method_id)
            .map(|(_, _, method, ..)| *method)
            .ok_or(AmqpError::UnknownMethod {
                class_id,
                method_id,
            })
    }

    fn entry(self) -> &'static Entry {
        // Every variant has exactly one registry row.
        REGISTRY
            .iter()
            .find(|(_, _, method, ..)| *method == self)
            .expect("method missing from registry")
    }

    /// The `(class-id, method-id)` pair for this method.
    pub fn ids(self) -> (u16, u16) {
        let (class_id, method_id, ..) = *self.entry();
        (class_id, method_id)
    }

    /// The protocol name, e.g. `"exchange.declare"`.
    pub fn name(self) -> &'static str {
        self.entry().3
    }

    /// Whether this method is caller-initiated or broker-initiated.
    pub fn origin(self) -> Origin {
        self.entry().4
    }

    /// Content-bearing unsolicited methods, which open a
    /// Deliver/Return → Header → Body reassembly sequence.
    pub fn starts_content(self) -> bool {
        matches!(self, Method::BasicDeliver | Method::BasicReturn)
    }

    /// Channel- and connection-level control methods, routed to close
    /// handling rather than the RPC correlator.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Method::ConnectionClose
                | Method::ConnectionCloseOk
                | Method::ChannelClose
                | Method::ChannelCloseOk
                | Method::ChannelFlow
                | Method::ChannelFlowOk
        )
    }
}
