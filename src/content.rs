//! Content reassembly for broker-pushed messages.
//!
//! A delivered message arrives as three kinds of frame on one channel:
//! a `basic.deliver` (or `basic.return`) method frame, one content header
//! frame declaring the body size and properties, and zero or more body
//! frames. [`ContentReassembler`] is the per-channel state machine that
//! stitches them back together:
//!
//! ```text
//! Idle ──deliver/return──► AwaitingHeader ──header──► AwaitingBody
//!  ▲                                          │ (size 0)     │ (size reached)
//!  └──────────────────────────────────────────┴──────────────┘
//! ```
//!
//! The protocol guarantees the three-frame sequence is contiguous per
//! channel, so any frame out of that order is a protocol violation and
//! fails the channel - a partially assembled message must never reach a
//! consumer.

use bytes::{Bytes, BytesMut};

use crate::codec::ByteCursor;
use crate::error::{AmqpError, Result};
use crate::methods::class;
use crate::properties::BasicProperties;

/// A fully reassembled broker-to-client delivery.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Bytes,
}

/// A message the broker failed to route, bounced back via `basic.return`.
#[derive(Debug, Clone)]
pub struct ReturnedMessage {
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
    pub properties: BasicProperties,
    pub body: Bytes,
}

/// A completed reassembly, ready for terminal routing.
#[derive(Debug)]
pub enum Assembled {
    Delivery(Delivery),
    Returned(ReturnedMessage),
}

/// The decoded fields of the method frame that opened the sequence.
#[derive(Debug)]
enum Opening {
    Deliver {
        consumer_tag: String,
        delivery_tag: u64,
        redelivered: bool,
        exchange: String,
        routing_key: String,
    },
    Return {
        reply_code: u16,
        reply_text: String,
        exchange: String,
        routing_key: String,
    },
}

impl Opening {
    fn describe(&self) -> &'static str {
        match self {
            Opening::Deliver { .. } => "basic.deliver",
            Opening::Return { .. } => "basic.return",
        }
    }

    fn complete(self, properties: BasicProperties, body: Bytes) -> Assembled {
        match self {
            Opening::Deliver {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            } => Assembled::Delivery(Delivery {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
                properties,
                body,
            }),
            Opening::Return {
                reply_code,
                reply_text,
                exchange,
                routing_key,
            } => Assembled::Returned(ReturnedMessage {
                reply_code,
                reply_text,
                exchange,
                routing_key,
                properties,
                body,
            }),
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    AwaitingHeader {
        opening: Opening,
    },
    AwaitingBody {
        opening: Opening,
        properties: BasicProperties,
        expected: u64,
        body: BytesMut,
    },
}

/// Per-channel content reassembly state machine.
pub struct ContentReassembler {
    state: State,
}

impl ContentReassembler {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Open a reassembly from a `basic.deliver` method frame's arguments.
    pub fn on_deliver(&mut self, arguments: &[u8]) -> Result<()> {
        let mut cursor = ByteCursor::new(arguments);
        let opening = Opening::Deliver {
            consumer_tag: cursor.read_short_string()?,
            delivery_tag: cursor.read_u64()?,
            redelivered: cursor.read_bool()?,
            exchange: cursor.read_short_string()?,
            routing_key: cursor.read_short_string()?,
        };
        self.open(opening)
    }

    /// Open a reassembly from a `basic.return` method frame's arguments.
    pub fn on_return(&mut self, arguments: &[u8]) -> Result<()> {
        let mut cursor = ByteCursor::new(arguments);
        let opening = Opening::Return {
            reply_code: cursor.read_u16()?,
            reply_text: cursor.read_short_string()?,
            exchange: cursor.read_short_string()?,
            routing_key: cursor.read_short_string()?,
        };
        self.open(opening)
    }

    fn open(&mut self, opening: Opening) -> Result<()> {
        let busy = match &self.state {
            State::Idle => None,
            State::AwaitingHeader { opening: open }
            | State::AwaitingBody { opening: open, .. } => Some(open.describe()),
        };

        match busy {
            None => {
                self.state = State::AwaitingHeader { opening };
                Ok(())
            }
            Some(in_progress) => Err(self.violation(format!(
                "{} while {in_progress} is being reassembled",
                opening.describe()
            ))),
        }
    }

    /// Accept the content header frame: class id, weight (reserved), body
    /// size, properties. A zero body size completes the message here.
    pub fn on_header(&mut self, payload: &[u8]) -> Result<Option<Assembled>> {
        let opening = match std::mem::replace(&mut self.state, State::Idle) {
            State::AwaitingHeader { opening } => opening,
            _ => return Err(self.violation("content header out of sequence".into())),
        };

        let mut cursor = ByteCursor::new(payload);
        let class_id = cursor.read_u16()?;
        if class_id != class::BASIC {
            return Err(self.violation(format!(
                "content header for class {class_id}, expected basic"
            )));
        }
        let _weight = cursor.read_u16()?;
        let expected = cursor.read_u64()?;
        let properties = BasicProperties::decode(&mut cursor)?;

        if expected == 0 {
            return Ok(Some(opening.complete(properties, Bytes::new())));
        }

        self.state = State::AwaitingBody {
            opening,
            properties,
            expected,
            body: BytesMut::with_capacity(expected.min(64 * 1024) as usize),
        };
        Ok(None)
    }

    /// Append a body frame; completes the message when the accumulated
    /// length reaches the declared size.
    pub fn on_body(&mut self, payload: &[u8]) -> Result<Option<Assembled>> {
        let (opening, properties, expected, mut body) =
            match std::mem::replace(&mut self.state, State::Idle) {
                State::AwaitingBody {
                    opening,
                    properties,
                    expected,
                    body,
                } => (opening, properties, expected, body),
                _ => return Err(self.violation("content body with no delivery open".into())),
            };

        if body.len() as u64 + payload.len() as u64 > expected {
            return Err(self.violation(format!(
                "content body overflows declared size {expected}"
            )));
        }

        body.extend_from_slice(payload);

        if body.len() as u64 == expected {
            return Ok(Some(opening.complete(properties, body.freeze())));
        }

        self.state = State::AwaitingBody {
            opening,
            properties,
            expected,
            body,
        };
        Ok(None)
    }

    /// Discard any partial reassembly (channel or connection close).
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Whether no reassembly is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Sequence violations poison the slot: the channel is about to be
    /// failed, and a later frame must not resurrect half a message.
    fn violation(&mut self, detail: String) -> AmqpError {
        self.state = State::Idle;
        AmqpError::Protocol(detail)
    }
}

impl Default for ContentReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireWrite;
    use bytes::BufMut;

    fn deliver_args(consumer_tag: &str, delivery_tag: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_short_string(consumer_tag).unwrap();
        buf.put_u64(delivery_tag);
        buf.put_bits(&[false]); // redelivered
        buf.put_short_string("orders").unwrap();
        buf.put_short_string("order.created").unwrap();
        buf.to_vec()
    }

    fn header_payload(body_size: u64) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u16(class::BASIC);
        buf.put_u16(0); // weight
        buf.put_u64(body_size);
        BasicProperties::default().encode(&mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_three_frame_delivery() {
        let mut r = ContentReassembler::new();

        r.on_deliver(&deliver_args("ctag-1", 7)).unwrap();
        assert!(r.on_header(&header_payload(10)).unwrap().is_none());
        assert!(r.on_body(b"hello ").unwrap().is_none());

        let assembled = r.on_body(b"world").unwrap().unwrap();
        let delivery = match assembled {
            Assembled::Delivery(d) => d,
            other => panic!("expected delivery, got {other:?}"),
        };

        assert_eq!(delivery.consumer_tag, "ctag-1");
        assert_eq!(delivery.delivery_tag, 7);
        assert!(!delivery.redelivered);
        assert_eq!(delivery.exchange, "orders");
        assert_eq!(delivery.routing_key, "order.created");
        assert_eq!(&delivery.body[..], b"hello world");
        assert!(r.is_idle());
    }

    #[test]
    fn test_zero_size_body_completes_at_header() {
        let mut r = ContentReassembler::new();
        r.on_deliver(&deliver_args("ctag-1", 1)).unwrap();

        let assembled = r.on_header(&header_payload(0)).unwrap().unwrap();
        match assembled {
            Assembled::Delivery(d) => assert!(d.body.is_empty()),
            other => panic!("expected delivery, got {other:?}"),
        }
        assert!(r.is_idle());
    }

    #[test]
    fn test_body_with_nothing_open_is_violation() {
        let mut r = ContentReassembler::new();
        let err = r.on_body(b"stray").unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
    }

    #[test]
    fn test_header_with_nothing_open_is_violation() {
        let mut r = ContentReassembler::new();
        let err = r.on_header(&header_payload(4)).unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
    }

    #[test]
    fn test_second_deliver_mid_assembly_is_violation() {
        let mut r = ContentReassembler::new();
        r.on_deliver(&deliver_args("ctag-1", 1)).unwrap();
        r.on_header(&header_payload(100)).unwrap();

        let err = r.on_deliver(&deliver_args("ctag-2", 2)).unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
        // Slot poisoned; nothing half-built survives.
        assert!(r.is_idle());
    }

    #[test]
    fn test_body_overflow_is_violation() {
        let mut r = ContentReassembler::new();
        r.on_deliver(&deliver_args("ctag-1", 1)).unwrap();
        r.on_header(&header_payload(4)).unwrap();

        let err = r.on_body(b"too many bytes").unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
        assert!(r.is_idle());
    }

    #[test]
    fn test_wrong_header_class_is_violation() {
        let mut r = ContentReassembler::new();
        r.on_deliver(&deliver_args("ctag-1", 1)).unwrap();

        let mut buf = BytesMut::new();
        buf.put_u16(class::QUEUE);
        buf.put_u16(0);
        buf.put_u64(0);
        buf.put_u16(0);

        let err = r.on_header(&buf).unwrap_err();
        assert!(matches!(err, AmqpError::Protocol(_)));
    }

    #[test]
    fn test_returned_message_shares_reassembly() {
        let mut r = ContentReassembler::new();

        let mut args = BytesMut::new();
        args.put_u16(312);
        args.put_short_string("NO_ROUTE").unwrap();
        args.put_short_string("orders").unwrap();
        args.put_short_string("nowhere").unwrap();

        r.on_return(&args).unwrap();
        r.on_header(&header_payload(4)).unwrap();
        let assembled = r.on_body(b"lost").unwrap().unwrap();

        let returned = match assembled {
            Assembled::Returned(m) => m,
            other => panic!("expected return, got {other:?}"),
        };
        assert_eq!(returned.reply_code, 312);
        assert_eq!(returned.reply_text, "NO_ROUTE");
        assert_eq!(returned.routing_key, "nowhere");
        assert_eq!(&returned.body[..], b"lost");
    }

    #[test]
    fn test_reset_discards_partial_state() {
        let mut r = ContentReassembler::new();
        r.on_deliver(&deliver_args("ctag-1", 1)).unwrap();
        r.on_header(&header_payload(100)).unwrap();
        r.on_body(b"partial").unwrap();

        r.reset();
        assert!(r.is_idle());
        assert!(r.on_body(b"more").is_err());
    }

    #[test]
    fn test_truncated_deliver_arguments_are_malformed() {
        let mut r = ContentReassembler::new();
        let err = r.on_deliver(&[4, b'c', b't']).unwrap_err();
        assert!(matches!(err, AmqpError::MalformedFrame(_)));
        assert!(r.is_idle());
    }
}
