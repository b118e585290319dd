//! Error types for rabbitwire.

use thiserror::Error;

/// Main error type for all protocol engine operations.
#[derive(Debug, Error)]
pub enum AmqpError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-level decode failure (bad length, missing end marker, bad value tag).
    ///
    /// Indicates stream corruption; the connection should be closed.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Unexpected method or out-of-sequence content frame. Closes the channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Registry lookup miss for a (class-id, method-id) pair.
    #[error("unknown method: class {class_id}, method {method_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// A frame exceeded the maximum frame size.
    #[error("frame payload of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: u32, max: u32 },

    /// The channel closed while an operation was outstanding.
    #[error("channel closed")]
    ChannelClosed,

    /// The connection closed while an operation was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("backpressure timeout")]
    BackpressureTimeout,
}

impl AmqpError {
    /// Duplicate an error for fanning one failure out to several pending
    /// calls. `Io` carries a non-cloneable source, so it degrades to
    /// `ConnectionClosed`, which is what every waiter observes anyway.
    pub(crate) fn duplicate(&self) -> AmqpError {
        match self {
            AmqpError::Io(_) => AmqpError::ConnectionClosed,
            AmqpError::MalformedFrame(s) => AmqpError::MalformedFrame(s.clone()),
            AmqpError::Protocol(s) => AmqpError::Protocol(s.clone()),
            AmqpError::UnknownMethod {
                class_id,
                method_id,
            } => AmqpError::UnknownMethod {
                class_id: *class_id,
                method_id: *method_id,
            },
            AmqpError::FrameTooLarge { size, max } => AmqpError::FrameTooLarge {
                size: *size,
                max: *max,
            },
            AmqpError::ChannelClosed => AmqpError::ChannelClosed,
            AmqpError::ConnectionClosed => AmqpError::ConnectionClosed,
            AmqpError::BackpressureTimeout => AmqpError::BackpressureTimeout,
        }
    }
}

/// Result type alias using AmqpError.
pub type Result<T> = std::result::Result<T, AmqpError>;
