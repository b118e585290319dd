//! Protocol class façades.
//!
//! Thin request/response wrappers over the channel's codec, correlator,
//! and writer. Each operation encodes one method frame, registers its
//! expected reply, and decodes the reply arguments. `basic.publish` and
//! `basic.ack` are fire-and-forget and never touch the correlator.

mod basic;
mod exchange;
mod queue;

pub use basic::{BasicOps, Consumer};
pub use exchange::ExchangeOps;
pub use queue::{QueueDeclareOk, QueueOps};
