//! Per-channel RPC correlation.
//!
//! AMQP channels allow at most one outstanding synchronous method call:
//! the broker answers in order, so the only way to attribute a reply to a
//! call is to never have two calls in flight. [`RpcCorrelator`] enforces
//! that discipline with a single-permit semaphore (fair, FIFO) and a
//! one-shot completion slot the inbound dispatcher resolves.
//!
//! The permit is released when the call *resolves* - reply, mismatch, or
//! close - never when the request frame is merely written. Releasing at
//! send time would let a second request go out while the first reply is
//! still owed, and its reply would be misattributed.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{oneshot, Semaphore};

use crate::error::{AmqpError, Result};
use crate::methods::Method;

/// A call waiting for its reply.
struct PendingCall {
    expected: Method,
    tx: oneshot::Sender<Result<Bytes>>,
}

/// Slot state shared between callers and the dispatcher.
struct Shared {
    pending: Option<PendingCall>,
    /// Set once by `fail_all`; later calls observe it and fail fast.
    closed: Option<AmqpError>,
}

/// What the correlator did with an inbound method frame.
#[derive(Debug)]
pub enum Correlation {
    /// The frame was the awaited reply (or a mismatch, already failed);
    /// the pending call has been resolved.
    Resolved,
    /// No call was pending; the frame is unsolicited and the caller must
    /// route it (delivery, return, channel notification).
    Unsolicited(Bytes),
}

/// The awaiting side of a synchronous call.
///
/// Exactly one resolution arrives: the reply's argument bytes, a decode or
/// ordering failure, or a closed error. Dropping the handle abandons the
/// call without disturbing the channel state.
pub struct PendingReply {
    rx: oneshot::Receiver<Result<Bytes>>,
}

impl PendingReply {
    /// Suspend until the dispatcher resolves this call.
    pub async fn await_reply(self) -> Result<Bytes> {
        match self.rx.await {
            Ok(result) => result,
            // Sender dropped without resolving: the correlator was torn
            // down mid-call.
            Err(_) => Err(AmqpError::ChannelClosed),
        }
    }
}

/// Single-flight synchronous-call state machine for one channel.
pub struct RpcCorrelator {
    gate: Arc<Semaphore>,
    shared: Mutex<Shared>,
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(1)),
            shared: Mutex::new(Shared {
                pending: None,
                closed: None,
            }),
        }
    }

    /// Begin a synchronous call expecting `expected` as its reply.
    ///
    /// Suspends until the channel is idle (no other call in flight), then
    /// records the expectation and returns the [`PendingReply`] to await.
    /// Fails with the close reason if the channel has been failed.
    pub async fn begin_call(&self, expected: Method) -> Result<PendingReply> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| self.close_reason())?;
        permit.forget();

        let (tx, rx) = oneshot::channel();
        {
            let mut shared = self.shared.lock().unwrap();
            if let Some(reason) = &shared.closed {
                // Closed between acquire and record; the gate stays shut.
                return Err(reason.duplicate());
            }
            debug_assert!(shared.pending.is_none(), "gate admitted a second call");
            shared.pending = Some(PendingCall { expected, tx });
        }

        Ok(PendingReply { rx })
    }

    /// Feed an inbound method frame through the correlator.
    ///
    /// Idle channels treat every method as unsolicited. A matching reply
    /// resolves the pending call with its argument bytes. A mismatched
    /// method is a protocol-ordering violation: the pending call fails,
    /// the channel returns to idle, and the violation is surfaced to the
    /// dispatcher so it can fail the channel.
    pub fn on_method(&self, method: Method, arguments: Bytes) -> Result<Correlation> {
        let taken = {
            let mut shared = self.shared.lock().unwrap();
            if shared.pending.is_none() {
                return Ok(Correlation::Unsolicited(arguments));
            }
            shared.pending.take()
        };

        let call = taken.expect("pending call vanished under lock");
        if call.expected == method {
            let _ = call.tx.send(Ok(arguments));
            self.release();
            Ok(Correlation::Resolved)
        } else {
            let violation = format!(
                "awaiting {}, broker sent {}",
                call.expected.name(),
                method.name()
            );
            let _ = call.tx.send(Err(AmqpError::Protocol(violation.clone())));
            self.release();
            Err(AmqpError::Protocol(violation))
        }
    }

    /// Abandon the pending call without resolving it with a value.
    ///
    /// Used when the request frame never reached the wire: the caller
    /// keeps its send error and the channel returns to idle.
    pub fn cancel_pending(&self) {
        let taken = self.shared.lock().unwrap().pending.take();
        if taken.is_some() {
            self.release();
        }
    }

    /// Fail the pending call (if any) and every future call with `reason`.
    ///
    /// Called on channel or connection close. Idempotent: the first reason
    /// wins, later invocations are no-ops.
    pub fn fail_all(&self, reason: AmqpError) {
        let taken = {
            let mut shared = self.shared.lock().unwrap();
            if shared.closed.is_some() {
                return;
            }
            shared.closed = Some(reason.duplicate());
            shared.pending.take()
        };

        // Wake every caller queued on the gate.
        self.gate.close();

        if let Some(call) = taken {
            let _ = call.tx.send(Err(reason));
        }
    }

    /// Whether no call is currently awaiting a reply.
    pub fn is_idle(&self) -> bool {
        self.shared.lock().unwrap().pending.is_none()
    }

    fn release(&self) {
        let shared = self.shared.lock().unwrap();
        if shared.closed.is_none() {
            self.gate.add_permits(1);
        }
    }

    fn close_reason(&self) -> AmqpError {
        self.shared
            .lock()
            .unwrap()
            .closed
            .as_ref()
            .map(AmqpError::duplicate)
            .unwrap_or(AmqpError::ChannelClosed)
    }
}

impl Default for RpcCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
