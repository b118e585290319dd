//! Delivery routing by consumer tag.
//!
//! `basic.consume` associates a channel with a consumer tag; every
//! delivery the broker pushes names the tag it belongs to. The registry
//! hands each assembled delivery to the matching consumer's channel, and
//! optionally routes `basic.return` bounces to a returned-message hook.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::content::{Delivery, ReturnedMessage};

/// Per-channel consumer registry.
pub struct ConsumerRegistry {
    consumers: Mutex<HashMap<String, mpsc::UnboundedSender<Delivery>>>,
    returns: Mutex<Option<mpsc::UnboundedSender<ReturnedMessage>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self {
            consumers: Mutex::new(HashMap::new()),
            returns: Mutex::new(None),
        }
    }

    /// Register a consumer tag and get the receiving end for its
    /// deliveries. Replaces any previous registration for the tag.
    pub fn register(&self, consumer_tag: &str) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.consumers
            .lock()
            .unwrap()
            .insert(consumer_tag.to_string(), tx);
        rx
    }

    /// Remove a consumer tag (after `basic.cancel`).
    pub fn deregister(&self, consumer_tag: &str) {
        self.consumers.lock().unwrap().remove(consumer_tag);
    }

    /// Install the hook that receives `basic.return` bounces.
    pub fn returns(&self) -> mpsc::UnboundedReceiver<ReturnedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.returns.lock().unwrap() = Some(tx);
        rx
    }

    /// Hand an assembled delivery to its consumer.
    ///
    /// An unknown tag is legal - the broker may still be flushing
    /// deliveries after a cancel - so it is logged and dropped rather
    /// than treated as a channel failure.
    pub fn route_delivery(&self, delivery: Delivery) {
        let consumers = self.consumers.lock().unwrap();
        match consumers.get(&delivery.consumer_tag) {
            Some(tx) => {
                if tx.send(delivery).is_err() {
                    tracing::warn!("consumer receiver dropped, delivery discarded");
                }
            }
            None => {
                tracing::warn!(
                    consumer_tag = %delivery.consumer_tag,
                    delivery_tag = delivery.delivery_tag,
                    "delivery for unregistered consumer dropped"
                );
            }
        }
    }

    /// Hand a returned message to the hook, if one is installed.
    pub fn route_return(&self, returned: ReturnedMessage) {
        let returns = self.returns.lock().unwrap();
        match returns.as_ref() {
            Some(tx) => {
                if tx.send(returned).is_err() {
                    tracing::warn!("return receiver dropped, returned message discarded");
                }
            }
            None => {
                tracing::warn!(
                    reply_code = returned.reply_code,
                    "returned message with no return hook dropped"
                );
            }
        }
    }

    /// Drop every registration (channel close).
    pub fn clear(&self) {
        self.consumers.lock().unwrap().clear();
        *self.returns.lock().unwrap() = None;
    }

    /// Number of live consumer registrations.
    pub fn len(&self) -> usize {
        self.consumers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.lock().unwrap().is_empty()
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
