//! Broadcast channel for outbound client messages.

use notefabric_core::protocol::OutboundMessage;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`OutboundMessage`]s to every connected subscriber.
/// Slow subscribers lag and skip ahead; publishers never block.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OutboundMessage>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the message.
    pub fn publish(&self, message: OutboundMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
