use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Capacity of the broadcast channel backing the event bus. Slow subscribers
/// that fall further behind than this lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// Define the various events that can occur in the checkout core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartUpdated { item_count: usize },
    CartCleared,
    StockReleaseFailed { product_id: String },

    // Checkout events
    CheckoutStarted { session_id: Uuid },
    PaymentVerified { payment_id: String },
    OrderPlaced { order_id: String },

    // Pending-hold events
    HoldCreated { order_id: String, expires_in_secs: u64 },
    HoldTick { order_id: String, remaining_secs: u64 },
    HoldExpired { order_id: String },
    HoldCancelled { order_id: String },
}

/// Process-wide publish/subscribe channel.
///
/// The cart store publishes a change event on every save and clear so that
/// any component in the same process (header badge, another open view) can
/// refresh without sharing in-memory state.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<Event>,
}

impl EventSender {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Opens a new subscription that observes every event published after
    /// this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event, logging instead of propagating delivery failure.
    /// A send only fails when no subscriber exists, which is a valid state.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.send(event) {
            debug!("No event subscribers: {}", err);
        }
    }
}

impl Default for EventSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_observe_events() {
        let sender = EventSender::new();
        let mut rx_a = sender.subscribe();
        let mut rx_b = sender.subscribe();

        sender.send_or_log(Event::CartUpdated { item_count: 2 });

        assert!(matches!(
            rx_a.recv().await,
            Ok(Event::CartUpdated { item_count: 2 })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Ok(Event::CartUpdated { item_count: 2 })
        ));
    }

    #[tokio::test]
    async fn test_send_without_subscribers_does_not_panic() {
        let sender = EventSender::new();
        sender.send_or_log(Event::CartCleared);
    }
}
