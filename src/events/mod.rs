use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Domain events emitted by the storefront workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartUpdated(Uuid),
    CartMerged { cart_id: Uuid, user_id: Uuid },

    // Order events
    OrderCreated(Uuid),
    OrderPaid { order_id: Uuid, amount: Decimal },
    OrderDelivered(Uuid),
    OrderDeleted(Uuid),
    OrderBackordered { order_id: Uuid, items: Vec<String> },

    // Payment events
    PaymentInitiated { order_id: Uuid, reference: String },
    PaymentFailed { order_id: Uuid, reason: String },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    ReviewSubmitted { product_id: Uuid, user_id: Uuid },

    // Account events
    UserRegistered(Uuid),
    UserDeleted(Uuid),
}

/// Creates the bounded channel services publish into.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPaid { order_id, amount } => {
                info!(order_id = %order_id, amount = %amount, "order paid");
            }
            Event::PaymentFailed { order_id, reason } => {
                warn!(order_id = %order_id, reason = %reason, "payment failed");
            }
            Event::OrderBackordered { order_id, items } => {
                warn!(order_id = %order_id, items = ?items, "paid order is short of stock");
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.send_or_log(Event::CartCreated(Uuid::nil())).await;
        assert!(sender.send(Event::CartCreated(Uuid::nil())).await.is_err());
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = channel(4);
        let id = Uuid::new_v4();
        sender.send_or_log(Event::OrderCreated(id)).await;
        sender.send_or_log(Event::OrderDelivered(id)).await;

        assert_eq!(rx.recv().await, Some(Event::OrderCreated(id)));
        assert_eq!(rx.recv().await, Some(Event::OrderDelivered(id)));
    }
}
