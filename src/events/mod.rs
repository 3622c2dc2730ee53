use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

// Define the various events that can occur in the system. Downstream
// notification and analytics sinks consume these; delivery is fire-and-forget
// and a lost event never fails the operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        user_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderDelivered(Uuid),

    // Payment events
    PaymentCompleted {
        order_id: Uuid,
        payment_id: Uuid,
    },
    PaymentFailed {
        order_id: Uuid,
        payment_id: Uuid,
    },

    // Coupon events
    CouponRedeemed {
        order_id: Uuid,
        code: String,
    },

    // Invoice events
    InvoiceGenerated {
        order_id: Uuid,
        document_id: String,
    },
}

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

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Core operations must never fail because a sink is unavailable.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {}", e);
        }
    }
}

/// Consumes events and forwards them to notification/analytics sinks.
///
/// The engine treats sinks as best-effort collaborators; this loop logs each
/// event and is the integration point for real senders.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "event: order status changed"
                );
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id = %order_id, "event: order cancelled");
            }
            Event::OrderDelivered(order_id) => {
                info!(order_id = %order_id, "event: order delivered");
            }
            Event::PaymentCompleted {
                order_id,
                payment_id,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, "event: payment completed");
            }
            Event::PaymentFailed {
                order_id,
                payment_id,
            } => {
                info!(order_id = %order_id, payment_id = %payment_id, "event: payment failed");
            }
            other => {
                info!("event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::nil()))
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, Uuid::nil()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error even though the receiver is gone.
        sender.send_or_log(Event::CartCleared(Uuid::nil())).await;
    }
}
