use crate::entities::OrderStatus;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the services after state changes commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A pending order was recorded for a new checkout session.
    OrderCreated(Uuid),
    /// An order moved between lifecycle states.
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    /// A paid session arrived with no matching local order and was backfilled.
    OrderBackfilled(Uuid),
    /// A webhook delivery was received and dispatched.
    WebhookProcessed { event_type: String },
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Failed to send event: {0}")]
    SendError(String),
}

/// Sender half of the event channel, shared by the services.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), EventError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| EventError::SendError(e.to_string()))
    }
}

/// Consumes events from the channel and logs them. Runs for the lifetime of
/// the process as a background task.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::OrderBackfilled(order_id) => {
                info!(%order_id, "Order backfilled from provider session");
            }
            Event::WebhookProcessed { event_type } => {
                info!(%event_type, "Webhook processed");
            }
        }
    }
    info!("Event processor stopped");
}
