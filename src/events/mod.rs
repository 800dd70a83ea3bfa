//! In-process event channel decoupling fulfillment from the order write.
//!
//! The materializer commits the order, emits [`Event::OrderMaterialized`] and
//! returns; receipt rendering and email dispatch run on the processor task so
//! their failures can never roll back or delay an already-committed order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::services::fulfillment::FulfillmentService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderMaterialized {
        order_id: Uuid,
        payment_reference: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
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
}

/// Drains the event channel, running fulfillment for each materialized order.
/// Spawned once at startup; exits when the last sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>, fulfillment: Arc<FulfillmentService>) {
    info!("event processor started");

    while let Some(event) = receiver.recv().await {
        match event {
            Event::OrderMaterialized {
                order_id,
                payment_reference,
            } => {
                if let Err(e) = fulfillment.fulfill_order(order_id).await {
                    // The order itself is already durable; fulfillment gaps
                    // are recoverable through the on-demand receipt path.
                    error!(
                        %order_id,
                        payment_reference = %payment_reference,
                        error = %e,
                        "fulfillment failed for materialized order"
                    );
                }
            }
        }
    }

    info!("event processor stopped");
}
