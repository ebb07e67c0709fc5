use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published after a write commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StockAdjusted {
        product_id: Uuid,
        merchant_id: Uuid,
        stock_before: i32,
        stock_after: i32,
        reason: String,
        movement_id: Uuid,
    },
    LowStockAlert {
        product_id: Uuid,
        merchant_id: Uuid,
        stock: i32,
        threshold: i32,
    },
    PromotionCreated {
        promotion_id: Uuid,
        merchant_id: Uuid,
    },
    PromotionCancelled {
        promotion_id: Uuid,
        merchant_id: Uuid,
    },
    PromotionsExpired {
        merchant_id: Uuid,
        count: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::LowStockAlert { .. } => "low_stock_alert",
            Event::PromotionCreated { .. } => "promotion_created",
            Event::PromotionCancelled { .. } => "promotion_cancelled",
            Event::PromotionsExpired { .. } => "promotions_expired",
        }
    }
}

/// Best-effort publisher. Publishing never blocks and never fails the caller.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both ends.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queues an event; a full or closed channel is logged and counted, then dropped.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!("mbuy_events.dropped", 1, "reason" => "full");
                warn!(event = name, "event bus full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                counter!("mbuy_events.dropped", 1, "reason" => "closed");
                warn!(event = name, "event bus closed, dropping event");
            }
        }
    }
}

/// Drains the bus until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockAlert {
                product_id,
                merchant_id,
                stock,
                threshold,
            } => {
                // Stand-in for the merchant push notification.
                warn!(
                    %product_id,
                    %merchant_id,
                    stock,
                    threshold,
                    "low stock alert"
                );
            }
            Event::PromotionsExpired {
                merchant_id, count, ..
            } => {
                info!(%merchant_id, count, "promotions expired by sweep");
            }
            other => info!(event = other.name(), payload = ?other, "event processed"),
        }
        counter!("mbuy_events.processed", 1, "event" => event.name());
    }

    info!("Event processing loop stopped");
}
