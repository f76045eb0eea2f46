use async_trait::async_trait;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
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
        let name = event.name();
        if let Err(e) = self.send(event).await {
            counter!("meta_bridge_events.dropped", 1);
            warn!(event = name, "Dropping event: {}", e);
        }
    }
}

/// Domain events raised by the checkout and admin flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated {
        cart_id: Uuid,
        masked_id: String,
        store_id: i32,
    },
    CartItemAdded {
        cart_id: Uuid,
        item_id: Uuid,
        sku: String,
        qty: i32,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
        qty: i32,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCouponApplied {
        cart_id: Uuid,
        code: String,
    },
    CartCouponRemoved {
        cart_id: Uuid,
    },
    CartCustomerAssigned {
        cart_id: Uuid,
    },

    // Checkout events
    CheckoutSubmitBefore {
        cart_id: Uuid,
        facebook_order_id: String,
    },
    CheckoutSubmitAfter {
        cart_id: Uuid,
        order_id: Uuid,
    },
    OrderCreated {
        order_id: Uuid,
        increment_id: String,
        store_id: i32,
        grand_total: Decimal,
    },
    InvoiceCreated {
        invoice_id: Uuid,
        order_id: Uuid,
    },
    MetaOrderCorrelated {
        order_id: Uuid,
        facebook_order_id: String,
        channel: String,
    },

    // Discount events
    CouponGenerated {
        rule_id: i32,
        code: String,
    },
    NewsletterSubscribed {
        external_business_id: String,
        email: String,
        coupon_code: Option<String>,
    },

    // Admin events
    ConfigurationSaved {
        store_id: i32,
    },
    ShippingProfilesSynced {
        store_id: i32,
        profiles: usize,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::CartCreated { .. } => "cart_created",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemUpdated { .. } => "cart_item_updated",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CartCouponApplied { .. } => "cart_coupon_applied",
            Event::CartCouponRemoved { .. } => "cart_coupon_removed",
            Event::CartCustomerAssigned { .. } => "cart_customer_assigned",
            Event::CheckoutSubmitBefore { .. } => "checkout_submit_before",
            Event::CheckoutSubmitAfter { .. } => "checkout_submit_after",
            Event::OrderCreated { .. } => "order_created",
            Event::InvoiceCreated { .. } => "invoice_created",
            Event::MetaOrderCorrelated { .. } => "meta_order_correlated",
            Event::CouponGenerated { .. } => "coupon_generated",
            Event::NewsletterSubscribed { .. } => "newsletter_subscribed",
            Event::ConfigurationSaved { .. } => "configuration_saved",
            Event::ShippingProfilesSynced { .. } => "shipping_profiles_synced",
        }
    }
}

// Subscribers plug into the event loop through this trait.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Logs every event; the default loop spawned by the server.
pub async fn process_events(rx: mpsc::Receiver<Event>) {
    process_events_with_handlers(rx, Vec::new()).await
}

/// Logs every event and fans it out to the registered handlers in order.
pub async fn process_events_with_handlers(
    mut rx: mpsc::Receiver<Event>,
    handlers: Vec<Arc<dyn EventHandler>>,
) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("meta_bridge_events.processed", 1);

        match &event {
            Event::OrderCreated {
                order_id,
                increment_id,
                store_id,
                grand_total,
            } => {
                info!(
                    "Order created: order_id={}, increment_id={}, store_id={}, grand_total={}",
                    order_id, increment_id, store_id, grand_total
                );
            }
            Event::MetaOrderCorrelated {
                order_id,
                facebook_order_id,
                channel,
            } => {
                info!(
                    "Meta order {} correlated with order {} via {}",
                    facebook_order_id, order_id, channel
                );
            }
            Event::InvoiceCreated {
                invoice_id,
                order_id,
            } => {
                info!("Invoice {} created for order {}", invoice_id, order_id);
            }
            Event::ShippingProfilesSynced { store_id, profiles } => {
                info!(
                    "Shipping profiles synced: store_id={}, profiles={}",
                    store_id, profiles
                );
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }

        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!("Event handler failed for {}: {}", event.name(), e);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: &Event) -> Result<(), String> {
            self.seen.lock().await.push(event.name());
            if matches!(event, Event::CartCouponRemoved { .. }) {
                return Err("boom".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn handlers_receive_events_in_order_and_survive_errors() {
        let (tx, rx) = mpsc::channel(8);
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let handle = tokio::spawn(process_events_with_handlers(
            rx,
            vec![recorder.clone() as Arc<dyn EventHandler>],
        ));

        let sender = EventSender::new(tx);
        let cart_id = Uuid::new_v4();
        sender
            .send_or_log(Event::CartCouponRemoved { cart_id })
            .await;
        sender
            .send_or_log(Event::ConfigurationSaved { store_id: 1 })
            .await;
        drop(sender);
        handle.await.unwrap();

        let seen = recorder.seen.lock().await.clone();
        assert_eq!(seen, vec!["cart_coupon_removed", "configuration_saved"]);
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender
            .send(Event::ConfigurationSaved { store_id: 1 })
            .await
            .is_err());
        sender
            .send_or_log(Event::ConfigurationSaved { store_id: 1 })
            .await;
    }
}
