use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Domain events emitted by the services. Consumers are in-process only;
/// the channel is fire-and-forget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        net_amount: Decimal,
    },
    OrderCompleted {
        order_id: Uuid,
    },
    OrderPaymentFailed {
        order_id: Uuid,
    },
    CouponRedeemed {
        code: String,
        order_id: Uuid,
        discount_amount: Decimal,
    },
    SubscriptionActivated {
        subscription_id: Uuid,
        order_id: Uuid,
    },
    SubscriptionCancelled {
        subscription_id: Uuid,
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

    /// Sends an event without waiting. A full or closed channel is reported
    /// to the caller, who typically just logs it: event delivery is
    /// best-effort and never blocks a request.
    pub fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .try_send(event)
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Runs until every sender
/// is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        counter!("subflow_events_processed", 1);
        info!(event = ?event, "domain event");
    }
    info!("Event channel closed; event processor shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn send_succeeds_while_receiver_alive() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCompleted {
                order_id: Uuid::new_v4(),
            })
            .expect("send should succeed");

        assert!(matches!(
            rx.recv().await,
            Some(Event::OrderCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        let sender = EventSender::new(tx);

        let result = sender
            .send(Event::CouponRedeemed {
                code: "SAVE20".into(),
                order_id: Uuid::new_v4(),
                discount_amount: dec!(20),
            });

        assert!(result.is_err());
    }
}
