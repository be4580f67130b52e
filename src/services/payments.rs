use crate::{
    errors::ServiceError,
    services::{orders::OrderService, subscriptions::SubscriptionService},
};
use serde_json::Value;
use tracing::{info, instrument, warn};

/// A payment-provider notification, reduced to the fields reconciliation
/// needs. Everything else in the provider payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    CheckoutCompleted {
        session_ref: String,
        payment_ref: Option<String>,
        subscription_ref: Option<String>,
    },
    PaymentFailed {
        payment_ref: String,
    },
    SubscriptionCancelled {
        subscription_ref: String,
    },
    Unknown {
        kind: String,
    },
}

impl PaymentEvent {
    /// Parses the provider's `{ "type": ..., "data": { "object": ... } }`
    /// envelope. A payload missing the fields a known event type needs is
    /// treated as unknown rather than an error, so a malformed body never
    /// triggers provider retries.
    pub fn from_provider_payload(payload: &Value) -> Self {
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let object = payload.pointer("/data/object").unwrap_or(&Value::Null);

        match kind.as_str() {
            "checkout.session.completed" => {
                let Some(session_ref) = object.get("id").and_then(Value::as_str) else {
                    return PaymentEvent::Unknown { kind };
                };
                PaymentEvent::CheckoutCompleted {
                    session_ref: session_ref.to_string(),
                    payment_ref: object
                        .get("payment_intent")
                        .and_then(Value::as_str)
                        .map(String::from),
                    subscription_ref: object
                        .get("subscription")
                        .and_then(Value::as_str)
                        .map(String::from),
                }
            }
            "payment_intent.payment_failed" => {
                let Some(payment_ref) = object.get("id").and_then(Value::as_str) else {
                    return PaymentEvent::Unknown { kind };
                };
                PaymentEvent::PaymentFailed {
                    payment_ref: payment_ref.to_string(),
                }
            }
            "customer.subscription.deleted" => {
                let Some(subscription_ref) = object.get("id").and_then(Value::as_str) else {
                    return PaymentEvent::Unknown { kind };
                };
                PaymentEvent::SubscriptionCancelled {
                    subscription_ref: subscription_ref.to_string(),
                }
            }
            _ => PaymentEvent::Unknown { kind },
        }
    }
}

/// Applies payment-provider events to orders and subscriptions.
///
/// Processing is idempotent end to end: replaying any event leaves the
/// same final state, and events that match nothing are logged and
/// acknowledged so the provider stops retrying them.
#[derive(Clone)]
pub struct PaymentEventService {
    orders: OrderService,
    subscriptions: SubscriptionService,
}

impl PaymentEventService {
    pub fn new(orders: OrderService, subscriptions: SubscriptionService) -> Self {
        Self {
            orders,
            subscriptions,
        }
    }

    #[instrument(skip(self, event))]
    pub async fn process(&self, event: PaymentEvent) -> Result<(), ServiceError> {
        match event {
            PaymentEvent::CheckoutCompleted {
                session_ref,
                payment_ref,
                subscription_ref,
            } => {
                self.handle_checkout_completed(&session_ref, payment_ref, subscription_ref)
                    .await
            }
            PaymentEvent::PaymentFailed { payment_ref } => {
                self.handle_payment_failed(&payment_ref).await
            }
            PaymentEvent::SubscriptionCancelled { subscription_ref } => {
                self.handle_subscription_cancelled(&subscription_ref).await
            }
            PaymentEvent::Unknown { kind } => {
                info!(event_type = %kind, "unhandled payment event type, ignoring");
                metrics::counter!("payment_events_ignored_total", 1);
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(
        &self,
        session_ref: &str,
        payment_ref: Option<String>,
        subscription_ref: Option<String>,
    ) -> Result<(), ServiceError> {
        let Some(order) = self.orders.find_by_session(session_ref).await? else {
            warn!(session_ref = %session_ref, "checkout completion for unknown session, dropping");
            metrics::counter!("payment_events_unmatched_total", 1);
            return Ok(());
        };

        let order = self.orders.mark_completed(order, payment_ref).await?;

        // Activation runs even on replay: if an earlier delivery crashed
        // between the status update and activation, the retry heals it.
        use crate::entities::order::PaymentStatus;
        if order.payment_status == PaymentStatus::Completed {
            self.subscriptions
                .activate_for_order(&order, subscription_ref)
                .await?;
        }

        metrics::counter!("payment_events_processed_total", 1);
        Ok(())
    }

    async fn handle_payment_failed(&self, payment_ref: &str) -> Result<(), ServiceError> {
        let Some(order) = self.orders.find_by_payment_intent(payment_ref).await? else {
            warn!(payment_ref = %payment_ref, "payment failure for unknown payment, dropping");
            metrics::counter!("payment_events_unmatched_total", 1);
            return Ok(());
        };

        self.orders.mark_failed(order).await?;
        metrics::counter!("payment_events_processed_total", 1);
        Ok(())
    }

    async fn handle_subscription_cancelled(
        &self,
        subscription_ref: &str,
    ) -> Result<(), ServiceError> {
        match self
            .subscriptions
            .cancel_by_external_ref(subscription_ref)
            .await?
        {
            Some(_) => {
                metrics::counter!("payment_events_processed_total", 1);
            }
            None => {
                warn!(
                    subscription_ref = %subscription_ref,
                    "cancellation for unknown subscription, dropping"
                );
                metrics::counter!("payment_events_unmatched_total", 1);
            }
        }
        Ok(())
    }
}
