pub mod checkout;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payment_webhooks;
pub mod plans;
pub mod subscriptions;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        checkout::CheckoutService, coupons::CouponService, orders::OrderService,
        payments::PaymentEventService, plans::PlanService, subscriptions::SubscriptionService,
    },
};
use std::sync::Arc;

/// Service registry shared by every handler through application state.
#[derive(Clone)]
pub struct AppServices {
    pub plans: PlanService,
    pub coupons: CouponService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub subscriptions: SubscriptionService,
    pub payment_events: PaymentEventService,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        currency: String,
        redirect_base: String,
    ) -> Self {
        let plans = PlanService::new(db.clone());
        let coupons = CouponService::new(db.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let subscriptions = SubscriptionService::new(db.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db,
            event_sender,
            coupons.clone(),
            currency,
            redirect_base,
        );
        let payment_events = PaymentEventService::new(orders.clone(), subscriptions.clone());

        Self {
            plans,
            coupons,
            checkout,
            orders,
            subscriptions,
            payment_events,
        }
    }
}
