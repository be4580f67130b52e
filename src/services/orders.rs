use crate::{
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub gross_amount: Decimal,
    pub discount_amount: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub payment_status: PaymentStatus,
    pub checkout_session_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            plan_id: model.plan_id,
            gross_amount: model.gross_amount,
            discount_amount: model.discount_amount,
            net_amount: model.net_amount,
            currency: model.currency,
            coupon_code: model.coupon_code,
            payment_status: model.payment_status,
            checkout_session_id: model.checkout_session_id,
            created_at: model.created_at,
        }
    }
}

/// Order lookup and payment-status transitions.
///
/// The status machine is deliberately small: `Pending` is the only state
/// that accepts a transition, to `Completed` or `Failed`. Anything else is
/// a replayed or out-of-order signal and leaves the row untouched.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(orders.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self))]
    pub async fn find_by_session(
        &self,
        session_ref: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::CheckoutSessionId.eq(session_ref))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn find_by_payment_intent(
        &self,
        payment_ref: &str,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::PaymentIntentId.eq(payment_ref))
            .one(&*self.db)
            .await?;
        Ok(order)
    }

    /// Marks a pending order paid and records the provider's payment
    /// reference. Replays on an already-completed order are a no-op; a
    /// completion signal for a failed order is logged and dropped.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn mark_completed(
        &self,
        order: OrderModel,
        payment_ref: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        match order.payment_status {
            PaymentStatus::Pending => {}
            PaymentStatus::Completed => {
                info!(order_id = %order.id, "order already completed, ignoring replay");
                return Ok(order);
            }
            PaymentStatus::Failed => {
                warn!(order_id = %order.id, "completion signal for failed order, ignoring");
                return Ok(order);
            }
        }

        let order_id = order.id;
        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Completed);
        if let Some(payment_ref) = payment_ref {
            active.payment_intent_id = Set(Some(payment_ref));
        }
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        metrics::counter!("orders_completed_total", 1);
        if let Err(e) = self.event_sender.send(Event::OrderCompleted { order_id }) {
            warn!(order_id = %order_id, error = %e, "failed to emit order completed event");
        }
        info!(order_id = %order_id, "order marked completed");
        Ok(updated)
    }

    /// Marks a pending order failed. Every other state is left alone: a
    /// payment that already completed is not un-completed by a late failure
    /// signal.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn mark_failed(&self, order: OrderModel) -> Result<OrderModel, ServiceError> {
        match order.payment_status {
            PaymentStatus::Pending => {}
            other => {
                info!(order_id = %order.id, status = ?other, "failure signal for non-pending order, ignoring");
                return Ok(order);
            }
        }

        let order_id = order.id;
        let mut active: OrderActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Failed);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        metrics::counter!("orders_failed_total", 1);
        if let Err(e) = self
            .event_sender
            .send(Event::OrderPaymentFailed { order_id })
        {
            warn!(order_id = %order_id, error = %e, "failed to emit payment failed event");
        }
        info!(order_id = %order_id, "order marked failed");
        Ok(updated)
    }
}
