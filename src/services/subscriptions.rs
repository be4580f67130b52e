use crate::{
    entities::{
        order::Model as OrderModel,
        plan::Entity as PlanEntity,
        subscription::{
            self, ActiveModel as SubscriptionActiveModel, Entity as SubscriptionEntity,
            Model as SubscriptionModel, SubscriptionStatus,
        },
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Months, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Computes the subscription window starting at `start`.
///
/// Month arithmetic clamps to the last day of shorter months, so a
/// subscription started Jan 31 ends Feb 28 (or 29) rather than spilling
/// into March.
pub fn subscription_period(
    start: DateTime<Utc>,
    duration_months: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
    let end = start
        .checked_add_months(Months::new(duration_months))
        .ok_or_else(|| {
            ServiceError::InvalidOperation(format!(
                "cannot add {} months to {}",
                duration_months, start
            ))
        })?;
    Ok((start, end))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub plan_name: Option<String>,
    pub order_id: Uuid,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    fn from_model(model: SubscriptionModel, plan_name: Option<String>) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            plan_id: model.plan_id,
            plan_name,
            order_id: model.order_id,
            status: model.status,
            start_date: model.start_date,
            end_date: model.end_date,
            created_at: model.created_at,
        }
    }
}

/// Creates and cancels subscriptions in response to payment outcomes.
#[derive(Clone)]
pub struct SubscriptionService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl SubscriptionService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Activates the subscription purchased by `order`.
    ///
    /// Idempotent on the order: the unique key on `order_id` means a second
    /// activation for the same order returns the existing row instead of
    /// creating a duplicate, so replayed completion events are harmless.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn activate_for_order(
        &self,
        order: &OrderModel,
        external_ref: Option<String>,
    ) -> Result<SubscriptionModel, ServiceError> {
        if let Some(existing) = SubscriptionEntity::find()
            .filter(subscription::Column::OrderId.eq(order.id))
            .one(&*self.db)
            .await?
        {
            info!(
                subscription_id = %existing.id,
                order_id = %order.id,
                "subscription already active for order"
            );
            return Ok(existing);
        }

        let plan = PlanEntity::find_by_id(order.plan_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InvalidOperation(format!(
                    "Order {} references missing plan {}",
                    order.id, order.plan_id
                ))
            })?;

        if plan.duration_months <= 0 {
            return Err(ServiceError::InvalidOperation(format!(
                "Plan {} has non-positive duration",
                plan.id
            )));
        }

        let now = Utc::now();
        let (start_date, end_date) = subscription_period(now, plan.duration_months as u32)?;

        let model = SubscriptionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(order.user_id),
            plan_id: Set(order.plan_id),
            order_id: Set(order.id),
            status: Set(SubscriptionStatus::Active),
            start_date: Set(start_date),
            end_date: Set(end_date),
            external_ref: Set(external_ref),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let created = match model.insert(&*self.db).await {
            Ok(created) => created,
            // Lost a race with a concurrent activation for the same order;
            // the winner's row is the subscription.
            Err(insert_err) => {
                if let Some(existing) = SubscriptionEntity::find()
                    .filter(subscription::Column::OrderId.eq(order.id))
                    .one(&*self.db)
                    .await?
                {
                    info!(order_id = %order.id, "concurrent activation won the race");
                    return Ok(existing);
                }
                return Err(insert_err.into());
            }
        };

        metrics::counter!("subscriptions_activated_total", 1);
        if let Err(e) = self.event_sender.send(Event::SubscriptionActivated {
            subscription_id: created.id,
            order_id: order.id,
        }) {
            warn!(error = %e, "failed to emit subscription activated event");
        }
        info!(
            subscription_id = %created.id,
            order_id = %order.id,
            end_date = %created.end_date,
            "subscription activated"
        );
        Ok(created)
    }

    /// Cancels the subscription the payment provider knows by `external_ref`.
    /// Returns `None` when no subscription matches; already-cancelled rows
    /// are left as they are.
    #[instrument(skip(self))]
    pub async fn cancel_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<SubscriptionModel>, ServiceError> {
        let Some(subscription) = SubscriptionEntity::find()
            .filter(subscription::Column::ExternalRef.eq(external_ref))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        if subscription.status == SubscriptionStatus::Cancelled {
            info!(subscription_id = %subscription.id, "subscription already cancelled");
            return Ok(Some(subscription));
        }

        let subscription_id = subscription.id;
        let mut active: SubscriptionActiveModel = subscription.into();
        active.status = Set(SubscriptionStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;

        metrics::counter!("subscriptions_cancelled_total", 1);
        if let Err(e) = self
            .event_sender
            .send(Event::SubscriptionCancelled { subscription_id })
        {
            warn!(error = %e, "failed to emit subscription cancelled event");
        }
        info!(subscription_id = %subscription_id, "subscription cancelled");
        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<SubscriptionResponse>, ServiceError> {
        let rows = SubscriptionEntity::find()
            .filter(subscription::Column::UserId.eq(user_id))
            .order_by_desc(subscription::Column::CreatedAt)
            .find_also_related(PlanEntity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(sub, plan)| SubscriptionResponse::from_model(sub, plan.map(|p| p.name)))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<SubscriptionModel, ServiceError> {
        SubscriptionEntity::find_by_id(subscription_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Subscription {} not found", subscription_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn one_month_from_mid_month() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let (_, end) = subscription_period(start, 1).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn jan_31_plus_one_month_clamps_to_feb_end() {
        let start = Utc.with_ymd_and_hms(2023, 1, 31, 0, 0, 0).unwrap();
        let (_, end) = subscription_period(start, 1).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2023, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn jan_31_leap_year_clamps_to_feb_29() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let (_, end) = subscription_period(start, 1).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn twelve_months_spans_a_year() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        let (_, end) = subscription_period(start, 12).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn time_of_day_is_preserved() {
        let start = Utc.with_ymd_and_hms(2024, 5, 10, 23, 59, 59).unwrap();
        let (returned_start, end) = subscription_period(start, 3).unwrap();
        assert_eq!(returned_start, start);
        assert_eq!(end.time(), start.time());
    }
}
