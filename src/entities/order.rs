use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Payment status of an order. The only transitions are
/// `pending -> completed` and `pending -> failed`, driven by the payment
/// event reconciler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// One checkout attempt and its monetary outcome.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub plan_id: Uuid,

    /// Plan price at the time of the order
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub gross_amount: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_amount: Decimal,

    /// gross - discount, clamped to zero
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub net_amount: Decimal,

    pub currency: String,

    /// Coupon code that was actually applied, if any
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,

    pub payment_status: PaymentStatus,

    /// Reference handed to the payment provider; webhook events correlate
    /// back through this
    #[sea_orm(unique)]
    pub checkout_session_id: String,

    /// Populated only once the provider confirms payment
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,

    pub created_at: DateTime<Utc>,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plan::Entity",
        from = "Column::PlanId",
        to = "super::plan::Column::Id"
    )]
    Plan,
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,
}

impl Related<super::plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
