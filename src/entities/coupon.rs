use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Discount type for a coupon
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// A discount code with usage and time constraints.
///
/// `code` is stored uppercase; lookups normalize their input so matching is
/// case-insensitive. `used_count` only ever grows, and never past `max_uses`
/// (enforced by the conditional redeem in `CouponService`).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub code: String,

    pub discount_type: DiscountType,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount_value: Decimal,

    #[sea_orm(nullable)]
    pub max_uses: Option<i32>,

    pub used_count: i32,

    pub valid_from: DateTime<Utc>,

    #[sea_orm(nullable)]
    pub valid_until: Option<DateTime<Utc>>,

    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
