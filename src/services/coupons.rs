use crate::{
    entities::coupon::{
        self, ActiveModel as CouponActiveModel, DiscountType, Entity as CouponEntity,
        Model as CouponModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Coupon codes: letters, digits, dash, underscore.
pub static COUPON_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("static regex"));

/// Why a coupon was not applied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    UsageExhausted,
    InvalidDiscountConfiguration,
}

/// Outcome of evaluating a coupon against a cart amount.
#[derive(Debug, Clone, PartialEq)]
pub enum CouponVerdict {
    Accepted { discount: Decimal },
    Rejected(CouponRejection),
}

/// Evaluates a coupon lookup result against the gross amount at `now`.
///
/// Pure and side-effect free: usage accounting happens separately via
/// [`CouponService::redeem`], and only once per created order. Checks
/// short-circuit in a fixed order, so a coupon that is both expired and
/// exhausted reports `Expired`.
pub fn evaluate(coupon: Option<&CouponModel>, now: DateTime<Utc>, gross: Decimal) -> CouponVerdict {
    let Some(coupon) = coupon else {
        return CouponVerdict::Rejected(CouponRejection::NotFound);
    };

    if !coupon.is_active {
        return CouponVerdict::Rejected(CouponRejection::Inactive);
    }

    if now < coupon.valid_from {
        return CouponVerdict::Rejected(CouponRejection::NotYetValid);
    }
    if let Some(valid_until) = coupon.valid_until {
        if now > valid_until {
            return CouponVerdict::Rejected(CouponRejection::Expired);
        }
    }

    if let Some(max_uses) = coupon.max_uses {
        if coupon.used_count >= max_uses {
            return CouponVerdict::Rejected(CouponRejection::UsageExhausted);
        }
    }

    // Admin input validation rejects these at creation time; re-check here
    // so a bad row never turns into a negative or >100% discount.
    if coupon.discount_value < Decimal::ZERO {
        return CouponVerdict::Rejected(CouponRejection::InvalidDiscountConfiguration);
    }
    if coupon.discount_type == DiscountType::Percentage
        && coupon.discount_value > Decimal::from(100)
    {
        return CouponVerdict::Rejected(CouponRejection::InvalidDiscountConfiguration);
    }

    let computed = match coupon.discount_type {
        DiscountType::Percentage => gross * coupon.discount_value / Decimal::from(100),
        DiscountType::Fixed => coupon.discount_value,
    };

    CouponVerdict::Accepted {
        discount: computed.min(gross),
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 50), regex = "COUPON_CODE_RE")]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCouponRequest {
    pub discount_value: Option<Decimal>,
    pub max_uses: Option<i32>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<CouponModel> for CouponResponse {
    fn from(model: CouponModel) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount_type: model.discount_type,
            discount_value: model.discount_value,
            max_uses: model.max_uses,
            used_count: model.used_count,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

/// Coupon lookup, admin CRUD, and the atomic usage increment.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Case-insensitive code lookup. Codes are stored uppercase, so
    /// normalizing the input is all the matching we need.
    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        let normalized = code.trim().to_uppercase();
        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?;
        Ok(coupon)
    }

    /// Atomically consumes one use of the coupon.
    ///
    /// The increment is a single conditional UPDATE so that two concurrent
    /// checkouts at the usage cap cannot both succeed; the loser sees zero
    /// affected rows. Runs on the caller's connection so it can share the
    /// order-creation transaction.
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::MaxUses.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::MaxUses)),
                    ),
            )
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
    ) -> Result<CouponResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_discount(request.discount_type, request.discount_value)?;

        if let Some(max_uses) = request.max_uses {
            if max_uses <= 0 {
                return Err(ServiceError::ValidationError(
                    "max_uses must be positive".into(),
                ));
            }
        }

        let code = request.code.trim().to_uppercase();
        if self.find_by_code(&code).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = CouponActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            max_uses: Set(request.max_uses),
            used_count: Set(0),
            valid_from: Set(request.valid_from.unwrap_or(now)),
            valid_until: Set(request.valid_until),
            is_active: Set(true),
            created_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        info!(coupon_id = %created.id, code = %code, "coupon created");
        Ok(created.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update_coupon(
        &self,
        coupon_id: Uuid,
        request: UpdateCouponRequest,
    ) -> Result<CouponResponse, ServiceError> {
        let coupon = CouponEntity::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        if let Some(value) = request.discount_value {
            validate_discount(coupon.discount_type, value)?;
        }
        if let Some(max_uses) = request.max_uses {
            if max_uses <= 0 {
                return Err(ServiceError::ValidationError(
                    "max_uses must be positive".into(),
                ));
            }
            if max_uses < coupon.used_count {
                return Err(ServiceError::ValidationError(format!(
                    "max_uses cannot drop below used_count ({})",
                    coupon.used_count
                )));
            }
        }

        let mut active: CouponActiveModel = coupon.into();
        if let Some(value) = request.discount_value {
            active.discount_value = Set(value);
        }
        if let Some(max_uses) = request.max_uses {
            active.max_uses = Set(Some(max_uses));
        }
        if let Some(valid_until) = request.valid_until {
            active.valid_until = Set(Some(valid_until));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await?;
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn deactivate_coupon(&self, coupon_id: Uuid) -> Result<CouponResponse, ServiceError> {
        let coupon = CouponEntity::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))?;

        let mut active: CouponActiveModel = coupon.into();
        active.is_active = Set(false);
        let updated = active.update(&*self.db).await?;
        info!(coupon_id = %coupon_id, "coupon deactivated");
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn list_coupons(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponResponse>, u64), ServiceError> {
        let paginator = CouponEntity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;

        if coupons.is_empty() && total > 0 {
            warn!(page = page, "coupon list page out of range");
        }

        Ok((coupons.into_iter().map(Into::into).collect(), total))
    }
}

fn validate_discount(discount_type: DiscountType, value: Decimal) -> Result<(), ServiceError> {
    if value <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "discount_value must be positive".into(),
        ));
    }
    if discount_type == DiscountType::Percentage && value > Decimal::from(100) {
        return Err(ServiceError::ValidationError(
            "percentage discount cannot exceed 100".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn sample_coupon(
        discount_type: DiscountType,
        value: Decimal,
        max_uses: Option<i32>,
        used_count: i32,
    ) -> CouponModel {
        CouponModel {
            id: Uuid::new_v4(),
            code: "SAVE20".into(),
            discount_type,
            discount_value: value,
            max_uses,
            used_count,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: None,
            is_active: true,
            created_at: Utc::now() - Duration::days(1),
        }
    }

    #[test]
    fn missing_coupon_is_not_found() {
        assert_eq!(
            evaluate(None, Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::NotFound)
        );
    }

    #[test]
    fn inactive_coupon_is_rejected() {
        let mut coupon = sample_coupon(DiscountType::Percentage, dec!(20), None, 0);
        coupon.is_active = false;
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::Inactive)
        );
    }

    #[test]
    fn not_yet_valid_coupon_is_rejected() {
        let mut coupon = sample_coupon(DiscountType::Percentage, dec!(20), None, 0);
        coupon.valid_from = Utc::now() + Duration::days(1);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::NotYetValid)
        );
    }

    #[test]
    fn expired_coupon_is_rejected_even_with_uses_left() {
        let mut coupon = sample_coupon(DiscountType::Percentage, dec!(20), Some(10), 0);
        coupon.valid_until = Some(Utc::now() - Duration::hours(1));
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::Expired)
        );
    }

    #[test]
    fn exhausted_coupon_is_rejected_regardless_of_dates() {
        let coupon = sample_coupon(DiscountType::Fixed, dec!(10), Some(5), 5);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::UsageExhausted)
        );
    }

    #[test_case(dec!(101))]
    #[test_case(dec!(250))]
    #[test_case(dec!(-5))]
    fn out_of_range_percentage_is_config_error(value: Decimal) {
        let coupon = sample_coupon(DiscountType::Percentage, value, None, 0);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Rejected(CouponRejection::InvalidDiscountConfiguration)
        );
    }

    #[test]
    fn percentage_discount_is_proportional() {
        let coupon = sample_coupon(DiscountType::Percentage, dec!(20), Some(5), 0);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(100)),
            CouponVerdict::Accepted { discount: dec!(20) }
        );
    }

    #[test]
    fn fixed_discount_is_clamped_to_gross() {
        let coupon = sample_coupon(DiscountType::Fixed, dec!(60), None, 0);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(50)),
            CouponVerdict::Accepted { discount: dec!(50) }
        );
    }

    #[test]
    fn hundred_percent_discount_is_legal() {
        let coupon = sample_coupon(DiscountType::Percentage, dec!(100), None, 0);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), dec!(80)),
            CouponVerdict::Accepted { discount: dec!(80) }
        );
    }

    #[test]
    fn zero_gross_yields_zero_discount() {
        let coupon = sample_coupon(DiscountType::Fixed, dec!(10), None, 0);
        assert_eq!(
            evaluate(Some(&coupon), Utc::now(), Decimal::ZERO),
            CouponVerdict::Accepted {
                discount: Decimal::ZERO
            }
        );
    }

    #[test]
    fn coupon_code_regex_accepts_reasonable_codes() {
        assert!(COUPON_CODE_RE.is_match("SAVE20"));
        assert!(COUPON_CODE_RE.is_match("summer_2024"));
        assert!(COUPON_CODE_RE.is_match("VIP-50"));
        assert!(!COUPON_CODE_RE.is_match("has space"));
        assert!(!COUPON_CODE_RE.is_match("emoji🎉"));
        assert!(!COUPON_CODE_RE.is_match(""));
    }
}
