use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use subflow_api::{
    entities::coupon::{DiscountType, Model as CouponModel},
    services::coupons::{evaluate, CouponVerdict},
};
use uuid::Uuid;

fn coupon(discount_type: DiscountType, value: Decimal) -> CouponModel {
    CouponModel {
        id: Uuid::new_v4(),
        code: "PROP".into(),
        discount_type,
        discount_value: value,
        max_uses: None,
        used_count: 0,
        valid_from: Utc::now() - Duration::days(1),
        valid_until: None,
        is_active: true,
        created_at: Utc::now() - Duration::days(1),
    }
}

proptest! {
    /// Whatever the inputs, an accepted discount never exceeds gross and
    /// the implied net never goes negative.
    #[test]
    fn percentage_discount_stays_within_bounds(
        gross_cents in 0i64..10_000_000,
        percent in 0i64..=100,
    ) {
        let gross = Decimal::new(gross_cents, 2);
        let coupon = coupon(DiscountType::Percentage, Decimal::from(percent));

        match evaluate(Some(&coupon), Utc::now(), gross) {
            CouponVerdict::Accepted { discount } => {
                prop_assert!(discount >= Decimal::ZERO);
                prop_assert!(discount <= gross);
                prop_assert!(gross - discount >= Decimal::ZERO);
            }
            CouponVerdict::Rejected(reason) => {
                prop_assert!(false, "valid coupon rejected: {:?}", reason);
            }
        }
    }

    #[test]
    fn fixed_discount_stays_within_bounds(
        gross_cents in 0i64..10_000_000,
        discount_cents in 0i64..20_000_000,
    ) {
        let gross = Decimal::new(gross_cents, 2);
        let coupon = coupon(DiscountType::Fixed, Decimal::new(discount_cents, 2));

        match evaluate(Some(&coupon), Utc::now(), gross) {
            CouponVerdict::Accepted { discount } => {
                prop_assert!(discount >= Decimal::ZERO);
                prop_assert!(discount <= gross);
            }
            CouponVerdict::Rejected(reason) => {
                prop_assert!(false, "non-negative fixed coupon rejected: {:?}", reason);
            }
        }
    }

    /// Percentage discounts are monotone in the rate: a bigger percentage
    /// never produces a smaller discount.
    #[test]
    fn percentage_discount_is_monotone(
        gross_cents in 1i64..10_000_000,
        lo in 0i64..=100,
        hi in 0i64..=100,
    ) {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let gross = Decimal::new(gross_cents, 2);

        let d_lo = match evaluate(Some(&coupon(DiscountType::Percentage, Decimal::from(lo))), Utc::now(), gross) {
            CouponVerdict::Accepted { discount } => discount,
            CouponVerdict::Rejected(_) => Decimal::ZERO,
        };
        let d_hi = match evaluate(Some(&coupon(DiscountType::Percentage, Decimal::from(hi))), Utc::now(), gross) {
            CouponVerdict::Accepted { discount } => discount,
            CouponVerdict::Rejected(_) => Decimal::ZERO,
        };

        prop_assert!(d_lo <= d_hi);
    }
}
