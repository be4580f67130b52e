mod common;

use common::{seed_coupon, seed_inactive_plan, seed_plan, setup_services, CouponSpec};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use subflow_api::{
    entities::{coupon::DiscountType, order::PaymentStatus},
    errors::ServiceError,
    services::{checkout::CouponOutcome, coupons::CouponRejection},
};
use uuid::Uuid;

#[tokio::test]
async fn checkout_without_coupon_charges_full_price() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(99.90), 1).await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, None)
        .await
        .unwrap();

    assert_eq!(session.gross_amount, dec!(99.90));
    assert_eq!(session.discount_amount, Decimal::ZERO);
    assert_eq!(session.net_amount, dec!(99.90));
    assert_eq!(session.currency, "ILS");
    assert_eq!(session.coupon, CouponOutcome::NotRequested);
    assert!(session.checkout_session_id.starts_with("cs_"));
    assert!(session
        .checkout_url
        .contains(&format!("session_id={}", session.checkout_session_id)));

    let order = common::find_order(&db, session.order_id).await;
    common::assert_pending(&order);
    assert_eq!(order.coupon_code, None);
}

#[tokio::test]
async fn percentage_coupon_reduces_net_amount() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(200), 12).await;
    let coupon = seed_coupon(&db, CouponSpec::default()).await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("save20".to_string()))
        .await
        .unwrap();

    assert_eq!(session.discount_amount, dec!(40));
    assert_eq!(session.net_amount, dec!(160));
    assert_eq!(
        session.coupon,
        CouponOutcome::Applied {
            code: "SAVE20".to_string(),
            discount_amount: dec!(40),
        }
    );

    // usage is counted exactly once, in the same transaction as the order
    let coupon = common::find_coupon(&db, coupon.id).await;
    assert_eq!(coupon.used_count, 1);
    let order = common::find_order(&db, session.order_id).await;
    assert_eq!(order.coupon_code.as_deref(), Some("SAVE20"));
}

#[tokio::test]
async fn fixed_coupon_larger_than_price_clamps_net_to_zero() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(30), 1).await;
    seed_coupon(
        &db,
        CouponSpec {
            code: "BIGFIX",
            discount_type: DiscountType::Fixed,
            discount_value: dec!(50),
            ..CouponSpec::default()
        },
    )
    .await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("BIGFIX".to_string()))
        .await
        .unwrap();

    assert_eq!(session.discount_amount, dec!(30));
    assert_eq!(session.net_amount, Decimal::ZERO);
}

#[tokio::test]
async fn invalid_coupon_does_not_block_checkout() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(100), 1).await;
    seed_coupon(
        &db,
        CouponSpec {
            code: "OLD",
            valid_until: Some(Utc::now() - Duration::hours(1)),
            ..CouponSpec::default()
        },
    )
    .await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("OLD".to_string()))
        .await
        .unwrap();

    assert_eq!(session.net_amount, dec!(100));
    assert_eq!(
        session.coupon,
        CouponOutcome::Rejected {
            code: "OLD".to_string(),
            reason: CouponRejection::Expired,
        }
    );
}

#[tokio::test]
async fn unknown_coupon_code_is_reported_not_fatal() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(75), 3).await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("NOPE".to_string()))
        .await
        .unwrap();

    assert_eq!(session.net_amount, dec!(75));
    assert_eq!(
        session.coupon,
        CouponOutcome::Rejected {
            code: "NOPE".to_string(),
            reason: CouponRejection::NotFound,
        }
    );
}

#[tokio::test]
async fn missing_plan_fails_checkout() {
    let (_db, services, _rx) = setup_services().await;

    let err = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), Uuid::new_v4(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn inactive_plan_is_not_purchasable() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_inactive_plan(&db, dec!(50)).await;

    let err = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn usage_cap_is_enforced_across_checkouts() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(100), 1).await;
    let coupon = seed_coupon(
        &db,
        CouponSpec {
            code: "ONCE",
            max_uses: Some(1),
            ..CouponSpec::default()
        },
    )
    .await;

    let first = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("ONCE".to_string()))
        .await
        .unwrap();
    assert!(matches!(first.coupon, CouponOutcome::Applied { .. }));

    let second = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("ONCE".to_string()))
        .await
        .unwrap();
    assert_eq!(second.net_amount, dec!(100));
    assert_eq!(
        second.coupon,
        CouponOutcome::Rejected {
            code: "ONCE".to_string(),
            reason: CouponRejection::UsageExhausted,
        }
    );

    let coupon = common::find_coupon(&db, coupon.id).await;
    assert_eq!(coupon.used_count, 1);
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell_a_limited_coupon() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(100), 1).await;
    let coupon = seed_coupon(
        &db,
        CouponSpec {
            code: "LAST1",
            max_uses: Some(1),
            ..CouponSpec::default()
        },
    )
    .await;

    let a = services.checkout.create_checkout_session(
        Uuid::new_v4(),
        plan.id,
        Some("LAST1".to_string()),
    );
    let b = services.checkout.create_checkout_session(
        Uuid::new_v4(),
        plan.id,
        Some("LAST1".to_string()),
    );
    let (a, b) = tokio::join!(a, b);
    let (a, b) = (a.unwrap(), b.unwrap());

    let applied = [&a.coupon, &b.coupon]
        .iter()
        .filter(|o| matches!(o, CouponOutcome::Applied { .. }))
        .count();
    assert_eq!(applied, 1, "exactly one checkout may redeem the last use");

    let coupon = common::find_coupon(&db, coupon.id).await;
    assert_eq!(coupon.used_count, 1);

    // the loser still checked out, undiscounted
    let loser = if matches!(a.coupon, CouponOutcome::Applied { .. }) {
        &b
    } else {
        &a
    };
    assert_eq!(loser.net_amount, dec!(100));
}

#[tokio::test]
async fn every_checkout_gets_a_distinct_session_ref() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(10), 1).await;

    let a = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, None)
        .await
        .unwrap();
    let b = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, None)
        .await
        .unwrap();

    assert_ne!(a.checkout_session_id, b.checkout_session_id);
    assert_ne!(a.order_id, b.order_id);

    let order_a = common::find_order(&db, a.order_id).await;
    let order_b = common::find_order(&db, b.order_id).await;
    assert_eq!(order_a.payment_status, PaymentStatus::Pending);
    assert_eq!(order_b.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn hundred_percent_coupon_prices_order_at_zero() {
    let (db, services, _rx) = setup_services().await;
    let plan = seed_plan(&db, dec!(49.99), 1).await;
    seed_coupon(
        &db,
        CouponSpec {
            code: "FREE",
            discount_value: Decimal::from(100),
            ..CouponSpec::default()
        },
    )
    .await;

    let session = services
        .checkout
        .create_checkout_session(Uuid::new_v4(), plan.id, Some("FREE".to_string()))
        .await
        .unwrap();

    assert_eq!(session.discount_amount, dec!(49.99));
    assert_eq!(session.net_amount, Decimal::ZERO);
}
