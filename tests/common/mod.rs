#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use subflow_api::{
    db::{establish_connection, run_migrations},
    entities::{
        coupon::{self, DiscountType},
        order::{self, PaymentStatus},
        plan,
    },
    events::EventSender,
    handlers::AppServices,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Fresh in-memory database with the full schema applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = establish_connection("sqlite::memory:")
        .await
        .expect("in-memory database");
    run_migrations(&db).await.expect("migrations");
    Arc::new(db)
}

/// Service registry over a fresh database. The event receiver is returned
/// so tests can assert on emitted events; dropping it is fine, senders
/// treat a closed channel as best-effort.
pub async fn setup_services() -> (
    Arc<DatabaseConnection>,
    AppServices,
    mpsc::Receiver<subflow_api::events::Event>,
) {
    let db = setup_db().await;
    let (tx, rx) = mpsc::channel(64);
    let services = AppServices::new(
        db.clone(),
        EventSender::new(tx),
        "ILS".to_string(),
        "http://localhost:5173".to_string(),
    );
    (db, services, rx)
}

pub async fn seed_plan(db: &DatabaseConnection, price: Decimal, duration_months: i32) -> plan::Model {
    plan::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Plan {}", &Uuid::new_v4().to_string()[..8])),
        description: Set(Some("Test plan".to_string())),
        price: Set(price),
        duration_months: Set(duration_months),
        features: Set(serde_json::json!(["feature-a"])),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("seed plan")
}

pub async fn seed_inactive_plan(db: &DatabaseConnection, price: Decimal) -> plan::Model {
    let plan = seed_plan(db, price, 1).await;
    let mut active: plan::ActiveModel = plan.into();
    active.is_active = Set(false);
    active.update(db).await.expect("deactivate plan")
}

pub struct CouponSpec {
    pub code: &'static str,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Default for CouponSpec {
    fn default() -> Self {
        Self {
            code: "SAVE20",
            discount_type: DiscountType::Percentage,
            discount_value: Decimal::from(20),
            max_uses: None,
            used_count: 0,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: None,
            is_active: true,
        }
    }
}

pub async fn seed_coupon(db: &DatabaseConnection, spec: CouponSpec) -> coupon::Model {
    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(spec.code.to_uppercase()),
        discount_type: Set(spec.discount_type),
        discount_value: Set(spec.discount_value),
        max_uses: Set(spec.max_uses),
        used_count: Set(spec.used_count),
        valid_from: Set(spec.valid_from),
        valid_until: Set(spec.valid_until),
        is_active: Set(spec.is_active),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("seed coupon")
}

pub async fn find_coupon(db: &DatabaseConnection, id: Uuid) -> coupon::Model {
    use sea_orm::EntityTrait;
    coupon::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query coupon")
        .expect("coupon exists")
}

pub async fn find_order(db: &DatabaseConnection, id: Uuid) -> order::Model {
    use sea_orm::EntityTrait;
    order::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query order")
        .expect("order exists")
}

/// Sets an order's payment reference directly, standing in for the
/// provider attaching one during its checkout flow.
pub async fn attach_payment_ref(db: &DatabaseConnection, order_id: Uuid, payment_ref: &str) {
    let order = find_order(db, order_id).await;
    let mut active: order::ActiveModel = order.into();
    active.payment_intent_id = Set(Some(payment_ref.to_string()));
    active.update(db).await.expect("attach payment ref");
}

pub fn assert_pending(order: &order::Model) {
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}
