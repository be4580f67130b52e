#![forbid(unsafe_code)]

//! Subscription storefront backend: plan catalog, coupon pricing, checkout
//! session creation, payment-provider webhook reconciliation, and
//! subscription activation.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod rate_limiter;
pub mod services;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use sea_orm::ConnectionTrait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    config::AppConfig, db::DbPool, events::EventSender, handlers::AppServices,
    rate_limiter::RateLimiter,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: AppServices,
    pub redis: Option<redis::aio::ConnectionManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        redis: Option<redis::aio::ConnectionManager>,
    ) -> Self {
        let services = AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.currency.clone(),
            config.checkout_redirect_base.clone(),
        );
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_requests_per_window,
            std::time::Duration::from_secs(config.rate_limit_window_seconds),
        ));

        Self {
            db,
            config,
            event_sender,
            services,
            redis,
            rate_limiter,
        }
    }
}

/// All versioned API routes. Webhooks live under the same prefix so the
/// provider configuration only needs one base URL.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/plans",
            get(handlers::plans::list_plans).post(handlers::plans::create_plan),
        )
        .route(
            "/plans/:id",
            get(handlers::plans::get_plan)
                .put(handlers::plans::update_plan)
                .delete(handlers::plans::deactivate_plan),
        )
        .route(
            "/coupons",
            get(handlers::coupons::list_coupons).post(handlers::coupons::create_coupon),
        )
        .route(
            "/coupons/:id",
            put(handlers::coupons::update_coupon).delete(handlers::coupons::deactivate_coupon),
        )
        .route("/coupons/preview", post(handlers::coupons::preview_coupon))
        .route(
            "/checkout/session",
            post(handlers::checkout::create_checkout_session),
        )
        .route(
            "/payments/webhook",
            post(handlers::payment_webhooks::payment_webhook),
        )
        .route("/orders", get(handlers::orders::list_my_orders))
        .route("/orders/all", get(handlers::orders::list_all_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list_my_subscriptions),
        )
        .route(
            "/subscriptions/:id",
            get(handlers::subscriptions::get_subscription),
        )
        .route("/status", get(api_status))
}

/// Service identity and environment, for humans poking at the root.
pub async fn api_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "status": "running",
    }))
}

/// Liveness plus a database round trip.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .is_ok();

    let (status, label, db_label) = if db_ok {
        (StatusCode::OK, "healthy", "up")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "down")
    };
    (
        status,
        Json(json!({
            "status": label,
            "database": db_label,
        })),
    )
}
