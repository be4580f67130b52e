use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    entities::{
        coupon::DiscountType,
        order::PaymentStatus,
        subscription::SubscriptionStatus,
    },
    errors::ErrorResponse,
    handlers,
    services::{
        checkout::{CheckoutSessionResponse, CouponOutcome, CreateCheckoutRequest},
        coupons::{CouponRejection, CouponResponse, CreateCouponRequest, UpdateCouponRequest},
        orders::OrderResponse,
        plans::{CreatePlanRequest, PlanResponse, UpdatePlanRequest},
        subscriptions::SubscriptionResponse,
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::plans::list_plans,
        handlers::plans::get_plan,
        handlers::plans::create_plan,
        handlers::plans::update_plan,
        handlers::plans::deactivate_plan,
        handlers::coupons::list_coupons,
        handlers::coupons::create_coupon,
        handlers::coupons::update_coupon,
        handlers::coupons::deactivate_coupon,
        handlers::coupons::preview_coupon,
        handlers::checkout::create_checkout_session,
        handlers::payment_webhooks::payment_webhook,
        handlers::orders::list_my_orders,
        handlers::orders::get_order,
        handlers::orders::list_all_orders,
        handlers::subscriptions::list_my_subscriptions,
        handlers::subscriptions::get_subscription,
    ),
    components(schemas(
        ErrorResponse,
        DiscountType,
        PaymentStatus,
        SubscriptionStatus,
        PlanResponse,
        CreatePlanRequest,
        UpdatePlanRequest,
        CouponResponse,
        CreateCouponRequest,
        UpdateCouponRequest,
        CouponRejection,
        CouponOutcome,
        CreateCheckoutRequest,
        CheckoutSessionResponse,
        OrderResponse,
        SubscriptionResponse,
        handlers::coupons::CouponListResponse,
        handlers::coupons::PreviewCouponRequest,
        handlers::orders::OrderListResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "plans", description = "Subscription plan catalog"),
        (name = "coupons", description = "Coupon administration and preview"),
        (name = "checkout", description = "Checkout session creation"),
        (name = "payments", description = "Payment provider webhooks"),
        (name = "orders", description = "Order history"),
        (name = "subscriptions", description = "Subscription lifecycle"),
    ),
    info(
        title = "subflow-api",
        description = "Subscription storefront checkout, pricing, and order lifecycle API",
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Swagger UI mounted at `/swagger-ui`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_generates_and_covers_the_api() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/plans",
            "/api/v1/coupons/preview",
            "/api/v1/checkout/session",
            "/api/v1/payments/webhook",
            "/api/v1/orders",
            "/api/v1/subscriptions",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn webhook_operation_declares_a_plain_body() {
        let doc = ApiDoc::openapi();
        let item = doc
            .paths
            .paths
            .get("/api/v1/payments/webhook")
            .expect("webhook path");
        let op = item.post.as_ref().expect("post operation");
        // raw bytes are documented as an opaque string payload, not a schema
        assert!(op.request_body.is_some());
    }
}
