use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::checkout::{CheckoutSessionResponse, CreateCheckoutRequest},
    AppState,
};
use axum::{extract::State, http::StatusCode, Json};
use tracing::warn;

/// Start a checkout: price the plan, apply the coupon, create the pending
/// order, and hand back the payment redirect URL.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = CreateCheckoutRequest,
    responses(
        (status = 201, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 404, description = "Plan not found or inactive"),
        (status = 429, description = "Too many checkout attempts")
    ),
    security(("bearer_auth" = [])),
    tag = "checkout"
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutSessionResponse>), ServiceError> {
    let rate_key = format!("checkout:{}", user.user_id);
    if !state.rate_limiter.check(&rate_key) {
        warn!(user_id = %user.user_id, "checkout rate limit hit");
        return Err(ServiceError::RateLimitExceeded);
    }

    let session = state
        .services
        .checkout
        .create_checkout_session(user.user_id, request.plan_id, request.coupon_code)
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}
