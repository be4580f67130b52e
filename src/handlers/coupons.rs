use crate::{
    auth::{AdminUser, AuthUser},
    errors::ServiceError,
    handlers::common::PaginationParams,
    services::{
        coupons::{evaluate, CouponResponse, CouponVerdict, CreateCouponRequest, UpdateCouponRequest},
        checkout::CouponOutcome,
    },
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponListResponse {
    pub coupons: Vec<CouponResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    params(PaginationParams),
    responses(
        (status = 200, description = "Coupons", body = CouponListResponse),
        (status = 403, description = "Admin required")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<CouponListResponse>, ServiceError> {
    let (page, per_page) = params.clamped();
    let (coupons, total) = state.services.coupons.list_coupons(page, per_page).await?;
    Ok(Json(CouponListResponse {
        coupons,
        total,
        page,
        per_page,
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = CouponResponse),
        (status = 400, description = "Invalid coupon"),
        (status = 409, description = "Code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), ServiceError> {
    let coupon = state.services.coupons.create_coupon(request).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

#[utoipa::path(
    put,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = CouponResponse),
        (status = 404, description = "Coupon not found")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<Json<CouponResponse>, ServiceError> {
    let coupon = state.services.coupons.update_coupon(id, request).await?;
    Ok(Json(coupon))
}

#[utoipa::path(
    delete,
    path = "/api/v1/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon ID")),
    responses(
        (status = 200, description = "Coupon deactivated", body = CouponResponse),
        (status = 404, description = "Coupon not found")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn deactivate_coupon(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CouponResponse>, ServiceError> {
    let coupon = state.services.coupons.deactivate_coupon(id).await?;
    Ok(Json(coupon))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PreviewCouponRequest {
    pub code: String,
    pub plan_id: Uuid,
}

/// Evaluate a coupon against a plan's price without consuming a use.
///
/// Lets the storefront show the discounted total before the buyer commits.
/// The real redemption happens at checkout, so a preview never changes
/// `used_count`.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/preview",
    request_body = PreviewCouponRequest,
    responses(
        (status = 200, description = "Evaluation result", body = CouponOutcome),
        (status = 404, description = "Plan not found")
    ),
    security(("bearer_auth" = [])),
    tag = "coupons"
)]
pub async fn preview_coupon(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<PreviewCouponRequest>,
) -> Result<Json<CouponOutcome>, ServiceError> {
    let plan = state.services.plans.get_plan(request.plan_id).await?;
    if !plan.is_active {
        return Err(ServiceError::NotFound(format!(
            "Plan {} not found",
            request.plan_id
        )));
    }

    let code = request.code.trim().to_uppercase();
    let coupon = state.services.coupons.find_by_code(&code).await?;
    let outcome = match evaluate(coupon.as_ref(), Utc::now(), plan.price) {
        CouponVerdict::Accepted { discount } => CouponOutcome::Applied {
            code,
            discount_amount: discount,
        },
        CouponVerdict::Rejected(reason) => CouponOutcome::Rejected { code, reason },
    };

    Ok(Json(outcome))
}
