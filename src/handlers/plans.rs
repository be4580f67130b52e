use crate::{
    auth::AdminUser,
    errors::ServiceError,
    services::plans::{CreatePlanRequest, PlanResponse, UpdatePlanRequest},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// List purchasable plans. Public: no authentication required.
#[utoipa::path(
    get,
    path = "/api/v1/plans",
    responses(
        (status = 200, description = "Active plans", body = [PlanResponse])
    ),
    tag = "plans"
)]
pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlanResponse>>, ServiceError> {
    let plans = state.services.plans.list_active_plans().await?;
    Ok(Json(plans))
}

#[utoipa::path(
    get,
    path = "/api/v1/plans/{id}",
    params(("id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan detail", body = PlanResponse),
        (status = 404, description = "Plan not found")
    ),
    tag = "plans"
)]
pub async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanResponse>, ServiceError> {
    let plan = state.services.plans.get_plan(id).await?;
    Ok(Json(plan.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/plans",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, description = "Plan created", body = PlanResponse),
        (status = 400, description = "Invalid plan"),
        (status = 403, description = "Admin required")
    ),
    security(("bearer_auth" = [])),
    tag = "plans"
)]
pub async fn create_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanResponse>), ServiceError> {
    let plan = state.services.plans.create_plan(request).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

#[utoipa::path(
    put,
    path = "/api/v1/plans/{id}",
    params(("id" = Uuid, Path, description = "Plan ID")),
    request_body = UpdatePlanRequest,
    responses(
        (status = 200, description = "Plan updated", body = PlanResponse),
        (status = 404, description = "Plan not found")
    ),
    security(("bearer_auth" = [])),
    tag = "plans"
)]
pub async fn update_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePlanRequest>,
) -> Result<Json<PlanResponse>, ServiceError> {
    let plan = state.services.plans.update_plan(id, request).await?;
    Ok(Json(plan))
}

#[utoipa::path(
    delete,
    path = "/api/v1/plans/{id}",
    params(("id" = Uuid, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan deactivated", body = PlanResponse),
        (status = 404, description = "Plan not found")
    ),
    security(("bearer_auth" = [])),
    tag = "plans"
)]
pub async fn deactivate_plan(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanResponse>, ServiceError> {
    let plan = state.services.plans.deactivate_plan(id).await?;
    Ok(Json(plan))
}
