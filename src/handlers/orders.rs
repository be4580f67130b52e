use crate::{
    auth::{AdminUser, AuthUser},
    errors::ServiceError,
    handlers::common::PaginationParams,
    services::orders::OrderResponse,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// The caller's own order history, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders for the authenticated user", body = [OrderResponse])
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<OrderResponse>>, ServiceError> {
    let orders = state.services.orders.list_for_user(user.user_id).await?;
    Ok(Json(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = OrderResponse),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    // Owners and admins only; anyone else sees the same 404 as a
    // nonexistent order.
    if order.user_id != user.user_id && !user.is_admin {
        return Err(ServiceError::NotFound(format!("Order {} not found", id)));
    }
    Ok(Json(order.into()))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/all",
    params(PaginationParams),
    responses(
        (status = 200, description = "All orders", body = OrderListResponse),
        (status = 403, description = "Admin required")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let (page, per_page) = params.clamped();
    let (orders, total) = state.services.orders.list_all(page, per_page).await?;
    Ok(Json(OrderListResponse {
        orders,
        total,
        page,
        per_page,
    }))
}
