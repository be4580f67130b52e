use crate::{
    auth::AuthUser, errors::ServiceError, services::subscriptions::SubscriptionResponse, AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

/// The caller's subscriptions, active and cancelled, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions",
    responses(
        (status = 200, description = "Subscriptions for the authenticated user", body = [SubscriptionResponse])
    ),
    security(("bearer_auth" = [])),
    tag = "subscriptions"
)]
pub async fn list_my_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SubscriptionResponse>>, ServiceError> {
    let subscriptions = state
        .services
        .subscriptions
        .list_for_user(user.user_id)
        .await?;
    Ok(Json(subscriptions))
}

#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/{id}",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription detail", body = SubscriptionResponse),
        (status = 404, description = "Subscription not found")
    ),
    security(("bearer_auth" = [])),
    tag = "subscriptions"
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SubscriptionResponse>, ServiceError> {
    let subscription = state.services.subscriptions.get_subscription(id).await?;
    if subscription.user_id != user.user_id && !user.is_admin {
        return Err(ServiceError::NotFound(format!(
            "Subscription {} not found",
            id
        )));
    }

    let plan_name = state
        .services
        .plans
        .get_plan(subscription.plan_id)
        .await
        .ok()
        .map(|p| p.name);

    Ok(Json(SubscriptionResponse {
        id: subscription.id,
        user_id: subscription.user_id,
        plan_id: subscription.plan_id,
        plan_name,
        order_id: subscription.order_id,
        status: subscription.status,
        start_date: subscription.start_date,
        end_date: subscription.end_date,
        created_at: subscription.created_at,
    }))
}
