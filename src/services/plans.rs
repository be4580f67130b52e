use crate::{
    entities::plan::{
        self, ActiveModel as PlanActiveModel, Entity as PlanEntity, Model as PlanModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreatePlanRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub price: Decimal,
    #[validate(range(min = 1, max = 120))]
    pub duration_months: i32,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdatePlanRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    #[validate(range(min = 1, max = 120))]
    pub duration_months: Option<i32>,
    pub features: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_months: i32,
    pub features: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlanModel> for PlanResponse {
    fn from(model: PlanModel) -> Self {
        let features = serde_json::from_value(model.features).unwrap_or_default();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            duration_months: model.duration_months,
            features,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

/// Subscription plan catalog.
#[derive(Clone)]
pub struct PlanService {
    db: Arc<DatabaseConnection>,
}

impl PlanService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<PlanModel, ServiceError> {
        PlanEntity::find_by_id(plan_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))
    }

    /// Active plans ordered by price, cheapest first. This is the public
    /// storefront listing, so inactive plans never appear here.
    #[instrument(skip(self))]
    pub async fn list_active_plans(&self) -> Result<Vec<PlanResponse>, ServiceError> {
        let plans = PlanEntity::find()
            .filter(plan::Column::IsActive.eq(true))
            .order_by_asc(plan::Column::Price)
            .all(&*self.db)
            .await?;
        Ok(plans.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_plan(
        &self,
        request: CreatePlanRequest,
    ) -> Result<PlanResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price must be positive".into(),
            ));
        }

        let now = Utc::now();
        let model = PlanActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            description: Set(request.description),
            price: Set(request.price),
            duration_months: Set(request.duration_months),
            features: Set(serde_json::json!(request.features)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let created = model.insert(&*self.db).await?;
        info!(plan_id = %created.id, "plan created");
        Ok(created.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update_plan(
        &self,
        plan_id: Uuid,
        request: UpdatePlanRequest,
    ) -> Result<PlanResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if let Some(price) = request.price {
            if price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "price must be positive".into(),
                ));
            }
        }

        let plan = self.get_plan(plan_id).await?;
        let mut active: PlanActiveModel = plan.into();

        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(duration_months) = request.duration_months {
            active.duration_months = Set(duration_months);
        }
        if let Some(features) = request.features {
            active.features = Set(serde_json::json!(features));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(&*self.db).await?;
        Ok(updated.into())
    }

    /// Soft delete: existing orders and subscriptions keep referring to the
    /// plan, it just stops being purchasable.
    #[instrument(skip(self))]
    pub async fn deactivate_plan(&self, plan_id: Uuid) -> Result<PlanResponse, ServiceError> {
        let plan = self.get_plan(plan_id).await?;
        let mut active: PlanActiveModel = plan.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db).await?;
        info!(plan_id = %plan_id, "plan deactivated");
        Ok(updated.into())
    }
}
