use crate::{
    entities::{
        order::{ActiveModel as OrderActiveModel, Model as OrderModel, PaymentStatus},
        plan::Model as PlanModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::coupons::{evaluate, CouponRejection, CouponService, CouponVerdict},
};
use chrono::Utc;
use rand::RngCore;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// What happened to the coupon the buyer supplied, reported alongside the
/// created session. A rejected or unavailable coupon never blocks checkout;
/// the order simply carries no discount.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CouponOutcome {
    NotRequested,
    Applied {
        code: String,
        discount_amount: Decimal,
    },
    Rejected {
        code: String,
        reason: CouponRejection,
    },
    /// The coupon could not be checked (lookup failure). Checkout proceeds
    /// at full price rather than failing the purchase.
    Unavailable {
        code: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutSessionResponse {
    pub order_id: Uuid,
    pub checkout_session_id: String,
    pub checkout_url: String,
    pub gross_amount: Decimal,
    pub discount_amount: Decimal,
    pub net_amount: Decimal,
    pub currency: String,
    pub coupon: CouponOutcome,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCheckoutRequest {
    pub plan_id: Uuid,
    pub coupon_code: Option<String>,
}

/// Builds priced, pending orders and their checkout sessions.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    coupons: CouponService,
    currency: String,
    redirect_base: String,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        coupons: CouponService,
        currency: String,
        redirect_base: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            coupons,
            currency,
            redirect_base,
        }
    }

    /// Prices the plan, applies the coupon if one was given and passes
    /// evaluation, and creates the pending order. The coupon's usage
    /// increment and the order insert share one transaction, so a counted
    /// use always has an order behind it.
    #[instrument(skip(self), fields(user_id = %user_id, plan_id = %plan_id))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
        coupon_code: Option<String>,
    ) -> Result<CheckoutSessionResponse, ServiceError> {
        use crate::entities::plan::{Column as PlanColumn, Entity as PlanEntity};

        let plan = PlanEntity::find_by_id(plan_id)
            .filter(PlanColumn::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan {} not found", plan_id)))?;

        let gross = plan.price;
        let (outcome, coupon_id) = self.evaluate_coupon(coupon_code, gross).await;

        let discount = match &outcome {
            CouponOutcome::Applied {
                discount_amount, ..
            } => *discount_amount,
            _ => Decimal::ZERO,
        };

        let (order, outcome) = self
            .persist_order(user_id, &plan, gross, discount, coupon_id, outcome)
            .await?;

        let checkout_url = format!(
            "{}/payment-success?session_id={}",
            self.redirect_base.trim_end_matches('/'),
            order.checkout_session_id
        );

        metrics::counter!("checkout_sessions_created_total", 1);
        if let Err(e) = self.event_sender.send(Event::OrderCreated {
            order_id: order.id,
            user_id,
            net_amount: order.net_amount,
        }) {
            warn!(order_id = %order.id, error = %e, "failed to emit order created event");
        }
        if let CouponOutcome::Applied {
            code,
            discount_amount,
        } = &outcome
        {
            if let Err(e) = self.event_sender.send(Event::CouponRedeemed {
                code: code.clone(),
                order_id: order.id,
                discount_amount: *discount_amount,
            }) {
                warn!(order_id = %order.id, error = %e, "failed to emit coupon redeemed event");
            }
        }

        info!(
            order_id = %order.id,
            session = %order.checkout_session_id,
            net = %order.net_amount,
            "checkout session created"
        );

        Ok(CheckoutSessionResponse {
            order_id: order.id,
            checkout_session_id: order.checkout_session_id.clone(),
            checkout_url,
            gross_amount: order.gross_amount,
            discount_amount: order.discount_amount,
            net_amount: order.net_amount,
            currency: order.currency,
            coupon: outcome,
        })
    }

    /// Looks up and evaluates the coupon without consuming a use. A lookup
    /// failure degrades to `Unavailable` instead of failing the checkout.
    async fn evaluate_coupon(
        &self,
        coupon_code: Option<String>,
        gross: Decimal,
    ) -> (CouponOutcome, Option<Uuid>) {
        let Some(code) = coupon_code.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty())
        else {
            return (CouponOutcome::NotRequested, None);
        };

        let coupon = match self.coupons.find_by_code(&code).await {
            Ok(coupon) => coupon,
            Err(e) => {
                error!(code = %code, error = %e, "coupon lookup failed, proceeding without discount");
                metrics::counter!("coupon_lookups_failed_total", 1);
                return (CouponOutcome::Unavailable { code }, None);
            }
        };

        match evaluate(coupon.as_ref(), Utc::now(), gross) {
            CouponVerdict::Accepted { discount } => {
                let coupon_id = coupon.map(|c| c.id);
                (
                    CouponOutcome::Applied {
                        code,
                        discount_amount: discount,
                    },
                    coupon_id,
                )
            }
            CouponVerdict::Rejected(reason) => {
                info!(code = %code, reason = %reason, "coupon rejected");
                (CouponOutcome::Rejected { code, reason }, None)
            }
        }
    }

    /// Inserts the order, consuming one coupon use in the same transaction
    /// when a discount was accepted. If the conditional increment finds the
    /// coupon exhausted in the meantime, the order is written at full price
    /// and the outcome downgraded.
    async fn persist_order(
        &self,
        user_id: Uuid,
        plan: &PlanModel,
        gross: Decimal,
        discount: Decimal,
        coupon_id: Option<Uuid>,
        outcome: CouponOutcome,
    ) -> Result<(OrderModel, CouponOutcome), ServiceError> {
        let txn = self.db.begin().await?;

        let (discount, outcome) = match (coupon_id, outcome) {
            (Some(coupon_id), CouponOutcome::Applied { code, discount_amount }) => {
                if self.coupons.redeem(&txn, coupon_id).await? {
                    (
                        discount_amount,
                        CouponOutcome::Applied {
                            code,
                            discount_amount,
                        },
                    )
                } else {
                    // Raced past the cap between evaluation and redeem.
                    info!(code = %code, "coupon exhausted during checkout");
                    (
                        Decimal::ZERO,
                        CouponOutcome::Rejected {
                            code,
                            reason: CouponRejection::UsageExhausted,
                        },
                    )
                }
            }
            (_, outcome) => (discount, outcome),
        };

        let net = (gross - discount).max(Decimal::ZERO);
        let coupon_code = match &outcome {
            CouponOutcome::Applied { code, .. } => Some(code.clone()),
            _ => None,
        };

        let now = Utc::now();
        let model = OrderActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            plan_id: Set(plan.id),
            gross_amount: Set(gross),
            discount_amount: Set(discount),
            net_amount: Set(net),
            currency: Set(self.currency.clone()),
            coupon_code: Set(coupon_code),
            payment_status: Set(PaymentStatus::Pending),
            checkout_session_id: Set(new_session_ref()),
            payment_intent_id: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
        };

        let order = model.insert(&txn).await?;
        txn.commit().await?;

        Ok((order, outcome))
    }
}

/// Opaque session reference handed to the payment provider and later
/// matched against its completion events.
fn new_session_ref() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("cs_{}", hex::encode(bytes))
}
