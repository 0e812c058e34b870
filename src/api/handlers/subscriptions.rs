use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{LifecycleAction, Subscription},
    error::{AppError, Result},
    service::{donation_service::to_minor_units, subscription_service::CreateSubscriptionInput},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(length(min = 1, message = "Plan ID is required"))]
    pub plan_id: String,
    /// Major currency units per cycle.
    #[validate(range(min = 1, message = "Amount must be at least 1"))]
    pub amount: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_count: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub subscription_id: String,
    pub status: String,
    pub short_url: Option<String>,
    pub subscription: Subscription,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(subscription: Subscription) -> Self {
        Self {
            subscription_id: subscription.gateway_subscription_id.clone(),
            status: subscription.status.as_str().to_string(),
            short_url: subscription.short_url.clone(),
            subscription,
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>)> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let input = CreateSubscriptionInput {
        plan_id: req.plan_id,
        amount: to_minor_units(req.amount)?,
        customer_name: req.customer_name,
        customer_email: req.customer_email,
        customer_phone: req.customer_phone.filter(|p| !p.trim().is_empty()),
        total_count: req.total_count,
    };

    let subscription = state.service_context.subscriptions()?
        .create_subscription(&current_user.user, input)
        .await?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(gateway_id): Path<String>,
) -> Result<Json<SubscriptionResponse>> {
    let subscription = state.service_context.subscriptions()?
        .reconcile(&current_user.user, &gateway_id)
        .await?;

    Ok(Json(subscription.into()))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionActionRequest {
    pub action: String,
    #[serde(default)]
    pub cancel_at_cycle_end: bool,
}

pub async fn update(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(gateway_id): Path<String>,
    Json(req): Json<SubscriptionActionRequest>,
) -> Result<Json<SubscriptionResponse>> {
    let action = LifecycleAction::from_str(&req.action).ok_or_else(|| {
        AppError::Validation("Invalid action. Use: cancel, pause, or resume".to_string())
    })?;

    let subscription = state.service_context.subscriptions()?
        .apply_action(&current_user.user, &gateway_id, action, req.cancel_at_cycle_end)
        .await?;

    Ok(Json(subscription.into()))
}
