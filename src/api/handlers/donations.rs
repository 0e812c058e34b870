use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::Donation,
    error::Result,
    payments::{GatewayOrder, GatewayPlan},
    service::donation_service::{OrderInput, VerifyPaymentInput},
};

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    /// Public key id for the checkout widget.
    pub key_id: Option<String>,
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<OrderInput>,
) -> Result<Json<OrderResponse>> {
    let order: GatewayOrder = state.service_context.donations()?
        .create_order(input)
        .await?;

    Ok(Json(OrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key_id: state.settings.gateway.key_id.clone(),
    }))
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub donation: Donation,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    current_user: Option<Extension<CurrentUser>>,
    Json(input): Json<VerifyPaymentInput>,
) -> Result<Json<VerifyResponse>> {
    let user = current_user.as_ref().map(|Extension(c)| &c.user);
    let donation = state.service_context.donations()?
        .verify_payment(user, input)
        .await?;

    Ok(Json(VerifyResponse {
        verified: true,
        donation,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub amount: i64,
    pub interval: Option<String>,
}

pub async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<GatewayPlan>> {
    let plan = state.service_context.donations()?
        .create_plan(req.amount, req.interval.as_deref())
        .await?;

    Ok(Json(plan))
}
