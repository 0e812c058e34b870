use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
    payments::{signature, webhook::WebhookEvent},
};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let secret = state.settings.gateway.webhook_secret.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("Webhook secret is not configured".to_string())
    })?;

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Verification)?;

    if !signature::verify_webhook_signature(secret, &body, provided) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::Verification);
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

    state.service_context.subscriptions()?
        .handle_webhook_event(&event)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}
