use axum::{
    extract::{Extension, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    error::{AppError, Result},
    service::subscription_service::{CustomerLookup, SyncReport},
};

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    customer_id: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Query(query): Query<CustomerQuery>,
) -> Result<Json<CustomerResponse>> {
    let email = query.email.unwrap_or_else(|| current_user.user.email.clone());
    let customer_id = state.service_context.subscriptions()?
        .known_customer_id(&current_user.user, &email)
        .await?;

    Ok(Json(CustomerResponse { customer_id }))
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    customer_id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    customer_id: String,
    synced: usize,
    failed: usize,
    #[serde(flatten)]
    report: SyncReport,
}

pub async fn sync(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let lookup = match (req.customer_id, req.email) {
        (Some(id), _) if !id.trim().is_empty() => CustomerLookup::Id(id),
        (_, Some(email)) if !email.trim().is_empty() => CustomerLookup::Email(email),
        _ => return Err(AppError::Validation("Customer ID or email is required".to_string())),
    };

    let report = state.service_context.subscriptions()?
        .sync_customer(&current_user.user, lookup)
        .await?;

    let failed = report.failures();
    Ok(Json(SyncResponse {
        customer_id: report.customer.id.clone(),
        synced: report.entries.len() - failed,
        failed,
        report,
    }))
}
