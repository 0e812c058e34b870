use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use axum_extra::extract::CookieJar;
use serde::Serialize;

use crate::{
    api::{handlers::user::UserDto, state::AppState},
    auth::{AuthService, SESSION_COOKIE},
    domain::ExternalIdentity,
    error::{AppError, Result},
    payments::signature,
};

pub const IDENTITY_SIGNATURE_HEADER: &str = "x-identity-signature";

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserDto,
}

/// Opens a session for an identity the OAuth front end has already verified.
/// The body is the JSON identity, signed with the shared identity secret.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let secret = state.settings.auth.identity_secret.as_deref().ok_or_else(|| {
        AppError::ServiceUnavailable("Identity login is not configured".to_string())
    })?;

    let provided = headers
        .get(IDENTITY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !signature::verify_identity_signature(secret, &body, provided) {
        tracing::warn!("Rejected identity handoff with invalid signature");
        return Err(AppError::Unauthorized);
    }

    let identity: ExternalIdentity = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed identity: {}", e)))?;

    let auth = &state.service_context.auth_service;
    let (user, token) = auth.login_with_identity(&identity).await?;
    tracing::info!("Opened session for user {}", user.id);

    Ok((
        jar.add(auth.create_session_cookie(&token)),
        Json(LoginResponse { user: user.into() }),
    ))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutResponse>)> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.service_context.auth_service
            .invalidate_session(cookie.value())
            .await?;
    }

    Ok((
        jar.add(AuthService::create_logout_cookie()),
        Json(LogoutResponse {
            message: "Logged out".to_string(),
        }),
    ))
}
