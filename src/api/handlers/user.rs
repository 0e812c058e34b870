use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{User, UserRole},
    error::Result,
    service::{donation_service::DonationHistory, subscription_service::SubscriptionHistory},
};

#[derive(Debug, Serialize)]
pub struct UserDto {
    id: Uuid,
    name: String,
    email: String,
    role: UserRole,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.display_name,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    user: Option<UserDto>,
}

pub async fn session(current_user: Option<Extension<CurrentUser>>) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: current_user.map(|Extension(c)| c.user.into()),
    })
}

pub async fn donations(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<DonationHistory>> {
    let history = DonationHistory::load(
        state.service_context.donation_repo.as_ref(),
        &current_user.user,
    )
    .await?;

    Ok(Json(history))
}

pub async fn subscriptions(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<SubscriptionHistory>> {
    let history = SubscriptionHistory::load(
        state.service_context.subscription_repo.as_ref(),
        &current_user.user,
    )
    .await?;

    Ok(Json(history))
}
