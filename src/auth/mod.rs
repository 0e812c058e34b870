use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::{ExternalIdentity, User, UserRole},
    error::{AppError, Result},
    repository::UserRepository,
};

pub mod session;

use session::{Session, SessionStore};

pub const SESSION_COOKIE: &str = "session";

/// Session and identity layer. The OAuth exchange itself happens elsewhere;
/// this service starts from an already-verified [`ExternalIdentity`].
pub struct AuthService {
    session_store: SessionStore,
    users: Arc<dyn UserRepository>,
    session_duration: Duration,
    secure_cookies: bool,
}

impl AuthService {
    pub fn new(
        pool: SqlitePool,
        users: Arc<dyn UserRepository>,
        session_duration_hours: i64,
        secure_cookies: bool,
    ) -> Self {
        Self {
            session_store: SessionStore::new(pool),
            users,
            session_duration: Duration::hours(session_duration_hours),
            secure_cookies,
        }
    }

    /// Finds the user for `identity`, creating it on first login, and opens a session.
    pub async fn login_with_identity(&self, identity: &ExternalIdentity) -> Result<(User, String)> {
        if identity.id.trim().is_empty() {
            return Err(AppError::Validation("External identity id is required".to_string()));
        }

        let user = match self.users.find_by_external_id(&identity.id).await? {
            Some(user) => user,
            None => {
                let user = self.users.create(identity, UserRole::User).await?;
                tracing::info!("Created user {} on first login", user.id);
                user
            }
        };

        let (_session, token) = self.create_session(user.id).await?;
        Ok((user, token))
    }

    pub async fn create_session(&self, user_id: Uuid) -> Result<(Session, String)> {
        let token = generate_token();
        let expires_at = Utc::now() + self.session_duration;

        let session = self.session_store
            .create(user_id, &token, expires_at)
            .await?;

        Ok((session, token))
    }

    /// Resolves the acting user for a session token. Sessions past half
    /// their lifetime are extended.
    pub async fn resolve_user(&self, token: &str) -> Result<Option<User>> {
        let Some((session, user)) = self.session_store.find_with_user(token).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if session.expires_at - now < self.session_duration / 2 {
            self.session_store
                .extend(&session.id, now + self.session_duration)
                .await?;
        }

        Ok(Some(user))
    }

    pub async fn invalidate_session(&self, token: &str) -> Result<()> {
        self.session_store.delete_by_token(token).await
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        self.session_store.cleanup_expired().await
    }

    pub fn create_session_cookie(&self, token: &str) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token.to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .secure(self.secure_cookies)
            .max_age(cookie::time::Duration::seconds(self.session_duration.num_seconds()))
            .build()
    }

    pub fn create_logout_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(cookie::time::Duration::seconds(0))
            .build()
    }
}

fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
