use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{User, UserRole},
    error::{AppError, Result},
};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SessionUserRow {
    session_id: String,
    expires_at: NaiveDateTime,
    session_created_at: NaiveDateTime,
    last_used_at: NaiveDateTime,
    user_id: String,
    external_identity_id: String,
    display_name: String,
    email: String,
    role: String,
    user_created_at: NaiveDateTime,
}

/// Server-side session rows. Only a SHA-256 of the bearer token is stored.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(&id)
        .bind(user_id.to_string())
        .bind(hash_token(token))
        .bind(expires_at.naive_utc())
        .bind(now.naive_utc())
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(Session {
            id,
            user_id,
            expires_at,
            created_at: now,
            last_used_at: now,
        })
    }

    /// Resolves a live session and its user in one query.
    pub async fn find_with_user(&self, token: &str) -> Result<Option<(Session, User)>> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.id AS session_id,
                   s.expires_at,
                   s.created_at AS session_created_at,
                   s.last_used_at,
                   u.id AS user_id,
                   u.external_identity_id,
                   u.display_name,
                   u.email,
                   u.role,
                   u.created_at AS user_created_at
            FROM sessions s
            INNER JOIN users u ON s.user_id = u.id
            WHERE s.token_hash = ? AND s.expires_at > ?
            LIMIT 1
            "#
        )
        .bind(hash_token(token))
        .bind(now.naive_utc())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE sessions SET last_used_at = ? WHERE id = ?")
            .bind(now.naive_utc())
            .bind(&row.session_id)
            .execute(&self.pool)
            .await?;

        let user_id = Uuid::parse_str(&row.user_id).map_err(|e| AppError::Database(e.to_string()))?;
        let session = Session {
            id: row.session_id,
            user_id,
            expires_at: DateTime::from_naive_utc_and_offset(row.expires_at, Utc),
            created_at: DateTime::from_naive_utc_and_offset(row.session_created_at, Utc),
            last_used_at: now,
        };
        let user = User {
            id: user_id,
            external_identity_id: row.external_identity_id,
            display_name: row.display_name,
            email: row.email,
            role: UserRole::from_str(&row.role)
                .ok_or_else(|| AppError::Database(format!("Invalid user role: {}", row.role)))?,
            created_at: DateTime::from_naive_utc_and_offset(row.user_created_at, Utc),
        };

        Ok(Some((session, user)))
    }

    pub async fn extend(&self, session_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
            .bind(expires_at.naive_utc())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete_by_token(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn hash_token(token: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
