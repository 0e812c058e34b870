use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{Donation, DonationStatus, NewDonation},
    error::{AppError, Result},
    repository::DonationRepository,
};

#[derive(FromRow)]
struct DonationRow {
    id: String,
    user_id: Option<String>,
    gateway_order_id: String,
    gateway_payment_id: String,
    amount: i64,
    currency: String,
    donor_name: String,
    donor_email: Option<String>,
    donor_phone: Option<String>,
    status: String,
    payment_method: String,
    created_at: NaiveDateTime,
}

pub struct SqliteDonationRepository {
    pool: SqlitePool,
}

impl SqliteDonationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_donation(row: DonationRow) -> Result<Donation> {
        Ok(Donation {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            user_id: row
                .user_id
                .map(|id| Uuid::parse_str(&id))
                .transpose()
                .map_err(|e| AppError::Database(e.to_string()))?,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            amount: row.amount,
            currency: row.currency,
            donor_name: row.donor_name,
            donor_email: row.donor_email,
            donor_phone: row.donor_phone,
            status: DonationStatus::from_str(&row.status)
                .ok_or_else(|| AppError::Database(format!("Invalid donation status: {}", row.status)))?,
            payment_method: row.payment_method,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

const SELECT_DONATION: &str = r#"
    SELECT id, user_id, gateway_order_id, gateway_payment_id, amount, currency,
           donor_name, donor_email, donor_phone, status, payment_method, created_at
    FROM donations
"#;

#[async_trait]
impl DonationRepository for SqliteDonationRepository {
    async fn create(&self, donation: NewDonation) -> Result<Donation> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO donations (
                id, user_id, gateway_order_id, gateway_payment_id, amount, currency,
                donor_name, donor_email, donor_phone, status, payment_method, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(donation.user_id.map(|u| u.to_string()))
        .bind(&donation.gateway_order_id)
        .bind(&donation.gateway_payment_id)
        .bind(donation.amount)
        .bind(&donation.currency)
        .bind(&donation.donor_name)
        .bind(&donation.donor_email)
        .bind(&donation.donor_phone)
        .bind(DonationStatus::Verified.as_str())
        .bind(&donation.payment_method)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_payment_id(&donation.gateway_payment_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created donation".to_string()))
    }

    async fn find_by_payment_id(&self, gateway_payment_id: &str) -> Result<Option<Donation>> {
        let row = sqlx::query_as::<_, DonationRow>(&format!(
            "{} WHERE gateway_payment_id = ?",
            SELECT_DONATION
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_donation).transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Donation>> {
        let rows = sqlx::query_as::<_, DonationRow>(&format!(
            "{} WHERE user_id = ? ORDER BY created_at DESC",
            SELECT_DONATION
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_donation).collect()
    }
}
