use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{
        NewSubscription, NewSubscriptionPayment, Subscription, SubscriptionPayment,
        SubscriptionPaymentRecord, SubscriptionState, SubscriptionStatus,
    },
    error::{AppError, Result},
    repository::SubscriptionRepository,
};

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: Option<String>,
    gateway_subscription_id: String,
    gateway_plan_id: String,
    gateway_customer_id: String,
    amount: i64,
    currency: String,
    subscriber_name: String,
    subscriber_email: String,
    subscriber_phone: Option<String>,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    next_charge_at: Option<i64>,
    total_count: i64,
    paid_count: i64,
    remaining_count: i64,
    short_url: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    subscription_id: String,
    gateway_payment_id: String,
    amount: i64,
    status: String,
    payment_date: NaiveDateTime,
    period_start: Option<i64>,
    period_end: Option<i64>,
}

#[derive(FromRow)]
struct PaymentRecordRow {
    #[sqlx(flatten)]
    payment: PaymentRow,
    gateway_subscription_id: String,
}

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, user_id, gateway_subscription_id, gateway_plan_id, gateway_customer_id,
           amount, currency, subscriber_name, subscriber_email, subscriber_phone, status,
           current_period_start, current_period_end, next_charge_at,
           total_count, paid_count, remaining_count, short_url, created_at, updated_at
    FROM subscriptions
"#;

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_uuid(s: &str) -> Result<Uuid> {
        Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
    }

    fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
        Ok(Subscription {
            id: Self::parse_uuid(&row.id)?,
            user_id: row.user_id.as_deref().map(Self::parse_uuid).transpose()?,
            gateway_subscription_id: row.gateway_subscription_id,
            gateway_plan_id: row.gateway_plan_id,
            gateway_customer_id: row.gateway_customer_id,
            amount: row.amount,
            currency: row.currency,
            subscriber_name: row.subscriber_name,
            subscriber_email: row.subscriber_email,
            subscriber_phone: row.subscriber_phone,
            status: SubscriptionStatus::from_str(&row.status).ok_or_else(|| {
                AppError::Database(format!("Invalid subscription status: {}", row.status))
            })?,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            next_charge_at: row.next_charge_at,
            total_count: row.total_count,
            paid_count: row.paid_count,
            remaining_count: row.remaining_count,
            short_url: row.short_url,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn row_to_payment(row: PaymentRow) -> Result<SubscriptionPayment> {
        Ok(SubscriptionPayment {
            id: Self::parse_uuid(&row.id)?,
            subscription_id: Self::parse_uuid(&row.subscription_id)?,
            gateway_payment_id: row.gateway_payment_id,
            amount: row.amount,
            status: row.status,
            payment_date: DateTime::from_naive_utc_and_offset(row.payment_date, Utc),
            period_start: row.period_start,
            period_end: row.period_end,
        })
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn create(&self, subscription: NewSubscription) -> Result<Subscription> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let state = &subscription.state;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, gateway_subscription_id, gateway_plan_id, gateway_customer_id,
                amount, currency, subscriber_name, subscriber_email, subscriber_phone, status,
                current_period_start, current_period_end, next_charge_at,
                total_count, paid_count, remaining_count, short_url, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(subscription.user_id.map(|u| u.to_string()))
        .bind(&subscription.gateway_subscription_id)
        .bind(&subscription.gateway_plan_id)
        .bind(&subscription.gateway_customer_id)
        .bind(subscription.amount)
        .bind(&subscription.currency)
        .bind(&subscription.subscriber_name)
        .bind(&subscription.subscriber_email)
        .bind(&subscription.subscriber_phone)
        .bind(state.status.as_str())
        .bind(state.current_period_start)
        .bind(state.current_period_end)
        .bind(state.next_charge_at)
        .bind(state.total_count)
        .bind(state.paid_count)
        .bind(state.remaining_count)
        .bind(&subscription.short_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_gateway_id(&subscription.gateway_subscription_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created subscription".to_string()))
    }

    async fn find_by_gateway_id(&self, gateway_subscription_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "{} WHERE gateway_subscription_id = ?",
            SELECT_SUBSCRIPTION
        ))
        .bind(gateway_subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_subscription).transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "{} WHERE user_id = ? ORDER BY created_at DESC",
            SELECT_SUBSCRIPTION
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_subscription).collect()
    }

    async fn find_customer_id(&self, user_id: Uuid, email: &str) -> Result<Option<String>> {
        let customer_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT gateway_customer_id
            FROM subscriptions
            WHERE user_id = ? AND subscriber_email = ?
            ORDER BY created_at DESC
            LIMIT 1
            "#
        )
        .bind(user_id.to_string())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer_id)
    }

    async fn update_state(
        &self,
        gateway_subscription_id: &str,
        state: &SubscriptionState,
    ) -> Result<Subscription> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = ?,
                current_period_start = ?,
                current_period_end = ?,
                next_charge_at = ?,
                total_count = ?,
                paid_count = ?,
                remaining_count = ?,
                updated_at = ?
            WHERE gateway_subscription_id = ?
            "#
        )
        .bind(state.status.as_str())
        .bind(state.current_period_start)
        .bind(state.current_period_end)
        .bind(state.next_charge_at)
        .bind(state.total_count)
        .bind(state.paid_count)
        .bind(state.remaining_count)
        .bind(now)
        .bind(gateway_subscription_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Subscription {} not found",
                gateway_subscription_id
            )));
        }

        self.find_by_gateway_id(gateway_subscription_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve updated subscription".to_string()))
    }

    async fn delete_by_gateway_id(&self, gateway_subscription_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE gateway_subscription_id = ?")
            .bind(gateway_subscription_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_payment(&self, payment: NewSubscriptionPayment) -> Result<SubscriptionPayment> {
        let id = Uuid::new_v4();
        let payment_date = payment.paid_at.unwrap_or_else(Utc::now).naive_utc();

        sqlx::query(
            r#"
            INSERT INTO subscription_payments (
                id, subscription_id, gateway_payment_id, amount, status,
                payment_date, period_start, period_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(payment.subscription_id.to_string())
        .bind(&payment.gateway_payment_id)
        .bind(payment.amount)
        .bind(&payment.status)
        .bind(payment_date)
        .bind(payment.period_start)
        .bind(payment.period_end)
        .execute(&self.pool)
        .await?;

        self.find_payment_by_gateway_id(&payment.gateway_payment_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve recorded payment".to_string()))
    }

    async fn find_payment_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<SubscriptionPayment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, subscription_id, gateway_payment_id, amount, status,
                   payment_date, period_start, period_end
            FROM subscription_payments
            WHERE gateway_payment_id = ?
            "#
        )
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionPaymentRecord>> {
        let rows = sqlx::query_as::<_, PaymentRecordRow>(
            r#"
            SELECT sp.id, sp.subscription_id, sp.gateway_payment_id, sp.amount, sp.status,
                   sp.payment_date, sp.period_start, sp.period_end,
                   s.gateway_subscription_id
            FROM subscription_payments sp
            JOIN subscriptions s ON sp.subscription_id = s.id
            WHERE s.user_id = ?
            ORDER BY sp.payment_date DESC
            "#
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SubscriptionPaymentRecord {
                    payment: Self::row_to_payment(row.payment)?,
                    gateway_subscription_id: row.gateway_subscription_id,
                })
            })
            .collect()
    }
}
