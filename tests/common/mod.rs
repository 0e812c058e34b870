#![allow(dead_code)]

use std::sync::Arc;

use patron::{
    config::Settings,
    domain::{ExternalIdentity, User, UserRole},
    payments::{fake::FakeGateway, GatewaySubscription, PaymentGateway},
    repository::{SqliteUserRepository, UserRepository},
    service::ServiceContext,
};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const IDENTITY_SECRET: &str = "test_identity_secret";

/// A single connection keeps every query on the same in-memory database.
pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    Ok(pool)
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.gateway.key_id = Some("rzp_test_key".to_string());
    settings.gateway.key_secret = Some(KEY_SECRET.to_string());
    settings.gateway.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    settings.auth.identity_secret = Some(IDENTITY_SECRET.to_string());
    settings
}

pub struct TestContext {
    pub pool: SqlitePool,
    pub gateway: Arc<FakeGateway>,
    pub services: Arc<ServiceContext>,
    pub settings: Settings,
}

pub async fn test_context() -> anyhow::Result<TestContext> {
    let pool = test_pool().await?;
    let gateway = Arc::new(FakeGateway::new());
    let settings = test_settings();
    let dyn_gateway: Arc<dyn PaymentGateway> = gateway.clone();
    let services = Arc::new(ServiceContext::new(pool.clone(), Some(dyn_gateway), &settings));

    Ok(TestContext {
        pool,
        gateway,
        services,
        settings,
    })
}

pub async fn create_user(pool: &SqlitePool, external_id: &str, email: &str) -> anyhow::Result<User> {
    let repo = SqliteUserRepository::new(pool.clone());
    let user = repo
        .create(
            &ExternalIdentity {
                id: external_id.to_string(),
                name: format!("User {}", external_id),
                email: email.to_string(),
            },
            UserRole::User,
        )
        .await?;
    Ok(user)
}

pub async fn create_admin(pool: &SqlitePool, external_id: &str, email: &str) -> anyhow::Result<User> {
    let user = create_user(pool, external_id, email).await?;
    let repo = SqliteUserRepository::new(pool.clone());
    Ok(repo.update_role(user.id, UserRole::Admin).await?)
}

pub fn gateway_subscription(id: &str, customer_id: &str, status: &str) -> GatewaySubscription {
    GatewaySubscription {
        id: id.to_string(),
        plan_id: "plan_00000000000099".to_string(),
        customer_id: Some(customer_id.to_string()),
        status: status.to_string(),
        current_start: Some(1_735_689_600),
        current_end: Some(1_738_368_000),
        charge_at: Some(1_738_368_000),
        start_at: None,
        total_count: Some(12),
        paid_count: 1,
        remaining_count: Some(11),
        short_url: None,
        created_at: Some(1_735_689_600),
        plan: None,
    }
}
