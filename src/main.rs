use std::{sync::Arc, time::Duration};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patron::{
    api,
    auth::AuthService,
    config::Settings,
    payments::{PaymentGateway, RazorpayClient},
    service::ServiceContext,
};

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patron=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Patron server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize the gateway client if configured
    let gateway: Option<Arc<dyn PaymentGateway>> = match RazorpayClient::from_config(&settings.gateway)? {
        Some(client) => {
            tracing::info!("Payment gateway enabled at {}", settings.gateway.base_url);
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("Payment gateway disabled");
            None
        }
    };

    if gateway.is_some() && settings.gateway.webhook_secret.is_none() {
        tracing::warn!("Gateway webhook secret not set; webhook deliveries will be refused");
    }

    let service_context = Arc::new(ServiceContext::new(db_pool, gateway, &settings));

    spawn_session_cleanup(service_context.auth_service.clone());

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_cleanup(auth_service: Arc<AuthService>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            match auth_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });
}
