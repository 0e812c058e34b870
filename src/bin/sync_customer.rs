use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use sqlx::sqlite::SqlitePoolOptions;

use patron::{
    config::Settings,
    payments::{PaymentGateway, RazorpayClient},
    repository::{SqliteSubscriptionRepository, SqliteUserRepository, UserRepository},
    service::subscription_service::{CustomerLookup, SubscriptionService, SyncOutcome},
};

/// Pull every gateway subscription of a customer into the local ledger
#[derive(Parser)]
#[command(name = "sync-customer", version, about, long_about = None)]
#[command(group(ArgGroup::new("lookup").required(true).args(["customer_id", "email"])))]
struct Cli {
    /// Gateway customer id (cust_...)
    #[arg(long)]
    customer_id: Option<String>,

    /// Customer email, searched among recent gateway customers
    #[arg(long)]
    email: Option<String>,

    /// External identity id of the user the subscriptions belong to
    #[arg(long)]
    owner: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "patron=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("failed to load configuration")?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        RazorpayClient::from_config(&settings.gateway)?
            .context("gateway key_id and key_secret must be configured")?,
    );

    let users = SqliteUserRepository::new(db_pool.clone());
    let owner = users
        .find_by_external_id(&cli.owner)
        .await?
        .with_context(|| format!("no user with external id {}", cli.owner))?;

    let lookup = match (cli.customer_id, cli.email) {
        (Some(id), _) => CustomerLookup::Id(id),
        (None, Some(email)) => CustomerLookup::Email(email),
        (None, None) => anyhow::bail!("either --customer-id or --email is required"),
    };

    let service = SubscriptionService::new(
        gateway,
        Arc::new(SqliteSubscriptionRepository::new(db_pool)),
        settings.gateway.currency.clone(),
    );

    let report = service.sync_customer(&owner, lookup).await?;

    println!("Customer {} ({})", report.customer.id, report.customer.email.as_deref().unwrap_or("-"));
    for entry in &report.entries {
        match &entry.outcome {
            SyncOutcome::Inserted => println!("  inserted  {}", entry.subscription_id),
            SyncOutcome::Updated => println!("  updated   {}", entry.subscription_id),
            SyncOutcome::Error { error } => println!("  error     {}: {}", entry.subscription_id, error),
        }
    }

    let failed = report.failures();
    println!("{} synced, {} failed", report.entries.len() - failed, failed);

    if failed > 0 {
        anyhow::bail!("{} subscriptions failed to sync", failed);
    }
    Ok(())
}
