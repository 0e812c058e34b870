pub mod donation_service;
pub mod subscription_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::auth::AuthService;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::payments::PaymentGateway;
use crate::repository::*;
use donation_service::DonationService;
use subscription_service::SubscriptionService;

pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub donation_repo: Arc<dyn DonationRepository>,
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub auth_service: Arc<AuthService>,
    /// `None` when no gateway is configured.
    pub donation_service: Option<Arc<DonationService>>,
    pub subscription_service: Option<Arc<SubscriptionService>>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        gateway: Option<Arc<dyn PaymentGateway>>,
        settings: &Settings,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> =
            Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let donation_repo: Arc<dyn DonationRepository> =
            Arc::new(SqliteDonationRepository::new(db_pool.clone()));
        let subscription_repo: Arc<dyn SubscriptionRepository> =
            Arc::new(SqliteSubscriptionRepository::new(db_pool.clone()));

        let auth_service = Arc::new(AuthService::new(
            db_pool.clone(),
            user_repo.clone(),
            settings.auth.session_duration_hours,
            settings.auth.secure_cookies,
        ));

        let currency = settings.gateway.currency.clone();
        let (donation_service, subscription_service) = match gateway {
            Some(gateway) => (
                Some(Arc::new(DonationService::new(
                    gateway.clone(),
                    donation_repo.clone(),
                    settings.gateway.key_secret.clone().unwrap_or_default(),
                    currency.clone(),
                ))),
                Some(Arc::new(SubscriptionService::new(
                    gateway,
                    subscription_repo.clone(),
                    currency,
                ))),
            ),
            None => (None, None),
        };

        Self {
            user_repo,
            donation_repo,
            subscription_repo,
            auth_service,
            donation_service,
            subscription_service,
            db_pool,
        }
    }

    pub fn donations(&self) -> Result<&DonationService> {
        self.donation_service
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("Payment gateway is not configured".to_string()))
    }

    pub fn subscriptions(&self) -> Result<&SubscriptionService> {
        self.subscription_service
            .as_deref()
            .ok_or_else(|| AppError::ServiceUnavailable("Payment gateway is not configured".to_string()))
    }
}
