use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod user_repository;
pub mod donation_repository;
pub mod subscription_repository;

pub use user_repository::SqliteUserRepository;
pub use donation_repository::SqliteDonationRepository;
pub use subscription_repository::SqliteSubscriptionRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, identity: &ExternalIdentity, role: UserRole) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<User>>;
    async fn update_role(&self, id: Uuid, role: UserRole) -> Result<User>;
}

#[async_trait]
pub trait DonationRepository: Send + Sync {
    async fn create(&self, donation: NewDonation) -> Result<Donation>;
    async fn find_by_payment_id(&self, gateway_payment_id: &str) -> Result<Option<Donation>>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Donation>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: NewSubscription) -> Result<Subscription>;
    async fn find_by_gateway_id(&self, gateway_subscription_id: &str) -> Result<Option<Subscription>>;
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Subscription>>;
    /// Gateway customer id previously used by `user_id` with `email`, if any.
    async fn find_customer_id(&self, user_id: Uuid, email: &str) -> Result<Option<String>>;
    async fn update_state(
        &self,
        gateway_subscription_id: &str,
        state: &SubscriptionState,
    ) -> Result<Subscription>;
    /// Returns whether a row was removed.
    async fn delete_by_gateway_id(&self, gateway_subscription_id: &str) -> Result<bool>;
    async fn record_payment(&self, payment: NewSubscriptionPayment) -> Result<SubscriptionPayment>;
    async fn find_payment_by_gateway_id(&self, gateway_payment_id: &str) -> Result<Option<SubscriptionPayment>>;
    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<SubscriptionPaymentRecord>>;
}
