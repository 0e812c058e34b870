pub mod auth;
pub mod customer;
pub mod donations;
pub mod root;
pub mod subscriptions;
pub mod user;
pub mod webhooks;
