//! Payment gateway access.
//!
//! Everything that talks to the gateway goes through [`PaymentGateway`], so the
//! HTTP client in [`razorpay`] and the in-memory [`fake`] gateway used by tests
//! are interchangeable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod razorpay;
pub mod signature;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use razorpay::RazorpayClient;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The requested start time was already in the past when the gateway
    /// processed the request. Retryable with a later start time.
    #[error("start time rejected: {0}")]
    Timing(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected ({code}): {description}")]
    Rejected { code: String, description: String },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_timing(&self) -> bool {
        matches!(self, GatewayError::Timing(_))
    }
}

/// Whether a gateway error description refers to a start time that has
/// already passed.
pub fn is_timing_error(description: &str) -> bool {
    let lower = description.to_lowercase();
    lower.contains("start")
        && (lower.contains("past")
            || lower.contains("lesser than the current time")
            || lower.contains("less than the current time")
            || lower.contains("less than current time"))
}

pub type Notes = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrder {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: Notes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PlanPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanPeriod::Daily => "daily",
            PlanPeriod::Weekly => "weekly",
            PlanPeriod::Monthly => "monthly",
            PlanPeriod::Yearly => "yearly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(PlanPeriod::Daily),
            "weekly" => Some(PlanPeriod::Weekly),
            "monthly" => Some(PlanPeriod::Monthly),
            "yearly" => Some(PlanPeriod::Yearly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub period: PlanPeriod,
    pub interval: u32,
    pub amount: i64,
    pub currency: String,
    pub item_name: String,
    pub description: String,
    pub notes: Notes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    #[serde(default)]
    pub name: Option<String>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPlan {
    pub id: String,
    pub period: String,
    pub interval: u32,
    pub item: PlanItem,
}

#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: Notes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayCustomer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub plan_id: String,
    pub customer_id: String,
    pub total_count: i64,
    pub quantity: i64,
    /// Epoch seconds.
    pub expire_by: i64,
    /// Epoch seconds; `None` asks the gateway to start immediately.
    pub start_at: Option<i64>,
    pub notes: Notes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySubscription {
    pub id: String,
    pub plan_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub current_start: Option<i64>,
    #[serde(default)]
    pub current_end: Option<i64>,
    #[serde(default)]
    pub charge_at: Option<i64>,
    #[serde(default)]
    pub start_at: Option<i64>,
    #[serde(default)]
    pub total_count: Option<i64>,
    #[serde(default)]
    pub paid_count: i64,
    #[serde(default)]
    pub remaining_count: Option<i64>,
    #[serde(default)]
    pub short_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Present only when the gateway expands the plan.
    #[serde(default)]
    pub plan: Option<GatewayPlanRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPlanRef {
    pub item: PlanItem,
}

/// A payment entity as delivered with subscription webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub amount: i64,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: CreateOrder) -> GatewayResult<GatewayOrder>;
    async fn fetch_order(&self, order_id: &str) -> GatewayResult<GatewayOrder>;
    async fn create_plan(&self, request: CreatePlan) -> GatewayResult<GatewayPlan>;
    /// Not idempotent: every call creates a new customer upstream.
    async fn create_customer(&self, request: CreateCustomer) -> GatewayResult<GatewayCustomer>;
    async fn fetch_customer(&self, customer_id: &str) -> GatewayResult<GatewayCustomer>;
    async fn list_customers(&self, count: u32) -> GatewayResult<Vec<GatewayCustomer>>;
    async fn create_subscription(&self, request: CreateSubscription) -> GatewayResult<GatewaySubscription>;
    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription>;
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        cancel_at_cycle_end: bool,
    ) -> GatewayResult<GatewaySubscription>;
    async fn pause_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription>;
    async fn resume_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription>;
    /// No server-side customer filter; callers filter the page themselves.
    async fn list_subscriptions(&self, count: u32) -> GatewayResult<Vec<GatewaySubscription>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_error_classification() {
        assert!(is_timing_error("start_at cannot be lesser than the current time"));
        assert!(is_timing_error("Start time is past"));
        assert!(is_timing_error("The start time should not be in the past"));
        assert!(!is_timing_error("The id provided does not exist"));
        assert!(!is_timing_error("Customer already exists for the merchant"));
    }

    #[test]
    fn test_subscription_decodes_with_sparse_fields() {
        let body = r#"{
            "id": "sub_00000000000001",
            "entity": "subscription",
            "plan_id": "plan_00000000000001",
            "customer_id": null,
            "status": "created",
            "current_start": null,
            "paid_count": 0,
            "total_count": 120,
            "remaining_count": 120,
            "short_url": "https://rzp.io/i/z3b1R61A9",
            "notes": []
        }"#;
        let sub: GatewaySubscription = serde_json::from_str(body).unwrap();
        assert_eq!(sub.status, "created");
        assert_eq!(sub.customer_id, None);
        assert_eq!(sub.total_count, Some(120));
        assert!(sub.plan.is_none());
    }
}
