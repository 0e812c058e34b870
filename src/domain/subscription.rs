use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local mirror of a gateway subscription. The gateway is authoritative;
/// every field listed in [`SubscriptionState`] is overwritten on reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub gateway_subscription_id: String,
    pub gateway_plan_id: String,
    pub gateway_customer_id: String,
    /// Minor currency units per billing cycle.
    pub amount: i64,
    pub currency: String,
    pub subscriber_name: String,
    pub subscriber_email: String,
    pub subscriber_phone: Option<String>,
    pub status: SubscriptionStatus,
    /// Epoch seconds, as reported by the gateway.
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub next_charge_at: Option<i64>,
    pub total_count: i64,
    pub paid_count: i64,
    pub remaining_count: i64,
    pub short_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState {
            status: self.status,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            next_charge_at: self.next_charge_at,
            total_count: self.total_count,
            paid_count: self.paid_count,
            remaining_count: self.remaining_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Created,
    Active,
    Authenticated,
    Activated,
    Paused,
    Halted,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Created => "created",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Authenticated => "authenticated",
            SubscriptionStatus::Activated => "activated",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Halted => "halted",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Returns `None` for any status outside the accepted set.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(SubscriptionStatus::Created),
            "active" => Some(SubscriptionStatus::Active),
            "authenticated" => Some(SubscriptionStatus::Authenticated),
            "activated" => Some(SubscriptionStatus::Activated),
            "paused" => Some(SubscriptionStatus::Paused),
            "halted" => Some(SubscriptionStatus::Halted),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses counted as a live recurring donation in dashboard totals.
    pub fn is_active_like(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active
                | SubscriptionStatus::Authenticated
                | SubscriptionStatus::Activated
        )
    }

    /// Leftovers of an incomplete creation attempt.
    pub fn is_stale(&self) -> bool {
        matches!(self, SubscriptionStatus::Created | SubscriptionStatus::Halted)
    }
}

/// The gateway-owned portion of a subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub next_charge_at: Option<i64>,
    pub total_count: i64,
    pub paid_count: i64,
    pub remaining_count: i64,
}

impl SubscriptionState {
    /// `remaining_count` is always derived so the ledger invariant
    /// `remaining = total - paid` holds for every write.
    pub fn new(
        status: SubscriptionStatus,
        current_period_start: Option<i64>,
        current_period_end: Option<i64>,
        next_charge_at: Option<i64>,
        total_count: i64,
        paid_count: i64,
    ) -> Self {
        Self {
            status,
            current_period_start,
            current_period_end,
            next_charge_at,
            total_count,
            paid_count,
            remaining_count: total_count - paid_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Option<Uuid>,
    pub gateway_subscription_id: String,
    pub gateway_plan_id: String,
    pub gateway_customer_id: String,
    pub amount: i64,
    pub currency: String,
    pub subscriber_name: String,
    pub subscriber_email: String,
    pub subscriber_phone: Option<String>,
    pub state: SubscriptionState,
    pub short_url: Option<String>,
}

/// A charge the gateway reported against a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPayment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub gateway_payment_id: String,
    pub amount: i64,
    pub status: String,
    pub payment_date: DateTime<Utc>,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
}

/// Payment row joined with the owning subscription's gateway id, for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPaymentRecord {
    #[serde(flatten)]
    pub payment: SubscriptionPayment,
    pub gateway_subscription_id: String,
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionPayment {
    pub subscription_id: Uuid,
    pub gateway_payment_id: String,
    pub amount: i64,
    pub status: String,
    pub period_start: Option<i64>,
    pub period_end: Option<i64>,
    /// Gateway capture time; the insert time is used when absent.
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Cancel,
    Pause,
    Resume,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cancel" => Some(LifecycleAction::Cancel),
            "pause" => Some(LifecycleAction::Pause),
            "resume" => Some(LifecycleAction::Resume),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_rejection() {
        assert_eq!(SubscriptionStatus::from_str("ACTIVE"), Some(SubscriptionStatus::Active));
        assert_eq!(SubscriptionStatus::from_str("halted"), Some(SubscriptionStatus::Halted));
        assert_eq!(SubscriptionStatus::Cancelled.as_str(), "cancelled");
        assert_eq!(SubscriptionStatus::from_str("expired"), None);
        assert_eq!(SubscriptionStatus::from_str("pending"), None);
    }

    #[test]
    fn test_active_like_policy() {
        assert!(SubscriptionStatus::Active.is_active_like());
        assert!(SubscriptionStatus::Authenticated.is_active_like());
        assert!(SubscriptionStatus::Activated.is_active_like());
        assert!(!SubscriptionStatus::Paused.is_active_like());
        assert!(!SubscriptionStatus::Created.is_active_like());
    }

    #[test]
    fn test_stale_statuses() {
        assert!(SubscriptionStatus::Created.is_stale());
        assert!(SubscriptionStatus::Halted.is_stale());
        assert!(!SubscriptionStatus::Active.is_stale());
        assert!(!SubscriptionStatus::Cancelled.is_stale());
    }

    #[test]
    fn test_state_derives_remaining_count() {
        let state = SubscriptionState::new(SubscriptionStatus::Active, Some(1), Some(2), Some(2), 120, 7);
        assert_eq!(state.remaining_count, 113);
    }

    #[test]
    fn test_lifecycle_action_parse() {
        assert_eq!(LifecycleAction::from_str("Pause"), Some(LifecycleAction::Pause));
        assert_eq!(LifecycleAction::from_str("delete"), None);
    }
}
