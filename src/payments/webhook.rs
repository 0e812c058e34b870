use serde::Deserialize;

use super::{GatewayPayment, GatewaySubscription};

/// Envelope of a gateway webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub subscription: Option<Entity<GatewaySubscription>>,
    #[serde(default)]
    pub payment: Option<Entity<GatewayPayment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookKind {
    /// A billing cycle was charged; carries a payment entity.
    SubscriptionCharged,
    /// Any other `subscription.*` state change.
    SubscriptionUpdated,
    Ignored,
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookKind {
        match self.event.as_str() {
            "subscription.charged" => WebhookKind::SubscriptionCharged,
            e if e.starts_with("subscription.") => WebhookKind::SubscriptionUpdated,
            _ => WebhookKind::Ignored,
        }
    }

    pub fn subscription(&self) -> Option<&GatewaySubscription> {
        self.payload.subscription.as_ref().map(|s| &s.entity)
    }

    pub fn payment(&self) -> Option<&GatewayPayment> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_charged_event() {
        let body = r#"{
            "entity": "event",
            "event": "subscription.charged",
            "payload": {
                "subscription": {"entity": {
                    "id": "sub_1", "plan_id": "plan_1", "customer_id": "cust_1",
                    "status": "active", "current_start": 100, "current_end": 200,
                    "charge_at": 200, "total_count": 120, "paid_count": 1, "remaining_count": 119
                }},
                "payment": {"entity": {
                    "id": "pay_1", "amount": 50000, "status": "captured", "created_at": 150
                }}
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.kind(), WebhookKind::SubscriptionCharged);
        assert_eq!(event.subscription().unwrap().paid_count, 1);
        assert_eq!(event.payment().unwrap().amount, 50000);
    }

    #[test]
    fn test_event_kinds() {
        let event: WebhookEvent = serde_json::from_str(r#"{"event":"subscription.halted"}"#).unwrap();
        assert_eq!(event.kind(), WebhookKind::SubscriptionUpdated);
        assert!(event.subscription().is_none());

        let event: WebhookEvent = serde_json::from_str(r#"{"event":"order.paid"}"#).unwrap();
        assert_eq!(event.kind(), WebhookKind::Ignored);
    }
}
