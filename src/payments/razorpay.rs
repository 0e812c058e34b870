use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    is_timing_error, CreateCustomer, CreateOrder, CreatePlan, CreateSubscription, GatewayCustomer,
    GatewayError, GatewayOrder, GatewayPlan, GatewayResult, GatewaySubscription, PaymentGateway,
};
use crate::config::GatewayConfig;

/// HTTP client for the Razorpay REST API.
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl RazorpayClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    /// Builds a client from configuration; `None` when keys are missing.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Option<Self>> {
        match (&config.key_id, &config.key_secret) {
            (Some(key_id), Some(key_secret)) => Self::new(
                config.base_url.clone(),
                key_id.clone(),
                key_secret.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )
            .map(Some),
            _ => Ok(None),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Gateway request {} {}", method, path);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.key_id, Some(&self.key_secret));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(format!("{}: {}", path, e)))
        } else {
            let err = classify_error(status, &text);
            tracing::warn!("Gateway request {} failed: {}", path, err);
            Err(err)
        }
    }
}

/// Maps a non-success gateway response onto a [`GatewayError`].
pub(crate) fn classify_error(status: StatusCode, body: &str) -> GatewayError {
    let (code, description) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.code.unwrap_or_else(|| "UNKNOWN".to_string()),
            envelope.error.description.unwrap_or_default(),
        ),
        Err(_) => ("UNKNOWN".to_string(), body.to_string()),
    };

    if status.is_server_error() {
        return GatewayError::Unavailable(format!("{} {}", status.as_u16(), description));
    }
    if is_timing_error(&description) {
        return GatewayError::Timing(description);
    }
    if status == StatusCode::NOT_FOUND || description.to_lowercase().contains("does not exist") {
        return GatewayError::NotFound(description);
    }
    GatewayError::Rejected { code, description }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: CreateOrder) -> GatewayResult<GatewayOrder> {
        self.send(Method::POST, "/orders", Some(json!(request))).await
    }

    async fn fetch_order(&self, order_id: &str) -> GatewayResult<GatewayOrder> {
        self.send(Method::GET, &format!("/orders/{}", order_id), None).await
    }

    async fn create_plan(&self, request: CreatePlan) -> GatewayResult<GatewayPlan> {
        let body = json!({
            "period": request.period.as_str(),
            "interval": request.interval,
            "item": {
                "name": request.item_name,
                "amount": request.amount,
                "currency": request.currency,
                "description": request.description,
            },
            "notes": request.notes,
        });
        self.send(Method::POST, "/plans", Some(body)).await
    }

    async fn create_customer(&self, request: CreateCustomer) -> GatewayResult<GatewayCustomer> {
        let body = json!({
            "name": request.name,
            "email": request.email,
            "contact": request.phone.unwrap_or_default(),
            "notes": request.notes,
        });
        self.send(Method::POST, "/customers", Some(body)).await
    }

    async fn fetch_customer(&self, customer_id: &str) -> GatewayResult<GatewayCustomer> {
        self.send(Method::GET, &format!("/customers/{}", customer_id), None).await
    }

    async fn list_customers(&self, count: u32) -> GatewayResult<Vec<GatewayCustomer>> {
        let page: Collection<GatewayCustomer> = self
            .send(Method::GET, &format!("/customers?count={}", count), None)
            .await?;
        Ok(page.items)
    }

    async fn create_subscription(&self, request: CreateSubscription) -> GatewayResult<GatewaySubscription> {
        let mut body = json!({
            "plan_id": request.plan_id,
            "customer_id": request.customer_id,
            "total_count": request.total_count,
            "quantity": request.quantity,
            "expire_by": request.expire_by,
            "notes": request.notes,
        });
        if let Some(start_at) = request.start_at {
            body["start_at"] = json!(start_at);
        }
        self.send(Method::POST, "/subscriptions", Some(body)).await
    }

    async fn fetch_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        self.send(Method::GET, &format!("/subscriptions/{}", subscription_id), None).await
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        cancel_at_cycle_end: bool,
    ) -> GatewayResult<GatewaySubscription> {
        let body = json!({ "cancel_at_cycle_end": if cancel_at_cycle_end { 1 } else { 0 } });
        self.send(Method::POST, &format!("/subscriptions/{}/cancel", subscription_id), Some(body))
            .await
    }

    async fn pause_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        let body = json!({ "pause_at": "now" });
        self.send(Method::POST, &format!("/subscriptions/{}/pause", subscription_id), Some(body))
            .await
    }

    async fn resume_subscription(&self, subscription_id: &str) -> GatewayResult<GatewaySubscription> {
        let body = json!({ "resume_at": "now" });
        self.send(Method::POST, &format!("/subscriptions/{}/resume", subscription_id), Some(body))
            .await
    }

    async fn list_subscriptions(&self, count: u32) -> GatewayResult<Vec<GatewaySubscription>> {
        let page: Collection<GatewaySubscription> = self
            .send(Method::GET, &format!("/subscriptions?count={}", count), None)
            .await?;
        Ok(page.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timing_error() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"start_at cannot be lesser than the current time"}}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, body).is_timing());
    }

    #[test]
    fn test_classify_not_found() {
        let body = r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"The id provided does not exist"}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            GatewayError::NotFound(_)
        ));
    }

    #[test]
    fn test_classify_server_error_and_garbage() {
        assert!(matches!(
            classify_error(StatusCode::BAD_GATEWAY, "<html>upstream</html>"),
            GatewayError::Unavailable(_)
        ));
        match classify_error(StatusCode::BAD_REQUEST, "not json") {
            GatewayError::Rejected { code, description } => {
                assert_eq!(code, "UNKNOWN");
                assert_eq!(description, "not json");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_config_requires_keys() {
        let config = GatewayConfig::default();
        assert!(RazorpayClient::from_config(&config).unwrap().is_none());

        let config = GatewayConfig {
            key_id: Some("rzp_test_key".into()),
            key_secret: Some("secret".into()),
            ..GatewayConfig::default()
        };
        let client = RazorpayClient::from_config(&config).unwrap().unwrap();
        assert_eq!(client.base_url, "https://api.razorpay.com/v1");
    }
}
