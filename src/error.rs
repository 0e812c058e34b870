use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::payments::GatewayError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No session, or the session no longer resolves to a user.
    #[error("Unauthorized")]
    Unauthorized,

    /// The session is valid but the caller does not own the resource.
    #[error("Not authorized for this resource: {0}")]
    NotOwner(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Signature verification failed")]
    Verification,

    /// The gateway kept rejecting the requested start time.
    #[error("Gateway timing error: {0}")]
    Timing(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

const GATEWAY_RETRY_MESSAGE: &str = "Payment gateway request failed. Please try again.";

/// Maps gateway error text onto an actionable hint for the caller.
pub fn gateway_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("customer") && (lower.contains("already exists") || lower.contains("duplicate")) {
        Some("A customer record already exists for this email. Run a customer sync (POST /api/customer/sync) to recover it.")
    } else if lower.contains("subscription") && (lower.contains("already") || lower.contains("duplicate")) {
        Some("A previous subscription attempt is still pending. Run a customer sync (POST /api/customer/sync) to clean it up.")
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, hint) = match self {
            AppError::Database(ref msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string(), None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required".to_string(), None),
            AppError::NotOwner(ref msg) => {
                tracing::warn!("Ownership check failed: {}", msg);
                (StatusCode::NOT_FOUND, "Subscription not found or not authorized".to_string(), None)
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Verification => (StatusCode::BAD_REQUEST, "Payment verification failed".to_string(), None),
            AppError::Timing(ref msg) => {
                tracing::error!("Gateway timing error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, GATEWAY_RETRY_MESSAGE.to_string(), None)
            }
            AppError::Gateway(ref msg) => {
                tracing::error!("Gateway error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, GATEWAY_RETRY_MESSAGE.to_string(), gateway_hint(msg))
            }
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
            }
        };

        let body = match hint {
            Some(hint) => Json(json!({ "error": error_message, "hint": hint })),
            None => Json(json!({ "error": error_message })),
        };

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timing(msg) => AppError::Timing(msg),
            GatewayError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Gateway(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_hint_patterns() {
        assert!(gateway_hint("Customer already exists for the merchant").is_some());
        assert!(gateway_hint("duplicate customer detected").is_some());
        assert!(gateway_hint("Subscription already exists for this plan").is_some());
        assert!(gateway_hint("The amount must be at least INR 1.00").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotOwner("sub_1".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Validation("bad".into()).into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Verification.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::ServiceUnavailable("gateway".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Gateway("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_gateway_error_conversion() {
        assert!(matches!(
            AppError::from(GatewayError::Timing("start_at is past".into())),
            AppError::Timing(_)
        ));
        assert!(matches!(
            AppError::from(GatewayError::NotFound("sub_x".into())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(GatewayError::Unavailable("connection reset".into())),
            AppError::Gateway(_)
        ));
    }
}
