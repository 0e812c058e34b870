use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Patron API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Donations and recurring subscriptions",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "orders": "/api/orders",
            "subscriptions": "/api/subscriptions",
            "user": "/api/user",
            "webhooks": "/api/webhooks/gateway"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
