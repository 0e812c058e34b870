pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .route("/auth/session", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))

        .nest("/api", api_routes(app_state.clone()))

        .with_state(app_state)

        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(checkout_routes(state.clone()))
        .merge(account_routes(state))
        // Authenticated by signature, not session
        .route("/webhooks/gateway", post(handlers::webhooks::gateway_webhook))
        .route("/plans", post(handlers::donations::create_plan))
}

/// One-time donations work anonymously but attach the user when signed in.
fn checkout_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", post(handlers::donations::create_order))
        .route("/payments/verify", post(handlers::donations::verify_payment))
        .route("/user/session", get(handlers::user::session))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::optional_auth,
        ))
}

fn account_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/subscriptions", post(handlers::subscriptions::create))
        .route(
            "/subscriptions/:gateway_id",
            get(handlers::subscriptions::get).put(handlers::subscriptions::update),
        )
        .route("/user/donations", get(handlers::user::donations))
        .route("/user/subscriptions", get(handlers::user::subscriptions))
        .route("/customer", get(handlers::customer::get))
        .route("/customer/sync", post(handlers::customer::sync))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}
