//! API routes

pub mod billing;
pub mod health;
pub mod usage;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health routes at root level for infrastructure monitoring
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_routes = Router::new()
        .route("/health", get(health::health))
        .route("/plans", get(billing::list_plans))
        .route("/subscriptions/checkout", post(billing::create_checkout))
        .route(
            "/subscriptions/status/:session_id",
            get(billing::checkout_status),
        )
        .route("/subscriptions/:email", get(billing::get_subscription))
        .route("/webhooks/stripe", post(billing::stripe_webhook))
        .route("/usage/check", post(usage::check_usage))
        .route("/usage/record", post(usage::record_usage));

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
