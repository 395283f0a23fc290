//! Plan, checkout, subscription, and webhook endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use prepstack_billing::{
    CheckoutResponse, CheckoutStatus, PlanDefinition, SubscriptionOverview,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::ApiResult, state::AppState};

/// GET /api/plans
pub async fn list_plans(State(state): State<AppState>) -> Json<Value> {
    let plans: Vec<&PlanDefinition> = state.catalog.plans();
    Json(json!({ "plans": plans }))
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub email: String,
    pub plan: String,
    pub billing_cycle: String,
    /// Overrides the configured frontend origin for redirect URLs
    #[serde(default)]
    pub origin_url: Option<String>,
}

/// POST /api/subscriptions/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let origin = req
        .origin_url
        .as_deref()
        .unwrap_or(&state.config.frontend_url);
    let response = state
        .checkout
        .create_checkout(&req.email, &req.plan, &req.billing_cycle, origin)
        .await?;
    Ok(Json(response))
}

/// GET /api/subscriptions/status/:session_id
///
/// Poll-side reconciliation: reads the provider's view and folds it into
/// local state before answering.
pub async fn checkout_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CheckoutStatus>> {
    let status = state.checkout.get_checkout_status(&session_id).await?;
    Ok(Json(status))
}

/// GET /api/subscriptions/:email
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<SubscriptionOverview>> {
    let overview = state.gate.subscription_overview(&email).await?;
    Ok(Json(overview))
}

/// POST /api/webhooks/stripe
///
/// Always acknowledged, even on a bad signature or a processing failure:
/// an unverifiable or broken delivery never mutates state, and an error
/// status would only buy a retry storm. The poll path reconciles the same
/// state.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let event = match state.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "Discarding webhook that failed verification");
            return acknowledge();
        }
    };

    if let Err(err) = state.webhooks.handle_event(&event).await {
        tracing::error!(
            event_id = %event.id,
            event_type = %event.event_type,
            error = %err,
            "Webhook processing failed"
        );
    }
    acknowledge()
}

/// The only response the webhook endpoint ever sends
fn acknowledge() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"received": true})))
}
