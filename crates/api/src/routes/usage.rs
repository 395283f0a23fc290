//! Usage check and recording endpoints

use axum::{extract::State, http::StatusCode, Json};
use prepstack_billing::Decision;
use prepstack_shared::UsageType;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Empty email means an anonymous caller; decided on the free tier
    /// without touching storage
    #[serde(default)]
    pub email: String,
    pub usage_type: UsageType,
}

/// POST /api/usage/check
///
/// The decision body is identical whether allowed or denied; only the
/// status code differs (200 vs 403), so clients can branch on either.
pub async fn check_usage(
    State(state): State<AppState>,
    Json(req): Json<UsageRequest>,
) -> ApiResult<(StatusCode, Json<Decision>)> {
    let decision = state.gate.check_limit(&req.email, req.usage_type).await?;
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    Ok((status, Json(decision)))
}

/// POST /api/usage/record
pub async fn record_usage(
    State(state): State<AppState>,
    Json(req): Json<UsageRequest>,
) -> ApiResult<Json<Value>> {
    let used = state.gate.record_usage(&req.email, req.usage_type).await?;
    Ok(Json(json!({ "used": used })))
}
