//! Provider webhook verification and dispatch.
//!
//! Signatures follow Stripe's scheme: the header carries `t=<unix>,v1=<hex>`
//! where `v1` is HMAC-SHA256 over `"{t}.{body}"` with the endpoint secret.
//! Verification is constant-time via `Mac::verify_slice` and rejects stale
//! timestamps. Dispatch is idempotent end to end because every state change
//! funnels through the checkout service's compare-and-set transitions.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use prepstack_shared::{ApplicationStatus, PaymentStatus};
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::checkout::CheckoutService;
use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the provider's signing timestamp and ours
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: WebhookObject,
}

/// The slice of a checkout-session object we act on. Everything else in the
/// provider payload is ignored; local rows are the source of truth for
/// amounts and plans.
#[derive(Debug, Deserialize)]
pub struct WebhookObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Verify a `Stripe-Signature` header against the raw request body.
/// Pure so the scheme is testable without a clock or a secret store.
pub fn verify_signature(
    secret: &str,
    body: &str,
    signature_header: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(sig) = hex::decode(value) {
                    candidates.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::WebhookSignatureInvalid);
    }
    if candidates.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let signed_payload = format!("{timestamp}.{body}");
    for candidate in &candidates {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| BillingError::Config("invalid webhook secret".to_string()))?;
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }
    Err(BillingError::WebhookSignatureInvalid)
}

#[derive(Clone)]
pub struct WebhookService {
    checkout: CheckoutService,
    webhook_secret: String,
}

impl WebhookService {
    pub fn new(checkout: CheckoutService, webhook_secret: String) -> Self {
        Self {
            checkout,
            webhook_secret,
        }
    }

    /// Verify the signature and parse the event. Callers only get an event
    /// back once authenticity is established.
    pub fn verify_event(&self, body: &str, signature_header: &str) -> BillingResult<WebhookEvent> {
        verify_signature(
            &self.webhook_secret,
            body,
            signature_header,
            OffsetDateTime::now_utc().unix_timestamp(),
        )?;
        serde_json::from_str(body)
            .map_err(|e| BillingError::Provider(format!("malformed webhook payload: {e}")))
    }

    /// Apply a verified event to local state. Unknown event types and unknown
    /// sessions are logged and skipped; metadata that contradicts the stored
    /// session aborts without mutating anything.
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<()> {
        let object = &event.data.object;
        match event.event_type.as_str() {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                if object.payment_status.as_deref() != Some("paid") {
                    tracing::debug!(
                        event_id = %event.id,
                        session_id = %object.id,
                        payment_status = ?object.payment_status,
                        "Checkout completed but not yet paid, waiting for payment event"
                    );
                    return Ok(());
                }
                self.cross_check_metadata(object).await?;
                let applied = self.checkout.apply_paid_transition(&object.id).await?;
                tracing::info!(
                    event_id = %event.id,
                    session_id = %object.id,
                    applied,
                    "Processed paid checkout webhook"
                );
            }
            "checkout.session.expired" => {
                let changed = self
                    .checkout
                    .mark_payment_outcome(
                        &object.id,
                        PaymentStatus::Expired,
                        ApplicationStatus::Cancelled,
                    )
                    .await?;
                tracing::info!(
                    event_id = %event.id,
                    session_id = %object.id,
                    changed,
                    "Checkout session expired"
                );
            }
            "checkout.session.async_payment_failed" => {
                let changed = self
                    .checkout
                    .mark_payment_outcome(
                        &object.id,
                        PaymentStatus::Failed,
                        ApplicationStatus::Failed,
                    )
                    .await?;
                tracing::warn!(
                    event_id = %event.id,
                    session_id = %object.id,
                    changed,
                    "Async payment failed"
                );
            }
            other => {
                tracing::debug!(event_id = %event.id, event_type = %other, "Ignoring event type");
            }
        }
        Ok(())
    }

    /// A webhook for a session we never created is skipped, not an error
    /// (another environment sharing the endpoint can produce those). A session
    /// we do know must agree with the event's metadata.
    async fn cross_check_metadata(&self, object: &WebhookObject) -> BillingResult<()> {
        let Some(local) = self.checkout.find_session(&object.id).await? else {
            tracing::warn!(session_id = %object.id, "Webhook for unknown checkout session");
            return Ok(());
        };

        metadata_consistent(&object.metadata, &local.email, local.plan).map_err(|field| {
            BillingError::MetadataMismatch(format!("{field} mismatch for session {}", object.id))
        })
    }
}

/// Compare event metadata against the stored session. Absent keys pass;
/// a present key that disagrees names the offending field.
fn metadata_consistent(
    metadata: &HashMap<String, String>,
    email: &str,
    plan: prepstack_shared::PlanId,
) -> Result<(), &'static str> {
    if let Some(claimed) = metadata.get("email") {
        if !claimed.eq_ignore_ascii_case(email) {
            return Err("email");
        }
    }
    if let Some(claimed) = metadata.get("plan") {
        if *claimed != plan.to_string() {
            return Err("plan");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, body: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{body}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn test_valid_signature_passes() {
        let body = r#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(SECRET, body, 1_700_000_000);
        assert!(verify_signature(SECRET, body, &header, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_signature_within_tolerance_passes() {
        let body = "{}";
        let header = sign(SECRET, body, 1_700_000_000);
        assert!(verify_signature(SECRET, body, &header, 1_700_000_000 + 299).is_ok());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = "{}";
        let header = sign(SECRET, body, 1_700_000_000);
        assert!(matches!(
            verify_signature(SECRET, body, &header, 1_700_000_000 + 301),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(SECRET, r#"{"plan":"beginner"}"#, 1_700_000_000);
        assert!(matches!(
            verify_signature(SECRET, r#"{"plan":"executive"}"#, &header, 1_700_000_000),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = "{}";
        let header = sign("whsec_other", body, 1_700_000_000);
        assert!(verify_signature(SECRET, body, &header, 1_700_000_000).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature(SECRET, "{}", "", 0).is_err());
        assert!(verify_signature(SECRET, "{}", "t=abc,v1=zz", 0).is_err());
        assert!(verify_signature(SECRET, "{}", "v1=deadbeef", 0).is_err());
    }

    #[test]
    fn test_second_v1_candidate_accepted() {
        // Secret rotation sends multiple v1 entries; any valid one passes
        let body = "{}";
        let good = sign(SECRET, body, 1_700_000_000);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1={},v1={}", "00".repeat(32), good_sig);
        assert!(verify_signature(SECRET, body, &header, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_metadata_cross_check() {
        use prepstack_shared::PlanId;

        let mut metadata = HashMap::new();
        assert!(metadata_consistent(&metadata, "alice@example.com", PlanId::Beginner).is_ok());

        metadata.insert("email".to_string(), "Alice@Example.com".to_string());
        metadata.insert("plan".to_string(), "beginner".to_string());
        assert!(metadata_consistent(&metadata, "alice@example.com", PlanId::Beginner).is_ok());

        metadata.insert("plan".to_string(), "executive".to_string());
        assert_eq!(
            metadata_consistent(&metadata, "alice@example.com", PlanId::Beginner),
            Err("plan")
        );

        metadata.insert("plan".to_string(), "beginner".to_string());
        metadata.insert("email".to_string(), "mallory@example.com".to_string());
        assert_eq!(
            metadata_consistent(&metadata, "alice@example.com", PlanId::Beginner),
            Err("email")
        );
    }

    #[test]
    fn test_event_parses_minimal_payload() {
        let body = r#"{
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_abc",
                    "payment_status": "paid",
                    "metadata": {"email": "alice@example.com", "plan": "beginner"}
                }
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object.id, "cs_test_abc");
        assert_eq!(event.data.object.payment_status.as_deref(), Some("paid"));
        assert_eq!(
            event.data.object.metadata.get("plan").map(String::as_str),
            Some("beginner")
        );
    }

    #[test]
    fn test_event_parses_without_metadata() {
        let body = r#"{"id":"evt_1","type":"checkout.session.expired","data":{"object":{"id":"cs_1"}}}"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert!(event.data.object.metadata.is_empty());
        assert!(event.data.object.payment_status.is_none());
    }
}
