//! Checkout sessions and the paid-transition that activates a subscription.
//!
//! Every checkout attempt gets a local `payment_sessions` row keyed by the
//! provider-issued session id, written before the checkout URL is handed to
//! the caller. The paid transition is a single transaction guarded by a
//! compare-and-set on `application_status`, so polling and webhooks can both
//! observe the same payment without double-activating.

use std::collections::HashMap;

use prepstack_shared::{
    ApplicationStatus, BillingCycle, PaymentSession, PaymentStatus, PlanId, SubscriptionRecord,
    SubscriptionStatus,
};
use serde::Serialize;
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus, CheckoutSessionStatus,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency,
};
use time::OffsetDateTime;

use crate::catalog::PlanCatalog;
use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutStatus {
    pub checkout_session_id: String,
    pub status: ApplicationStatus,
    pub payment_status: PaymentStatus,
    pub email: String,
    pub plan: PlanId,
    pub billing_cycle: BillingCycle,
    pub amount_cents: i64,
    pub currency: String,
}

impl CheckoutStatus {
    fn from_session(session: PaymentSession) -> Self {
        Self {
            checkout_session_id: session.checkout_session_id,
            status: session.application_status,
            payment_status: session.payment_status,
            email: session.email,
            plan: session.plan,
            billing_cycle: session.billing_cycle,
            amount_cents: session.amount_cents,
            currency: session.currency,
        }
    }
}

/// Validate a purchase request. Plan ids are parsed strictly here (unlike
/// stored-record resolution, which is lossy): a typo in a purchase must fail
/// loudly, and the free plan has nothing to buy.
pub fn validate_purchase(plan: &str, billing_cycle: &str) -> BillingResult<(PlanId, BillingCycle)> {
    let plan: PlanId = plan
        .parse()
        .map_err(|_| BillingError::InvalidPlan(plan.to_string()))?;
    if plan.is_free() {
        return Err(BillingError::InvalidPlan(
            "free plan does not require checkout".to_string(),
        ));
    }
    let cycle: BillingCycle = billing_cycle
        .parse()
        .map_err(|_| BillingError::InvalidBillingCycle(billing_cycle.to_string()))?;
    Ok((plan, cycle))
}

/// Period bounds for a fresh activation: starts now, ends one cycle later.
pub fn period_bounds(cycle: BillingCycle, now: OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    (now, now + cycle.period_length())
}

/// Map the provider's view of a session onto our payment status. Unpaid only
/// becomes Expired once the provider has closed the session.
fn map_provider_status(
    payment_status: CheckoutSessionPaymentStatus,
    session_status: Option<CheckoutSessionStatus>,
) -> PaymentStatus {
    match payment_status {
        CheckoutSessionPaymentStatus::Paid | CheckoutSessionPaymentStatus::NoPaymentRequired => {
            PaymentStatus::Paid
        }
        CheckoutSessionPaymentStatus::Unpaid => match session_status {
            Some(CheckoutSessionStatus::Expired) => PaymentStatus::Expired,
            _ => PaymentStatus::Pending,
        },
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    catalog: PlanCatalog,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, catalog: PlanCatalog, pool: PgPool) -> Self {
        Self {
            stripe,
            catalog,
            pool,
        }
    }

    /// Create a provider checkout session for a paid plan and persist the
    /// tracking row. The row exists before the caller ever sees the URL, so
    /// a later webhook can never arrive for an unknown session.
    pub async fn create_checkout(
        &self,
        email: &str,
        plan: &str,
        billing_cycle: &str,
        origin_url: &str,
    ) -> BillingResult<CheckoutResponse> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(BillingError::Validation(
                "a valid email is required for checkout".to_string(),
            ));
        }
        let (plan, cycle) = validate_purchase(plan, billing_cycle)?;

        let definition = self.catalog.resolve(plan);
        let amount_cents = definition.price_cents(cycle);
        let product_name = format!("PrepStack {} ({})", definition.name, cycle);
        let success_url = format!(
            "{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}",
            origin_url.trim_end_matches('/')
        );
        let cancel_url = format!("{}/pricing", origin_url.trim_end_matches('/'));

        let metadata = HashMap::from([
            ("email".to_string(), email.to_string()),
            ("plan".to_string(), plan.to_string()),
            ("billing_cycle".to_string(), cycle.to_string()),
        ]);

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer_email = Some(email);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.metadata = Some(metadata.clone());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(amount_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: product_name,
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;
        let checkout_url = session
            .url
            .clone()
            .ok_or_else(|| BillingError::Provider("checkout session has no URL".to_string()))?;
        let session_id = session.id.to_string();

        sqlx::query(
            "INSERT INTO payment_sessions
                 (checkout_session_id, email, plan, billing_cycle, amount_cents,
                  currency, payment_status, application_status, metadata)
             VALUES ($1, $2, $3, $4, $5, 'usd', $6, $7, $8)",
        )
        .bind(&session_id)
        .bind(email)
        .bind(plan)
        .bind(cycle)
        .bind(amount_cents)
        .bind(PaymentStatus::Pending)
        .bind(ApplicationStatus::Initiated)
        .bind(serde_json::json!(metadata))
        .execute(&self.pool)
        .await?;

        tracing::info!(
            email = %email,
            plan = %plan,
            billing_cycle = %cycle,
            amount_cents,
            session_id = %session_id,
            "Created checkout session"
        );

        Ok(CheckoutResponse {
            checkout_session_id: session_id,
            checkout_url,
        })
    }

    pub async fn find_session(&self, session_id: &str) -> BillingResult<Option<PaymentSession>> {
        let session: Option<PaymentSession> = sqlx::query_as(
            "SELECT checkout_session_id, email, plan, billing_cycle, amount_cents,
                    currency, payment_status, application_status, metadata,
                    created_at, updated_at
             FROM payment_sessions WHERE checkout_session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Poll-side reconciliation: fetch the provider's view of the session and
    /// fold it into local state. Safe to call any number of times; a session
    /// already completed is returned as-is without touching the provider.
    pub async fn get_checkout_status(&self, session_id: &str) -> BillingResult<CheckoutStatus> {
        let local = self
            .find_session(session_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("checkout session {session_id}")))?;

        if local.application_status == ApplicationStatus::Completed {
            return Ok(CheckoutStatus::from_session(local));
        }

        let stripe_id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|_| BillingError::NotFound(format!("checkout session {session_id}")))?;
        let remote = CheckoutSession::retrieve(self.stripe.inner(), &stripe_id, &[]).await?;
        let payment_status = map_provider_status(remote.payment_status, remote.status);

        match payment_status {
            PaymentStatus::Paid => {
                self.apply_paid_transition(session_id).await?;
            }
            PaymentStatus::Expired => {
                self.mark_payment_outcome(
                    session_id,
                    PaymentStatus::Expired,
                    ApplicationStatus::Cancelled,
                )
                .await?;
            }
            PaymentStatus::Pending | PaymentStatus::Failed => {
                sqlx::query(
                    "UPDATE payment_sessions SET payment_status = $2, updated_at = NOW()
                     WHERE checkout_session_id = $1 AND application_status <> 'completed'",
                )
                .bind(session_id)
                .bind(payment_status)
                .execute(&self.pool)
                .await?;
            }
        }

        let refreshed = self
            .find_session(session_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("checkout session {session_id}")))?;
        Ok(CheckoutStatus::from_session(refreshed))
    }

    /// Apply the paid transition exactly once. The compare-and-set on
    /// `application_status` and the subscription upsert commit together;
    /// whichever observer (poll or webhook) loses the race sees zero rows
    /// updated and leaves the subscription alone. Returns whether this call
    /// performed the transition.
    pub async fn apply_paid_transition(&self, session_id: &str) -> BillingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE payment_sessions
             SET payment_status = 'paid', application_status = 'completed', updated_at = NOW()
             WHERE checkout_session_id = $1 AND application_status <> 'completed'",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!(session_id = %session_id, "Paid transition already applied");
            return Ok(false);
        }

        let (email, plan, cycle): (String, PlanId, BillingCycle) = sqlx::query_as(
            "SELECT email, plan, billing_cycle FROM payment_sessions
             WHERE checkout_session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        let (period_start, period_end) = period_bounds(cycle, OffsetDateTime::now_utc());
        let record = SubscriptionRecord {
            email: email.clone(),
            plan,
            billing_cycle: cycle,
            status: SubscriptionStatus::Active,
            current_period_start: Some(period_start),
            current_period_end: Some(period_end),
            created_at: period_start,
            updated_at: period_start,
            usage_counters: Default::default(),
        };

        sqlx::query(
            "INSERT INTO subscriptions
                 (email, plan, billing_cycle, status,
                  current_period_start, current_period_end, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
             ON CONFLICT (email) DO UPDATE SET
                 plan = EXCLUDED.plan,
                 billing_cycle = EXCLUDED.billing_cycle,
                 status = EXCLUDED.status,
                 current_period_start = EXCLUDED.current_period_start,
                 current_period_end = EXCLUDED.current_period_end,
                 updated_at = NOW()",
        )
        .bind(&record.email)
        .bind(record.plan)
        .bind(record.billing_cycle)
        .bind(record.status)
        .bind(record.current_period_start)
        .bind(record.current_period_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            email = %email,
            plan = %plan,
            billing_cycle = %cycle,
            session_id = %session_id,
            "Payment confirmed, subscription activated"
        );
        Ok(true)
    }

    /// Record a non-paid terminal outcome (expired or failed). A session that
    /// already completed keeps its state: late failure signals never claw back
    /// an activation.
    pub async fn mark_payment_outcome(
        &self,
        session_id: &str,
        payment_status: PaymentStatus,
        application_status: ApplicationStatus,
    ) -> BillingResult<bool> {
        let updated = sqlx::query(
            "UPDATE payment_sessions
             SET payment_status = $2, application_status = $3, updated_at = NOW()
             WHERE checkout_session_id = $1 AND application_status <> 'completed'",
        )
        .bind(session_id)
        .bind(payment_status)
        .bind(application_status)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected() > 0)
    }
}
