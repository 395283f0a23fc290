//! Database-backed tests for counter atomicity and payment reconciliation.
//!
//! Run with a scratch Postgres:
//!   DATABASE_URL=postgres://... cargo test -p prepstack-billing -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used)]

use prepstack_billing::{
    CheckoutService, EntitlementGate, PlanCatalog, StripeClient, StripeConfig, SubscriptionStore,
};
use prepstack_shared::{
    ApplicationStatus, BillingCycle, PaymentStatus, PlanId, SubscriptionRecord, SubscriptionStatus,
    UsageType,
};
use sqlx::PgPool;
use time::OffsetDateTime;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = prepstack_shared::create_pool(&url).await.expect("pool");
    prepstack_shared::run_migrations(&pool).await.expect("migrations");
    pool
}

fn unique_email(tag: &str) -> String {
    format!("{tag}-{}@test.prepstack.dev", uuid::Uuid::new_v4())
}

fn checkout_service(pool: PgPool) -> CheckoutService {
    let stripe = StripeClient::new(StripeConfig {
        secret_key: "sk_test_offline".to_string(),
        webhook_secret: "whsec_test_offline".to_string(),
    });
    CheckoutService::new(stripe, PlanCatalog::builtin(), pool)
}

async fn insert_pending_session(pool: &PgPool, session_id: &str, email: &str) {
    sqlx::query(
        "INSERT INTO payment_sessions
             (checkout_session_id, email, plan, billing_cycle, amount_cents, metadata)
         VALUES ($1, $2, 'beginner', 'monthly', 2900, '{}')",
    )
    .bind(session_id)
    .bind(email)
    .execute(pool)
    .await
    .expect("insert session");
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_increments_lose_nothing() {
    let pool = test_pool().await;
    let gate = EntitlementGate::new(PlanCatalog::builtin(), pool.clone());
    let email = unique_email("concurrent");

    let mut handles = Vec::new();
    for _ in 0..100 {
        let gate = gate.clone();
        let email = email.clone();
        handles.push(tokio::spawn(async move {
            gate.record_usage(&email, UsageType::CodingSession).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("increment");
    }

    let (used,): (i64,) = sqlx::query_as(
        "SELECT used FROM usage_counters WHERE email = $1 AND usage_type = 'coding_session'",
    )
    .bind(&email)
    .fetch_one(&pool)
    .await
    .expect("counter row");
    assert_eq!(used, 100);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_upsert_then_find_round_trip() {
    let pool = test_pool().await;
    let store = SubscriptionStore::new(pool);
    let email = unique_email("roundtrip");

    let now = OffsetDateTime::now_utc();
    let mut record = SubscriptionRecord::free_default(&email);
    record.plan = PlanId::Advanced;
    record.billing_cycle = BillingCycle::Yearly;
    record.status = SubscriptionStatus::Active;
    record.current_period_start = Some(now);
    record.current_period_end = Some(now + BillingCycle::Yearly.period_length());
    store.upsert(&record).await.expect("upsert");

    let found = store.find(&email).await.expect("find").expect("record");
    assert_eq!(found.plan, PlanId::Advanced);
    assert_eq!(found.billing_cycle, BillingCycle::Yearly);
    assert_eq!(found.status, SubscriptionStatus::Active);
    assert!(found.current_period_end.is_some());

    // Second upsert replaces wholesale
    record.plan = PlanId::Beginner;
    record.status = SubscriptionStatus::Cancelled;
    store.upsert(&record).await.expect("second upsert");
    let found = store.find(&email).await.expect("find").expect("record");
    assert_eq!(found.plan, PlanId::Beginner);
    assert_eq!(found.status, SubscriptionStatus::Cancelled);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_record_usage_creates_free_row_lazily() {
    let pool = test_pool().await;
    let gate = EntitlementGate::new(PlanCatalog::builtin(), pool.clone());
    let email = unique_email("lazy");

    assert!(gate.store().find(&email).await.expect("find").is_none());
    let used = gate
        .record_usage(&email, UsageType::MockInterview)
        .await
        .expect("record");
    assert_eq!(used, 1);

    let record = gate.store().find(&email).await.expect("find").expect("row");
    assert_eq!(record.plan, PlanId::Free);
    assert_eq!(record.status, SubscriptionStatus::Active);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_free_quota_denies_at_limit() {
    let pool = test_pool().await;
    let gate = EntitlementGate::new(PlanCatalog::builtin(), pool);
    let email = unique_email("quota");

    for _ in 0..5 {
        let decision = gate
            .check_limit(&email, UsageType::LiveInterview)
            .await
            .expect("check");
        assert!(decision.allowed);
        gate.record_usage(&email, UsageType::LiveInterview)
            .await
            .expect("record");
    }

    let decision = gate
        .check_limit(&email, UsageType::LiveInterview)
        .await
        .expect("check");
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("used 5/5"));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_paid_transition_applies_exactly_once() {
    let pool = test_pool().await;
    let checkout = checkout_service(pool.clone());
    let email = unique_email("paid");
    let session_id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
    insert_pending_session(&pool, &session_id, &email).await;

    // Poll and webhook race on the same session; only one applies
    assert!(checkout.apply_paid_transition(&session_id).await.expect("first"));
    assert!(!checkout.apply_paid_transition(&session_id).await.expect("second"));

    let session = checkout
        .find_session(&session_id)
        .await
        .expect("find")
        .expect("session");
    assert_eq!(session.payment_status, PaymentStatus::Paid);
    assert_eq!(session.application_status, ApplicationStatus::Completed);

    let store = SubscriptionStore::new(pool);
    let record = store.find(&email).await.expect("find").expect("record");
    assert_eq!(record.plan, PlanId::Beginner);
    assert_eq!(record.status, SubscriptionStatus::Active);
    let start = record.current_period_start.expect("period start");
    let end = record.current_period_end.expect("period end");
    assert_eq!(end - start, time::Duration::days(30));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_failure_signal_never_reverts_completed_session() {
    let pool = test_pool().await;
    let checkout = checkout_service(pool.clone());
    let email = unique_email("late-failure");
    let session_id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
    insert_pending_session(&pool, &session_id, &email).await;

    assert!(checkout.apply_paid_transition(&session_id).await.expect("apply"));
    let changed = checkout
        .mark_payment_outcome(&session_id, PaymentStatus::Failed, ApplicationStatus::Failed)
        .await
        .expect("mark");
    assert!(!changed);

    let session = checkout
        .find_session(&session_id)
        .await
        .expect("find")
        .expect("session");
    assert_eq!(session.application_status, ApplicationStatus::Completed);
    assert_eq!(session.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_expired_session_cancels_application() {
    let pool = test_pool().await;
    let checkout = checkout_service(pool.clone());
    let email = unique_email("expired");
    let session_id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
    insert_pending_session(&pool, &session_id, &email).await;

    let changed = checkout
        .mark_payment_outcome(
            &session_id,
            PaymentStatus::Expired,
            ApplicationStatus::Cancelled,
        )
        .await
        .expect("mark");
    assert!(changed);

    let session = checkout
        .find_session(&session_id)
        .await
        .expect("find")
        .expect("session");
    assert_eq!(session.payment_status, PaymentStatus::Expired);
    assert_eq!(session.application_status, ApplicationStatus::Cancelled);

    // No subscription was ever activated
    let store = SubscriptionStore::new(pool);
    assert!(store.find(&email).await.expect("find").is_none());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_paid_activation_resets_quota_window() {
    let pool = test_pool().await;
    let gate = EntitlementGate::new(PlanCatalog::builtin(), pool.clone());
    let checkout = checkout_service(pool.clone());
    let email = unique_email("upgrade");

    // Exhaust the free live-interview quota first
    for _ in 0..5 {
        gate.record_usage(&email, UsageType::LiveInterview)
            .await
            .expect("record");
    }
    assert!(!gate
        .check_limit(&email, UsageType::LiveInterview)
        .await
        .expect("check")
        .allowed);

    let session_id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
    insert_pending_session(&pool, &session_id, &email).await;
    assert!(checkout.apply_paid_transition(&session_id).await.expect("apply"));

    // New paid period starts now; old counters are outside the window
    let decision = gate
        .check_limit(&email, UsageType::LiveInterview)
        .await
        .expect("check");
    assert_eq!(decision.plan, PlanId::Beginner);
    assert!(decision.allowed);
    assert_eq!(decision.used, 0);
}
