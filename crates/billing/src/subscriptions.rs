//! Subscription record store, keyed by email.
//!
//! Absence of a row is not an error: callers treat a missing record as the
//! implicit free tier. Rows are created lazily on first usage recording and
//! replaced wholesale on paid activation.

use prepstack_shared::{SubscriptionRecord, UsageType};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;
use crate::usage::UsageLedger;

#[derive(Clone)]
pub struct SubscriptionStore {
    pool: PgPool,
    ledger: UsageLedger,
}

impl SubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        let ledger = UsageLedger::new(pool.clone());
        Self { pool, ledger }
    }

    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Look up a record by email. `usage_counters` is left empty here; callers
    /// that need counters join them in via the ledger with a period boundary.
    pub async fn find(&self, email: &str) -> BillingResult<Option<SubscriptionRecord>> {
        let record: Option<SubscriptionRecord> = sqlx::query_as(
            "SELECT email, plan, billing_cycle, status,
                    current_period_start, current_period_end, created_at, updated_at
             FROM subscriptions WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or fully replace the record for `record.email`. Last write wins;
    /// period bounds and status are taken from the caller as-is.
    pub async fn upsert(&self, record: &SubscriptionRecord) -> BillingResult<()> {
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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one completed action. Creates the free-tier subscription row on
    /// first use (no-op if one exists), then bumps the counter. Returns the
    /// post-increment count.
    pub async fn record_usage(
        &self,
        email: &str,
        usage_type: UsageType,
        period_start: OffsetDateTime,
    ) -> BillingResult<i64> {
        sqlx::query(
            "INSERT INTO subscriptions (email, created_at, updated_at)
             VALUES ($1, NOW(), NOW())
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        self.ledger.increment(email, usage_type, period_start).await
    }
}
