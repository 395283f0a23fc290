//! Usage ledger: per-(email, usage_type) counters for the current period.
//!
//! One row per pair. The caller supplies the billing-period boundary; a row
//! whose `period_start` predates the boundary reads as zero and is rolled
//! forward on the next increment. Increments go through a single conditional
//! upsert so concurrent completions are serialized by the row lock, never by
//! in-process state.

use prepstack_shared::UsageType;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::BillingResult;

#[derive(Clone)]
pub struct UsageLedger {
    pool: PgPool,
}

impl UsageLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count used within the period starting at `period_start`.
    /// Missing rows and rows from earlier periods read as zero.
    pub async fn current_usage(
        &self,
        email: &str,
        usage_type: UsageType,
        period_start: OffsetDateTime,
    ) -> BillingResult<i64> {
        let row: Option<(i64, OffsetDateTime)> = sqlx::query_as(
            "SELECT used, period_start FROM usage_counters
             WHERE email = $1 AND usage_type = $2",
        )
        .bind(email)
        .bind(usage_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((used, row_period)) if row_period >= period_start => used,
            _ => 0,
        })
    }

    /// All counters for an email within the given period.
    pub async fn usage_snapshot(
        &self,
        email: &str,
        period_start: OffsetDateTime,
    ) -> BillingResult<std::collections::BTreeMap<UsageType, i64>> {
        let rows: Vec<(UsageType, i64, OffsetDateTime)> = sqlx::query_as(
            "SELECT usage_type, used, period_start FROM usage_counters WHERE email = $1",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot: std::collections::BTreeMap<UsageType, i64> =
            UsageType::ALL.iter().map(|t| (*t, 0)).collect();
        for (usage_type, used, row_period) in rows {
            if row_period >= period_start {
                snapshot.insert(usage_type, used);
            }
        }
        Ok(snapshot)
    }

    /// Increment by one and return the post-increment count. A row left over
    /// from a previous period restarts at 1 under the new boundary. Never
    /// lossy under concurrency: the upsert reads and writes in one statement.
    pub async fn increment(
        &self,
        email: &str,
        usage_type: UsageType,
        period_start: OffsetDateTime,
    ) -> BillingResult<i64> {
        let (used,): (i64,) = sqlx::query_as(
            "INSERT INTO usage_counters (email, usage_type, used, period_start, updated_at)
             VALUES ($1, $2, 1, $3, NOW())
             ON CONFLICT (email, usage_type) DO UPDATE SET
                 used = CASE
                     WHEN usage_counters.period_start >= EXCLUDED.period_start
                     THEN usage_counters.used + 1
                     ELSE 1
                 END,
                 period_start = GREATEST(usage_counters.period_start, EXCLUDED.period_start),
                 updated_at = NOW()
             RETURNING used",
        )
        .bind(email)
        .bind(usage_type)
        .bind(period_start)
        .fetch_one(&self.pool)
        .await?;

        Ok(used)
    }
}
