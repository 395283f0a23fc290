//! Entitlement gate: the single decision point for "may this action happen".
//!
//! The decision itself is a pure function over (plan, quota, used); the gate
//! wraps it with record lookup and counter reads. Denials carry a
//! human-readable reason; allowed decisions carry what's left, so callers can
//! surface both without re-deriving catalog math.

use std::collections::BTreeMap;

use prepstack_shared::{PlanId, Quota, SubscriptionRecord, UsageType};
use serde::Serialize;
use sqlx::PgPool;
use time::{OffsetDateTime, Time};

use crate::catalog::{PlanCatalog, PlanDefinition};
use crate::error::BillingResult;
use crate::subscriptions::SubscriptionStore;

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub plan: PlanId,
    pub usage_type: UsageType,
    pub limit: Quota,
    pub used: i64,
    /// None when the plan is unlimited for this usage type
    pub remaining: Option<i64>,
    pub duration_limit_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Everything a subscription page needs in one shape
#[derive(Debug, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: SubscriptionRecord,
    pub plan_details: PlanDefinition,
    pub usage: BTreeMap<UsageType, i64>,
}

/// Decide whether one more action of `usage_type` is allowed under `plan`
/// given `used` so far this period. Pure; all inputs are already resolved.
pub fn decide(catalog: &PlanCatalog, plan: PlanId, usage_type: UsageType, used: i64) -> Decision {
    let limit = catalog.quota_for(plan, usage_type);
    let allowed = limit.allows(used);
    let reason = if allowed {
        None
    } else {
        Some(format!(
            "{} limit reached: used {}/{} this period on the {} plan",
            usage_type.label(),
            used,
            limit,
            plan
        ))
    };
    Decision {
        allowed,
        plan,
        usage_type,
        limit,
        used,
        remaining: limit.remaining(used),
        duration_limit_minutes: catalog.resolve(plan).session_duration_minutes,
        reason,
    }
}

/// Midnight on the first of the month containing `now`. The free tier has no
/// stored period bounds, so its quota window is the calendar month.
fn calendar_month_start(now: OffsetDateTime) -> OffsetDateTime {
    now.replace_day(1)
        .unwrap_or(now)
        .replace_time(Time::MIDNIGHT)
}

/// Resolve which plan currently applies and when its quota window started.
/// A record whose status revokes access, or whose paid period has lapsed,
/// falls back to the free tier on a calendar-month window. The record itself
/// is never mutated here; downgrade is a read-time interpretation.
fn effective_plan(
    record: Option<&SubscriptionRecord>,
    now: OffsetDateTime,
) -> (PlanId, OffsetDateTime) {
    match record {
        Some(r)
            if r.status.grants_plan_access()
                && r.current_period_end.map_or(true, |end| end > now) =>
        {
            let period_start = r.current_period_start.unwrap_or_else(|| calendar_month_start(now));
            (r.plan, period_start)
        }
        _ => (PlanId::Free, calendar_month_start(now)),
    }
}

#[derive(Clone)]
pub struct EntitlementGate {
    catalog: PlanCatalog,
    store: SubscriptionStore,
}

impl EntitlementGate {
    pub fn new(catalog: PlanCatalog, pool: PgPool) -> Self {
        Self {
            catalog,
            store: SubscriptionStore::new(pool),
        }
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Check whether `email` may perform one more action of `usage_type`.
    /// An empty email is an anonymous caller: decided against the free tier
    /// with zero usage, and nothing is read or written.
    pub async fn check_limit(&self, email: &str, usage_type: UsageType) -> BillingResult<Decision> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(decide(&self.catalog, PlanId::Free, usage_type, 0));
        }

        let now = OffsetDateTime::now_utc();
        let record = self.store.find(email).await?;
        let (plan, period_start) = effective_plan(record.as_ref(), now);
        let used = self
            .store
            .ledger()
            .current_usage(email, usage_type, period_start)
            .await?;
        let decision = decide(&self.catalog, plan, usage_type, used);

        if !decision.allowed {
            tracing::info!(
                email = %email,
                plan = %plan,
                usage_type = %usage_type,
                used,
                "Usage denied, quota exhausted"
            );
        }
        Ok(decision)
    }

    /// Record one completed action and return the post-increment count.
    /// Anonymous callers leave no durable trace.
    pub async fn record_usage(&self, email: &str, usage_type: UsageType) -> BillingResult<i64> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc();
        let record = self.store.find(email).await?;
        let (_, period_start) = effective_plan(record.as_ref(), now);
        let used = self.store.record_usage(email, usage_type, period_start).await?;

        tracing::debug!(email = %email, usage_type = %usage_type, used, "Recorded usage");
        Ok(used)
    }

    /// The record (or implicit free default), the effective plan's full
    /// definition, and this period's counters in one read.
    pub async fn subscription_overview(&self, email: &str) -> BillingResult<SubscriptionOverview> {
        let now = OffsetDateTime::now_utc();
        let record = self.store.find(email).await?;
        let (plan, period_start) = effective_plan(record.as_ref(), now);
        let usage = self.store.ledger().usage_snapshot(email, period_start).await?;

        let mut subscription =
            record.unwrap_or_else(|| SubscriptionRecord::free_default(email));
        subscription.usage_counters = usage.clone();

        Ok(SubscriptionOverview {
            subscription,
            plan_details: self.catalog.resolve(plan).clone(),
            usage,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use prepstack_shared::{BillingCycle, SubscriptionStatus};
    use time::macros::datetime;

    fn paid_record(
        plan: PlanId,
        status: SubscriptionStatus,
        period_end: OffsetDateTime,
    ) -> SubscriptionRecord {
        let mut record = SubscriptionRecord::free_default("bob@example.com");
        record.plan = plan;
        record.billing_cycle = BillingCycle::Monthly;
        record.status = status;
        record.current_period_start = Some(period_end - BillingCycle::Monthly.period_length());
        record.current_period_end = Some(period_end);
        record
    }

    #[test]
    fn test_free_tier_live_interview_exhaustion() {
        let catalog = PlanCatalog::builtin();
        let decision = decide(&catalog, PlanId::Free, UsageType::LiveInterview, 5);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, Some(0));
        assert!(decision.reason.as_deref().unwrap().contains("used 5/5"));
    }

    #[test]
    fn test_free_tier_allows_under_limit() {
        let catalog = PlanCatalog::builtin();
        let decision = decide(&catalog, PlanId::Free, UsageType::LiveInterview, 4);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, Some(1));
        assert!(decision.reason.is_none());
        assert_eq!(decision.duration_limit_minutes, 15);
    }

    #[test]
    fn test_executive_never_denied() {
        let catalog = PlanCatalog::builtin();
        let decision = decide(&catalog, PlanId::Executive, UsageType::CodingSession, 1_000_000);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, None);
        assert_eq!(decision.duration_limit_minutes, 120);
    }

    #[test]
    fn test_effective_plan_active_record_keeps_plan() {
        let now = datetime!(2026-08-10 12:00:00 UTC);
        let record = paid_record(
            PlanId::Advanced,
            SubscriptionStatus::Active,
            datetime!(2026-09-01 00:00:00 UTC),
        );
        let (plan, period_start) = effective_plan(Some(&record), now);
        assert_eq!(plan, PlanId::Advanced);
        assert_eq!(period_start, record.current_period_start.unwrap());
    }

    #[test]
    fn test_effective_plan_past_due_keeps_access() {
        let now = datetime!(2026-08-10 12:00:00 UTC);
        let record = paid_record(
            PlanId::Beginner,
            SubscriptionStatus::PastDue,
            datetime!(2026-09-01 00:00:00 UTC),
        );
        assert_eq!(effective_plan(Some(&record), now).0, PlanId::Beginner);
    }

    #[test]
    fn test_effective_plan_cancelled_falls_back_to_free() {
        let now = datetime!(2026-08-10 12:00:00 UTC);
        let record = paid_record(
            PlanId::Executive,
            SubscriptionStatus::Cancelled,
            datetime!(2026-09-01 00:00:00 UTC),
        );
        let (plan, period_start) = effective_plan(Some(&record), now);
        assert_eq!(plan, PlanId::Free);
        assert_eq!(period_start, datetime!(2026-08-01 00:00:00 UTC));
    }

    #[test]
    fn test_effective_plan_lapsed_period_falls_back_to_free() {
        let now = datetime!(2026-08-10 12:00:00 UTC);
        let record = paid_record(
            PlanId::Advanced,
            SubscriptionStatus::Active,
            datetime!(2026-08-01 00:00:00 UTC),
        );
        assert_eq!(effective_plan(Some(&record), now).0, PlanId::Free);
    }

    #[test]
    fn test_effective_plan_missing_record_is_free_on_calendar_month() {
        let now = datetime!(2026-02-17 23:59:00 UTC);
        let (plan, period_start) = effective_plan(None, now);
        assert_eq!(plan, PlanId::Free);
        assert_eq!(period_start, datetime!(2026-02-01 00:00:00 UTC));
    }

    #[test]
    fn test_calendar_month_start() {
        assert_eq!(
            calendar_month_start(datetime!(2026-08-24 15:30:45 UTC)),
            datetime!(2026-08-01 00:00:00 UTC)
        );
        assert_eq!(
            calendar_month_start(datetime!(2026-08-01 00:00:00 UTC)),
            datetime!(2026-08-01 00:00:00 UTC)
        );
    }
}
