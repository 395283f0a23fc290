//! Plan catalog: the authoritative table of plans, prices, and quotas.
//!
//! The catalog is compiled in. Prices are integer cents; quotas use the
//! `Quota` type so unlimited never leaks as a magic `-1` past the boundary.

use prepstack_shared::{BillingCycle, PlanId, Quota, UsageType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a plan grants: prices per cycle, per-period quotas, and the
/// feature switches the product surfaces alongside them.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDefinition {
    pub id: PlanId,
    pub name: String,
    pub price_monthly_cents: i64,
    pub price_quarterly_cents: i64,
    pub price_yearly_cents: i64,
    pub quotas: BTreeMap<UsageType, Quota>,
    pub session_duration_minutes: u32,
    pub ai_models: Vec<String>,
    pub export_enabled: bool,
    pub priority_support: bool,
}

impl PlanDefinition {
    pub fn price_cents(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.price_monthly_cents,
            BillingCycle::Quarterly => self.price_quarterly_cents,
            BillingCycle::Yearly => self.price_yearly_cents,
        }
    }
}

struct CatalogInner {
    free: PlanDefinition,
    beginner: PlanDefinition,
    advanced: PlanDefinition,
    executive: PlanDefinition,
}

/// Read-only view over the built-in plan table. Cheap to clone.
///
/// Resolution is total: unknown or missing plans resolve to the free tier,
/// and a usage type missing from a plan falls back to the free tier's quota
/// (then to zero) so a catalog gap can never grant unmetered access.
#[derive(Clone)]
pub struct PlanCatalog {
    inner: Arc<CatalogInner>,
}

impl std::fmt::Debug for PlanCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCatalog").finish_non_exhaustive()
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn quotas(live: i64, mock: i64, coding: i64) -> BTreeMap<UsageType, Quota> {
    BTreeMap::from([
        (UsageType::LiveInterview, Quota::from(live)),
        (UsageType::MockInterview, Quota::from(mock)),
        (UsageType::CodingSession, Quota::from(coding)),
    ])
}

impl PlanCatalog {
    pub fn builtin() -> Self {
        let free = PlanDefinition {
            id: PlanId::Free,
            name: "Free".to_string(),
            price_monthly_cents: 0,
            price_quarterly_cents: 0,
            price_yearly_cents: 0,
            quotas: quotas(5, 3, 10),
            session_duration_minutes: 15,
            ai_models: vec!["gpt-5.2".to_string()],
            export_enabled: false,
            priority_support: false,
        };
        let beginner = PlanDefinition {
            id: PlanId::Beginner,
            name: "Beginner".to_string(),
            price_monthly_cents: 2900,
            price_quarterly_cents: 7830,
            price_yearly_cents: 26100,
            quotas: quotas(20, 10, 50),
            session_duration_minutes: 30,
            ai_models: vec!["gpt-5.2".to_string(), "gemini-3-flash".to_string()],
            export_enabled: true,
            priority_support: false,
        };
        let advanced = PlanDefinition {
            id: PlanId::Advanced,
            name: "Advanced".to_string(),
            price_monthly_cents: 5900,
            price_quarterly_cents: 15930,
            price_yearly_cents: 53100,
            quotas: quotas(50, 30, 200),
            session_duration_minutes: 60,
            ai_models: vec![
                "gpt-5.2".to_string(),
                "gemini-3-flash".to_string(),
                "claude-sonnet-4.5".to_string(),
            ],
            export_enabled: true,
            priority_support: false,
        };
        let executive = PlanDefinition {
            id: PlanId::Executive,
            name: "Executive".to_string(),
            price_monthly_cents: 9900,
            price_quarterly_cents: 26730,
            price_yearly_cents: 89100,
            quotas: quotas(-1, -1, -1),
            session_duration_minutes: 120,
            ai_models: vec![
                "gpt-5.2".to_string(),
                "gemini-3-flash".to_string(),
                "claude-sonnet-4.5".to_string(),
            ],
            export_enabled: true,
            priority_support: true,
        };
        Self {
            inner: Arc::new(CatalogInner {
                free,
                beginner,
                advanced,
                executive,
            }),
        }
    }

    /// All plans in upgrade order
    pub fn plans(&self) -> Vec<&PlanDefinition> {
        PlanId::ALL.iter().map(|p| self.resolve(*p)).collect()
    }

    pub fn resolve(&self, plan: PlanId) -> &PlanDefinition {
        match plan {
            PlanId::Free => &self.inner.free,
            PlanId::Beginner => &self.inner.beginner,
            PlanId::Advanced => &self.inner.advanced,
            PlanId::Executive => &self.inner.executive,
        }
    }

    /// Resolve from a stored string; unknown plan ids get the free tier
    pub fn resolve_str(&self, plan: &str) -> &PlanDefinition {
        self.resolve(PlanId::from_str_lossy(plan))
    }

    pub fn quota_for(&self, plan: PlanId, usage_type: UsageType) -> Quota {
        self.resolve(plan)
            .quotas
            .get(&usage_type)
            .copied()
            .or_else(|| self.inner.free.quotas.get(&usage_type).copied())
            .unwrap_or(Quota::Limited(0))
    }

    pub fn price_cents(&self, plan: PlanId, cycle: BillingCycle) -> i64 {
        self.resolve(plan).price_cents(cycle)
    }
}
