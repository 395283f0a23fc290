//! Common types used across PrepStack

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use time::OffsetDateTime;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Beginner,
    Advanced,
    Executive,
}

impl Default for PlanId {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanId {
    /// All plans, in upgrade order
    pub const ALL: [PlanId; 4] = [Self::Free, Self::Beginner, Self::Advanced, Self::Executive];

    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    /// Parse a plan id from string, falling back to Free for unknown values.
    /// Plan resolution never fails; unknown ids get the free tier.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Free)
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Beginner => write!(f, "beginner"),
            Self::Advanced => write!(f, "advanced"),
            Self::Executive => write!(f, "executive"),
        }
    }
}

impl std::str::FromStr for PlanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "beginner" => Ok(Self::Beginner),
            "advanced" => Ok(Self::Advanced),
            "executive" => Ok(Self::Executive),
            _ => Err(format!("Invalid plan id: {}", s)),
        }
    }
}

/// Billing cycle for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Yearly,
}

impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

impl BillingCycle {
    /// Length of the paid period in days (monthly 30, quarterly 90, yearly 365)
    pub fn period_days(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Yearly => 365,
        }
    }

    pub fn period_length(&self) -> time::Duration {
        time::Duration::days(self.period_days())
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Invalid billing cycle: {}", s)),
        }
    }
}

/// Metered action kinds gated by plan quotas
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    LiveInterview,
    MockInterview,
    CodingSession,
}

impl UsageType {
    pub const ALL: [UsageType; 3] = [Self::LiveInterview, Self::MockInterview, Self::CodingSession];

    /// Human-readable plural label for limit messages
    pub fn label(&self) -> &'static str {
        match self {
            Self::LiveInterview => "live interviews",
            Self::MockInterview => "mock interviews",
            Self::CodingSession => "coding sessions",
        }
    }
}

impl std::fmt::Display for UsageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LiveInterview => write!(f, "live_interview"),
            Self::MockInterview => write!(f, "mock_interview"),
            Self::CodingSession => write!(f, "coding_session"),
        }
    }
}

impl std::str::FromStr for UsageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live_interview" => Ok(Self::LiveInterview),
            "mock_interview" => Ok(Self::MockInterview),
            "coding_session" => Ok(Self::CodingSession),
            _ => Err(format!("Invalid usage type: {}", s)),
        }
    }
}

/// Per-period quota for a usage type.
///
/// The wire format (and the catalog's source data) uses `-1` as the unlimited
/// sentinel; inside the codebase the distinction is explicit so comparison
/// sites never see the magic integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum Quota {
    Unlimited,
    Limited(u32),
}

impl Quota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }

    /// Whether one more action is allowed given the count already used
    pub fn allows(&self, used: i64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(limit) => used < *limit as i64,
        }
    }

    /// Remaining actions this period; None means unlimited
    pub fn remaining(&self, used: i64) -> Option<i64> {
        match self {
            Self::Unlimited => None,
            Self::Limited(limit) => Some((*limit as i64 - used).max(0)),
        }
    }
}

impl From<i64> for Quota {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Self::Unlimited
        } else {
            Self::Limited(raw as u32)
        }
    }
}

impl From<Quota> for i64 {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Unlimited => -1,
            Quota::Limited(n) => n as i64,
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    PastDue,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl SubscriptionStatus {
    /// Whether the record's plan still grants entitlements.
    /// PastDue keeps access as a grace state; cancelled/expired fall back to free.
    pub fn grants_plan_access(&self) -> bool {
        matches!(self, Self::Active | Self::PastDue)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Expired => write!(f, "expired"),
            Self::PastDue => write!(f, "past_due"),
        }
    }
}

/// Provider-reported payment status of a checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Failed => write!(f, "failed"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Locally owned lifecycle status of a checkout attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Initiated,
    Completed,
    Failed,
    Cancelled,
}

impl Default for ApplicationStatus {
    fn default() -> Self {
        Self::Initiated
    }
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Initiated)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "initiated"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Durable record of a user's current plan and billing period, keyed by email.
///
/// `usage_counters` is joined in from the usage ledger at read time; the row
/// itself only stores plan/period facts. Quota enforcement happens at decision
/// time in the entitlement gate, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    pub email: String,
    pub plan: PlanId,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sqlx(skip)]
    #[serde(default)]
    pub usage_counters: BTreeMap<UsageType, i64>,
}

impl SubscriptionRecord {
    /// Implicit default record for an email with no stored subscription:
    /// free plan, active, no period bounds. Absence is not an error state.
    pub fn free_default(email: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            email: email.into(),
            plan: PlanId::Free,
            billing_cycle: BillingCycle::Monthly,
            status: SubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            created_at: now,
            updated_at: now,
            usage_counters: BTreeMap::new(),
        }
    }
}

/// One checkout attempt, keyed by the provider-issued session id.
/// Rows are never deleted; terminal sessions are kept as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentSession {
    pub checkout_session_id: String,
    pub email: String,
    pub plan: PlanId,
    pub billing_cycle: BillingCycle,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub application_status: ApplicationStatus,
    pub metadata: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Tests
// =============================================================================
