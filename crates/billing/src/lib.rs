//! PrepStack billing core: plan catalog, usage metering, subscription
//! lifecycle, checkout tracking, and entitlement decisions.

pub mod catalog;
pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;

pub use catalog::{PlanCatalog, PlanDefinition};
pub use checkout::{CheckoutResponse, CheckoutService, CheckoutStatus};
pub use client::{StripeClient, StripeConfig};
pub use entitlement::{decide, Decision, EntitlementGate, SubscriptionOverview};
pub use error::{BillingError, BillingResult};
pub use subscriptions::SubscriptionStore;
pub use usage::UsageLedger;
pub use webhooks::{WebhookEvent, WebhookService};
