//! Shared application state

use std::sync::Arc;

use prepstack_billing::{
    BillingResult, CheckoutService, EntitlementGate, PlanCatalog, StripeClient, WebhookService,
};
use sqlx::PgPool;

use crate::config::Config;

/// Handles to every service, cloned into each request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: PgPool,
    pub catalog: PlanCatalog,
    pub checkout: CheckoutService,
    pub webhooks: WebhookService,
    pub gate: EntitlementGate,
}

impl AppState {
    pub fn new(config: Config, pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        let catalog = PlanCatalog::builtin();
        let checkout = CheckoutService::new(stripe.clone(), catalog.clone(), pool.clone());
        let webhooks =
            WebhookService::new(checkout.clone(), stripe.webhook_secret().to_string());
        let gate = EntitlementGate::new(catalog.clone(), pool.clone());

        Ok(Self {
            config: Arc::new(config),
            pool,
            catalog,
            checkout,
            webhooks,
            gate,
        })
    }
}
