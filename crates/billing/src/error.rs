//! Billing error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid billing cycle: {0}")]
    InvalidBillingCycle(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook payload does not match stored session: {0}")]
    MetadataMismatch(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        Self::Provider(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
