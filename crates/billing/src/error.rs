//! Billing error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("stripe error: {0}")]
    Stripe(#[from] stripe::StripeError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("unexpected webhook payload: {0}")]
    WebhookEventNotSupported(String),

    #[error("no user resolved for {0}")]
    UserNotFound(String),

    #[error("missing configuration: {0}")]
    Config(&'static str),

    #[error("{0}")]
    Internal(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
