#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Charterline Billing Module
//!
//! Stripe integration for the single-plan subscription: checkout, the
//! billing portal, and webhook-driven reconciliation of subscription
//! state onto users and captains.

pub mod checkout;
pub mod client;
pub mod error;
pub mod resolver;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

pub use checkout::CheckoutService;
pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use resolver::{
    resolve_user_for_invoice, resolve_user_for_subscription, InvoiceIdentifiers, ResolutionPath,
    SubscriptionIdentifiers,
};
pub use subscriptions::SubscriptionService;
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        let stripe = StripeClient::new(config);
        Self {
            checkout: CheckoutService::new(stripe.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
