//! Checkout and billing portal session creation
//!
//! The platform sells one subscription plan. Checkout metadata carries
//! userId and userEmail on both the session and the subscription, which
//! is what the webhook resolver's email fallback depends on.

use std::collections::HashMap;

use charterline_shared::models::User;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateBillingPortalSession, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
};

use crate::client::StripeClient;
use crate::error::BillingResult;

#[derive(Debug, Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a subscription checkout session for the platform plan.
    pub async fn create_subscription_checkout(&self, user: &User) -> BillingResult<CheckoutSession> {
        let config = self.stripe.config();
        let price_id = config.price_id.clone();
        let success_url = format!(
            "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
            config.app_url
        );
        let cancel_url = format!("{}/pricing", config.app_url);
        let client_reference_id = user.id.to_string();

        let metadata: HashMap<String, String> = HashMap::from([
            ("userId".to_string(), user.id.to_string()),
            ("userEmail".to_string(), user.email.clone()),
            ("priceId".to_string(), price_id.clone()),
        ]);

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.customer_email = Some(&user.email);
        params.client_reference_id = Some(&client_reference_id);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.metadata = Some(metadata.clone());
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(metadata),
            ..Default::default()
        });

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;
        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            "checkout session created"
        );
        Ok(session)
    }

    /// Create a billing portal session so the user can manage payment
    /// methods and cancellation themselves.
    pub async fn create_portal_session(
        &self,
        user: &User,
        customer_id: &str,
    ) -> BillingResult<stripe::BillingPortalSession> {
        let parsed = customer_id
            .parse()
            .map_err(|_| crate::error::BillingError::Internal(format!(
                "invalid customer id {customer_id:?}"
            )))?;
        let return_url = format!("{}/dashboard", self.stripe.config().app_url);
        let mut params = CreateBillingPortalSession::new(parsed);
        params.return_url = Some(&return_url);
        let session = stripe::BillingPortalSession::create(self.stripe.inner(), params).await?;
        tracing::info!(user_id = %user.id, "billing portal session created");
        Ok(session)
    }
}
