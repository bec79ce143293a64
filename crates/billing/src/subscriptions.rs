//! Subscription state reconciliation
//!
//! Applies Stripe's view of a subscription onto the user row and mirrors
//! the resulting access flag onto the captain profile, which is what the
//! voice pipeline actually gates on.

use charterline_shared::models::{Captain, SubscriptionUpdate, User};
use charterline_shared::SubscriptionStatus;
use sqlx::PgPool;
use stripe::Subscription;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

#[derive(Debug, Clone)]
pub struct SubscriptionService {
    pool: PgPool,
}

/// Translate Stripe's status enum into the locally stored one.
pub fn map_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    match status {
        stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
        stripe::SubscriptionStatus::Canceled => SubscriptionStatus::Canceled,
        stripe::SubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
        stripe::SubscriptionStatus::Unpaid => SubscriptionStatus::Unpaid,
        stripe::SubscriptionStatus::Incomplete => SubscriptionStatus::Incomplete,
        stripe::SubscriptionStatus::IncompleteExpired => SubscriptionStatus::IncompleteExpired,
        stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
        stripe::SubscriptionStatus::Paused => SubscriptionStatus::Paused,
    }
}

/// `customer.subscription.created` often races the checkout-completed
/// handler, which already applied the same subscription. Skip when the
/// stored state says there is nothing new to learn.
pub fn created_event_is_redundant(
    stored_status: SubscriptionStatus,
    stored_subscription_id: Option<&str>,
    incoming_subscription_id: &str,
) -> bool {
    stored_status.is_active() || stored_subscription_id == Some(incoming_subscription_id)
}

/// Payment success only reactivates users who lapsed through the billing
/// lifecycle; a deliberate cancellation stays canceled until a new
/// subscription is created.
pub fn payment_can_reactivate(status: SubscriptionStatus) -> bool {
    matches!(
        status,
        SubscriptionStatus::PastDue | SubscriptionStatus::Incomplete | SubscriptionStatus::None
    )
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write Stripe's subscription state onto the user and mirror the
    /// access flag to the captain.
    pub async fn apply_subscription(
        &self,
        user: &User,
        subscription: &Subscription,
    ) -> BillingResult<SubscriptionStatus> {
        let status = map_status(subscription.status);
        let update = SubscriptionUpdate {
            stripe_subscription_id: Some(subscription.id.to_string()),
            status: Some(status),
            current_period_start: OffsetDateTime::from_unix_timestamp(
                subscription.current_period_start,
            )
            .ok(),
            current_period_end: OffsetDateTime::from_unix_timestamp(
                subscription.current_period_end,
            )
            .ok(),
            cancel_at_period_end: Some(subscription.cancel_at_period_end),
            price_id: subscription
                .items
                .data
                .first()
                .and_then(|item| item.price.as_ref())
                .map(|price| price.id.to_string()),
        };
        User::update_subscription(&self.pool, user.id, &update).await?;
        self.mirror_to_captain(user.id, status.is_active()).await?;

        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            status = %status,
            "subscription state applied"
        );
        Ok(status)
    }

    /// Subscription deleted: reset the user's billing state entirely.
    pub async fn clear_subscription(&self, user: &User) -> BillingResult<()> {
        User::clear_subscription(&self.pool, user.id).await?;
        self.mirror_to_captain(user.id, false).await?;
        tracing::info!(user_id = %user.id, "subscription cleared");
        Ok(())
    }

    /// Invoice paid: reactivate the user if their current status allows it.
    /// Returns true when a transition happened.
    pub async fn handle_payment_succeeded(&self, user: &User) -> BillingResult<bool> {
        if !payment_can_reactivate(user.status()) {
            tracing::debug!(
                user_id = %user.id,
                status = %user.status(),
                "payment received, no reactivation needed"
            );
            return Ok(false);
        }
        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::Active),
            ..Default::default()
        };
        User::update_subscription(&self.pool, user.id, &update).await?;
        self.mirror_to_captain(user.id, true).await?;
        tracing::info!(user_id = %user.id, "user reactivated after payment");
        Ok(true)
    }

    /// Invoice payment failed: flag past_due and cut captain access.
    pub async fn handle_payment_failed(&self, user: &User) -> BillingResult<()> {
        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::PastDue),
            ..Default::default()
        };
        User::update_subscription(&self.pool, user.id, &update).await?;
        self.mirror_to_captain(user.id, false).await?;
        tracing::warn!(user_id = %user.id, "payment failed, user marked past_due");
        Ok(())
    }

    async fn mirror_to_captain(&self, user_id: Uuid, active: bool) -> BillingResult<()> {
        let mirrored =
            Captain::set_subscription_active_for_user(&self.pool, user_id, active).await?;
        if !mirrored {
            // Billing can complete before onboarding creates the captain.
            tracing::debug!(user_id = %user_id, "no captain profile to mirror onto");
        }
        Ok(())
    }
}
