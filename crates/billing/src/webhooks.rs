//! Stripe webhook handling
//!
//! Verifies deliveries, claims them in the processed-event ledger, and
//! dispatches to the subscription reconciler. Stripe retries on non-2xx,
//! so handler failures are recorded in the ledger and surfaced, while
//! duplicate and unhandled events acknowledge cleanly.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Invoice, Subscription, Webhook};
use time::OffsetDateTime;
use uuid::Uuid;

use charterline_shared::models::User;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::resolver::{expandable_id, resolve_user_for_invoice, resolve_user_for_subscription};
use crate::subscriptions::{created_event_is_redundant, SubscriptionService};

type HmacSha256 = Hmac<Sha256>;

pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    subscriptions: SubscriptionService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let subscriptions = SubscriptionService::new(pool.clone());
        Self {
            stripe,
            pool,
            subscriptions,
        }
    }

    /// Verify and parse a Stripe webhook delivery.
    ///
    /// Falls back to manual signature verification when the library
    /// rejects an event from a newer Stripe API version than it knows.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "standard webhook parsing failed, trying manual verification"
                );
            }
        }

        // Signature header format: t=timestamp,v1=signature[,v0=...]
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;
        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0] {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::error!("missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;
        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::error!("missing v1 signature in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        // 5 minute replay tolerance
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| BillingError::WebhookSignatureInvalid)?
            .as_secs() as i64;
        if (now - timestamp).abs() > 300 {
            tracing::error!(
                timestamp = timestamp,
                skew = (now - timestamp).abs(),
                "webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "failed to parse verified webhook payload");
            BillingError::WebhookSignatureInvalid
        })?;
        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "manual webhook verification passed"
        );
        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// The INSERT...ON CONFLICT...RETURNING atomically claims exclusive
    /// processing rights so concurrent deliveries of the same event cannot
    /// both pass an existence check. Events stuck in `processing` for over
    /// 30 minutes can be re-claimed.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();
        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = CONCAT('Recovered from stuck state at ', NOW()::TEXT)
            WHERE stripe_webhook_events.processing_result = 'processing'
              AND stripe_webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            let existing_status: Option<(String,)> = sqlx::query_as(
                "SELECT processing_result FROM stripe_webhook_events WHERE stripe_event_id = $1",
            )
            .bind(&event_id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();

            let reason = match existing_status {
                Some((status,)) if status == "success" => "already processed successfully",
                Some((status,)) if status == "processing" => {
                    "currently being processed by another worker"
                }
                Some(_) => "exists with another status",
                None => "unknown (race condition?)",
            };
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                reason = %reason,
                "duplicate webhook event skipped"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "processing Stripe webhook event"
        );

        let result = self.process_event_internal(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success".to_string(), None),
            Err(e) => ("error".to_string(), Some(e.to_string())),
        };
        if let Err(e) = sqlx::query(
            "UPDATE stripe_webhook_events \
             SET processing_result = $1, error_message = $2 \
             WHERE stripe_event_id = $3",
        )
        .bind(&processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await
        {
            // Without this record the event looks stuck in 'processing'
            // until the timeout recovery window opens.
            tracing::error!(
                event_id = %event_id,
                processing_result = %processing_result,
                error = %e,
                "failed to record webhook processing result"
            );
        }

        result
    }

    async fn process_event_internal(&self, event: &Event) -> BillingResult<()> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                self.handle_checkout_completed(event.clone()).await?;
            }
            EventType::CustomerSubscriptionCreated => {
                self.handle_subscription_created(event.clone()).await?;
            }
            EventType::CustomerSubscriptionUpdated => {
                self.handle_subscription_updated(event.clone()).await?;
            }
            EventType::CustomerSubscriptionDeleted => {
                self.handle_subscription_deleted(event.clone()).await?;
            }
            EventType::InvoicePaymentSucceeded => {
                self.handle_invoice_payment_succeeded(event.clone()).await?;
            }
            EventType::InvoicePaymentFailed => {
                self.handle_invoice_payment_failed(event.clone()).await?;
            }
            _ => {
                // Track which event types arrive without a handler
                tracing::info!(
                    event_type = %event.type_,
                    event_id = %event.id,
                    "unhandled Stripe event type"
                );
            }
        }
        Ok(())
    }

    /// Checkout completed is the first event that ties a user to their
    /// Stripe customer, so the customer id is persisted here before the
    /// subscription is applied.
    async fn handle_checkout_completed(&self, event: Event) -> BillingResult<()> {
        let session = match event.data.object {
            EventObject::CheckoutSession(session) => session,
            _ => {
                return Err(BillingError::WebhookEventNotSupported(
                    "expected CheckoutSession".to_string(),
                ))
            }
        };

        let user_id = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("userId"))
            .and_then(|id| Uuid::parse_str(id).ok())
            .or_else(|| {
                session
                    .client_reference_id
                    .as_deref()
                    .and_then(|id| Uuid::parse_str(id).ok())
            });
        let Some(user_id) = user_id else {
            tracing::warn!(
                session_id = %session.id,
                "checkout session without a userId, ignoring"
            );
            return Ok(());
        };
        let user = User::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;

        if let Some(customer) = session.customer.as_ref() {
            let customer_id = expandable_id(customer);
            User::set_stripe_customer_id(&self.pool, user.id, &customer_id).await?;
        }

        if let Some(subscription) = session.subscription {
            let parsed_sub_id = subscription.id().parse().map_err(|_| {
                BillingError::Internal(format!("invalid subscription id {}", subscription.id()))
            })?;
            let subscription =
                Subscription::retrieve(self.stripe.inner(), &parsed_sub_id, &[]).await?;
            self.subscriptions
                .apply_subscription(&user, &subscription)
                .await?;
            tracing::info!(
                user_id = %user.id,
                subscription_id = %subscription.id,
                "checkout completed, subscription applied"
            );
        }
        Ok(())
    }

    async fn handle_subscription_created(&self, event: Event) -> BillingResult<()> {
        let subscription = extract_subscription(event)?;
        let Some((user, path)) = resolve_user_for_subscription(&self.pool, &subscription).await?
        else {
            return Ok(());
        };

        if created_event_is_redundant(
            user.status(),
            user.stripe_subscription_id.as_deref(),
            subscription.id.as_str(),
        ) {
            tracing::info!(
                user_id = %user.id,
                subscription_id = %subscription.id,
                "subscription.created is redundant, skipping"
            );
            return Ok(());
        }

        self.subscriptions
            .apply_subscription(&user, &subscription)
            .await?;
        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            resolved_via = path.as_str(),
            "subscription created"
        );
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: Event) -> BillingResult<()> {
        let subscription = extract_subscription(event)?;
        let Some((user, path)) = resolve_user_for_subscription(&self.pool, &subscription).await?
        else {
            return Ok(());
        };
        let status = self
            .subscriptions
            .apply_subscription(&user, &subscription)
            .await?;
        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            status = %status,
            resolved_via = path.as_str(),
            "subscription updated"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: Event) -> BillingResult<()> {
        let subscription = extract_subscription(event)?;
        let Some((user, _)) = resolve_user_for_subscription(&self.pool, &subscription).await?
        else {
            return Ok(());
        };
        self.subscriptions.clear_subscription(&user).await?;
        tracing::info!(
            user_id = %user.id,
            subscription_id = %subscription.id,
            "subscription deleted"
        );
        Ok(())
    }

    async fn handle_invoice_payment_succeeded(&self, event: Event) -> BillingResult<()> {
        let invoice = extract_invoice(event)?;
        let Some((user, _)) = resolve_user_for_invoice(&self.pool, &invoice).await? else {
            return Ok(());
        };
        let reactivated = self.subscriptions.handle_payment_succeeded(&user).await?;
        tracing::info!(
            user_id = %user.id,
            invoice_id = %invoice.id,
            reactivated = reactivated,
            "invoice payment succeeded"
        );
        Ok(())
    }

    async fn handle_invoice_payment_failed(&self, event: Event) -> BillingResult<()> {
        let invoice = extract_invoice(event)?;
        let Some((user, _)) = resolve_user_for_invoice(&self.pool, &invoice).await? else {
            return Ok(());
        };
        self.subscriptions.handle_payment_failed(&user).await?;
        tracing::warn!(
            user_id = %user.id,
            invoice_id = %invoice.id,
            amount_due = invoice.amount_due,
            "invoice payment failed"
        );
        Ok(())
    }
}

fn extract_subscription(event: Event) -> BillingResult<Subscription> {
    match event.data.object {
        EventObject::Subscription(subscription) => Ok(subscription),
        _ => Err(BillingError::WebhookEventNotSupported(
            "expected Subscription".to_string(),
        )),
    }
}

fn extract_invoice(event: Event) -> BillingResult<Invoice> {
    match event.data.object {
        EventObject::Invoice(invoice) => Ok(invoice),
        _ => Err(BillingError::WebhookEventNotSupported(
            "expected Invoice".to_string(),
        )),
    }
}
