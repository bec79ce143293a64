// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Billing
//!
//! Boundary conditions in webhook signature verification and the
//! subscription reconciliation guards.

mod webhook_signature_tests {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use sqlx::PgPool;

    use crate::client::{StripeClient, StripeConfig};
    use crate::error::BillingError;
    use crate::webhooks::WebhookHandler;

    const TEST_SECRET: &str = "whsec_test_secret_key";

    fn handler() -> WebhookHandler {
        let config = StripeConfig {
            secret_key: "sk_test_123".into(),
            webhook_secret: TEST_SECRET.into(),
            price_id: "price_test_1".into(),
            app_url: "http://localhost:3000".into(),
        };
        let pool = PgPool::connect_lazy("postgres://localhost/none").unwrap();
        WebhookHandler::new(StripeClient::new(config), pool)
    }

    fn sign(payload: &str, timestamp: i64) -> String {
        let key = TEST_SECRET.strip_prefix("whsec_").unwrap();
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    fn event_payload() -> String {
        serde_json::json!({
            "id": "evt_test_1",
            "object": "event",
            "api_version": "2024-06-20",
            "created": 1736510400,
            "data": {
                "object": {"id": "in_test_1", "object": "invoice"}
            },
            "livemode": false,
            "pending_webhooks": 1,
            "request": null,
            "type": "invoice.payment_succeeded"
        })
        .to_string()
    }

    // =========================================================================
    // A correctly signed payload with a fresh timestamp verifies and parses
    // =========================================================================
    #[tokio::test]
    async fn valid_signature_verifies() {
        let payload = event_payload();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let event = handler().verify_event(&payload, &sign(&payload, now)).unwrap();
        assert_eq!(event.id.as_str(), "evt_test_1");
        assert_eq!(event.type_, stripe::EventType::InvoicePaymentSucceeded);
    }

    // =========================================================================
    // A tampered payload fails both the library check and the manual one
    // =========================================================================
    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let payload = event_payload();
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let header = sign(&payload, now);
        let tampered = payload.replace("invoice.payment_succeeded", "invoice.payment_failed");
        let err = handler().verify_event(&tampered, &header).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // A stale timestamp outside the 5 minute window is a replay, rejected
    // even when the signature itself is valid
    // =========================================================================
    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let payload = event_payload();
        let stale = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
            - 600;
        let err = handler()
            .verify_event(&payload, &sign(&payload, stale))
            .unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    // =========================================================================
    // Garbage signature headers never panic, only error
    // =========================================================================
    #[tokio::test]
    async fn malformed_headers_are_rejected() {
        let payload = event_payload();
        for header in ["", "t=abc,v1=", "v1=deadbeef", "t=123"] {
            let err = handler().verify_event(&payload, header).unwrap_err();
            assert!(matches!(err, BillingError::WebhookSignatureInvalid));
        }
    }
}

mod reconciliation_guard_tests {
    use charterline_shared::SubscriptionStatus;

    use crate::subscriptions::{created_event_is_redundant, payment_can_reactivate};

    // =========================================================================
    // checkout.session.completed and customer.subscription.created race:
    // whichever lands second must not clobber the applied state
    // =========================================================================
    #[test]
    fn duplicate_created_after_checkout_is_skipped() {
        // checkout handler already stored the subscription as active
        assert!(created_event_is_redundant(
            SubscriptionStatus::Active,
            Some("sub_123"),
            "sub_123"
        ));
    }

    // =========================================================================
    // A user resubscribing after cancellation gets the new subscription
    // applied even though an old subscription id is still on record
    // =========================================================================
    #[test]
    fn resubscription_applies_over_canceled_state() {
        assert!(!created_event_is_redundant(
            SubscriptionStatus::Canceled,
            Some("sub_old"),
            "sub_new"
        ));
    }

    // =========================================================================
    // invoice.payment_succeeded for a normal renewal must not touch an
    // already-active user; reactivation is only for lapsed states
    // =========================================================================
    #[test]
    fn renewal_payment_does_not_rewrite_active_state() {
        assert!(!payment_can_reactivate(SubscriptionStatus::Active));
        assert!(payment_can_reactivate(SubscriptionStatus::PastDue));
    }
}
