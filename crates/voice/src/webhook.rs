//! VAPI webhook entry point
//!
//! Verification is a shared-secret comparison, not an HMAC: VAPI echoes
//! the configured secret back verbatim in a header. Everything after
//! verification is acknowledge-first — processing errors are logged and
//! the caller still returns success, because VAPI retries on failure and
//! a poisoned event would otherwise be redelivered forever.

use sqlx::PgPool;

use crate::error::VoiceResult;
use crate::event::{VapiEnvelope, VapiEventKind};
use crate::reconciler::CallReconciler;
use crate::resolver::resolve_active_captain;
use crate::sms::SmsNotifier;

/// Outcome reported back in the HTTP response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    Ignored,
    /// Valid event, but no active captain matched the assistant
    Unattributed,
}

impl WebhookOutcome {
    pub fn message(self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "event processed",
            WebhookOutcome::Ignored => "event type ignored",
            WebhookOutcome::Unattributed => "no active captain for assistant",
        }
    }
}

pub struct VoiceWebhookHandler {
    pool: PgPool,
    reconciler: CallReconciler,
    webhook_secret: Option<String>,
    dev_mode: bool,
}

impl VoiceWebhookHandler {
    pub fn new(
        pool: PgPool,
        notifier: Option<SmsNotifier>,
        webhook_secret: Option<String>,
        dev_mode: bool,
    ) -> Self {
        let reconciler = CallReconciler::new(pool.clone(), notifier);
        Self {
            pool,
            reconciler,
            webhook_secret,
            dev_mode,
        }
    }

    /// Check the `x-vapi-secret` header. Returns false only when a secret
    /// is configured and the header does not match; an unconfigured secret
    /// accepts with a warning so a fresh deploy is not silently deaf.
    pub fn verify_secret(&self, header_secret: Option<&str>) -> bool {
        if self.dev_mode {
            return true;
        }
        match self.webhook_secret.as_deref() {
            None => {
                tracing::warn!("VAPI_WEBHOOK_SECRET not configured, accepting unverified webhook");
                true
            }
            Some(expected) => header_secret == Some(expected),
        }
    }

    /// Parse, classify, attribute, and reconcile one webhook delivery.
    pub async fn handle(&self, body: &[u8]) -> VoiceResult<WebhookOutcome> {
        let envelope: VapiEnvelope = match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                // Unparseable payloads are acknowledged like unknown types
                tracing::warn!(error = %error, "unparseable webhook payload");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let kind = envelope.kind();
        match kind {
            VapiEventKind::Ignored => {
                tracing::debug!(event_type = %envelope.raw_type(), "ignoring event");
                return Ok(WebhookOutcome::Ignored);
            }
            VapiEventKind::SpeechUpdate => {
                // High-volume and carries nothing we store
                return Ok(WebhookOutcome::Ignored);
            }
            VapiEventKind::AssistantCreated => {
                tracing::info!(
                    assistant_id = %envelope
                        .assistant
                        .as_ref()
                        .and_then(|a| a.id.as_deref())
                        .unwrap_or("<none>"),
                    "assistant created"
                );
                return Ok(WebhookOutcome::Processed);
            }
            _ => {}
        }

        let Some(assistant_id) = envelope.assistant_id() else {
            tracing::warn!(event_type = %envelope.raw_type(), "event without an assistant id");
            return Ok(WebhookOutcome::Unattributed);
        };
        let Some(captain) = resolve_active_captain(&self.pool, assistant_id).await? else {
            return Ok(WebhookOutcome::Unattributed);
        };

        match kind {
            VapiEventKind::CallStarted => {
                self.reconciler.handle_call_started(&captain, &envelope).await?
            }
            VapiEventKind::CallEnded => {
                self.reconciler.handle_call_ended(&captain, &envelope).await?
            }
            VapiEventKind::StatusUpdate => {
                self.reconciler.handle_status_update(&captain, &envelope).await?
            }
            VapiEventKind::ToolCalls => {
                self.reconciler.handle_tool_calls(&captain, &envelope).await?
            }
            VapiEventKind::FunctionCall => {
                self.reconciler.handle_function_call(&captain, &envelope).await?
            }
            VapiEventKind::Transcript => {
                self.reconciler.handle_transcript(&captain, &envelope).await?
            }
            VapiEventKind::AssistantCreated
            | VapiEventKind::SpeechUpdate
            | VapiEventKind::Ignored => {}
        }
        Ok(WebhookOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(secret: Option<&str>, dev_mode: bool) -> VoiceWebhookHandler {
        let pool = PgPool::connect_lazy("postgres://localhost/none")
            .unwrap();
        VoiceWebhookHandler::new(pool, None, secret.map(String::from), dev_mode)
    }

    #[tokio::test]
    async fn matching_secret_is_accepted() {
        let h = handler(Some("s3cret"), false);
        assert!(h.verify_secret(Some("s3cret")));
    }

    #[tokio::test]
    async fn wrong_or_missing_secret_is_rejected() {
        let h = handler(Some("s3cret"), false);
        assert!(!h.verify_secret(Some("nope")));
        assert!(!h.verify_secret(None));
    }

    #[tokio::test]
    async fn unconfigured_secret_accepts_with_warning() {
        let h = handler(None, false);
        assert!(h.verify_secret(None));
        assert!(h.verify_secret(Some("anything")));
    }

    #[tokio::test]
    async fn dev_mode_skips_verification() {
        let h = handler(Some("s3cret"), true);
        assert!(h.verify_secret(Some("wrong")));
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged_without_db_access() {
        // connect_lazy never dials, so reaching the DB would error here
        let h = handler(None, true);
        let outcome = h.handle(br#"{"type": "conversation-update"}"#).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = h.handle(b"not json at all").await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }
}
