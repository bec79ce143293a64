//! Call and customer state reconciliation
//!
//! Each handler maps one webhook event onto the stored Call/Customer
//! state. Handlers are written for at-least-once delivery in any order:
//! creation paths upsert, completion is idempotent, and the SMS send is
//! gated by an atomic claim so replays never notify twice.

use charterline_shared::models::{Call, CallCompletion, Captain, Customer, CustomerPatch, NewCall};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::VoiceResult;
use crate::event::{
    call_duration_secs, extract_transcript, CustomerInfo, ToolCall, VapiEnvelope,
};
use crate::sms::{SmsDelivery, SmsNotifier};

const COLLECT_CUSTOMER_INFO: &str = "collect_customer_info";

pub struct CallReconciler {
    pool: PgPool,
    notifier: Option<SmsNotifier>,
}

impl CallReconciler {
    pub fn new(pool: PgPool, notifier: Option<SmsNotifier>) -> Self {
        Self { pool, notifier }
    }

    pub async fn handle_call_started(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let Some(call_id) = envelope.call_id() else {
            tracing::warn!(captain_id = %captain.id, "call-started without a call id");
            return Ok(());
        };
        let call = envelope.message.as_ref().and_then(|m| m.call.as_ref())
            .or(envelope.call.as_ref());
        let customer_phone = call
            .and_then(|c| c.customer.as_ref())
            .and_then(|cu| cu.number.as_deref())
            .unwrap_or("unknown");
        let started_at = call
            .and_then(|c| c.started_at)
            .unwrap_or_else(OffsetDateTime::now_utc);

        let inserted = Call::insert_started(
            &self.pool,
            NewCall {
                call_id,
                captain_id: captain.id,
                assistant_id: envelope.assistant_id().unwrap_or(""),
                customer_phone,
                started_at,
            },
        )
        .await?;
        if inserted {
            tracing::info!(
                captain_id = %captain.id,
                call_id = %call_id,
                customer_phone = %customer_phone,
                "call started"
            );
        } else {
            tracing::debug!(call_id = %call_id, "duplicate call-started ignored");
        }
        Ok(())
    }

    pub async fn handle_call_ended(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let Some(call_id) = envelope.call_id() else {
            tracing::warn!(captain_id = %captain.id, "call-ended without a call id");
            return Ok(());
        };
        self.complete_call(captain, envelope, call_id).await?;
        self.process_artifact(captain, envelope, call_id).await;
        Ok(())
    }

    /// `status-update` carries the call lifecycle for newer VAPI accounts.
    /// Only the terminal status does any work; interim states are
    /// acknowledged and dropped.
    pub async fn handle_status_update(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let status = envelope
            .message
            .as_ref()
            .and_then(|m| m.status.as_deref())
            .unwrap_or("");
        if status != "ended" {
            tracing::debug!(status = %status, "ignoring non-terminal status update");
            return Ok(());
        }
        let Some(call_id) = envelope.call_id() else {
            tracing::warn!(captain_id = %captain.id, "status update without a call id");
            return Ok(());
        };
        self.complete_call(captain, envelope, call_id).await?;
        self.process_artifact(captain, envelope, call_id).await;
        Ok(())
    }

    /// Mark the call completed, recomputing duration from the stored
    /// start time rather than trusting the payload's own arithmetic.
    async fn complete_call(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
        call_id: &str,
    ) -> VoiceResult<()> {
        let payload_call = envelope
            .message
            .as_ref()
            .and_then(|m| m.call.as_ref())
            .or(envelope.call.as_ref());
        let ended_at = payload_call
            .and_then(|c| c.ended_at)
            .unwrap_or_else(OffsetDateTime::now_utc);

        let stored = Call::find_by_call_id(&self.pool, call_id, captain.id).await?;
        let started_at = stored
            .as_ref()
            .map(|c| c.started_at)
            .or_else(|| payload_call.and_then(|c| c.started_at))
            .unwrap_or(ended_at);

        if stored.is_none() {
            // call-started never arrived; backfill so completion has a row
            let customer_phone = payload_call
                .and_then(|c| c.customer.as_ref())
                .and_then(|cu| cu.number.as_deref())
                .unwrap_or("unknown");
            Call::insert_started(
                &self.pool,
                NewCall {
                    call_id,
                    captain_id: captain.id,
                    assistant_id: envelope.assistant_id().unwrap_or(""),
                    customer_phone,
                    started_at,
                },
            )
            .await?;
        }

        let completion = CallCompletion {
            ended_at,
            duration_secs: call_duration_secs(started_at, ended_at),
            cost: payload_call.and_then(|c| c.cost),
            recording_url: payload_call.and_then(|c| c.recording_url.as_deref()),
            ended_reason: envelope
                .message
                .as_ref()
                .and_then(|m| m.ended_reason.as_deref()),
        };
        let updated = Call::complete(&self.pool, call_id, captain.id, completion).await?;
        tracing::info!(
            captain_id = %captain.id,
            call_id = %call_id,
            updated = updated,
            "call completed"
        );
        Ok(())
    }

    /// Harvest the end-of-call artifact: render the transcript and replay
    /// any tool calls that only appear in the conversation history.
    /// Failures here are logged, never propagated; the call completion
    /// above already committed.
    async fn process_artifact(&self, captain: &Captain, envelope: &VapiEnvelope, call_id: &str) {
        let Some(artifact) = envelope.message.as_ref().and_then(|m| m.artifact.as_ref()) else {
            return;
        };

        if let Some(transcript) = extract_transcript(artifact) {
            if let Err(error) =
                Call::set_transcript(&self.pool, call_id, captain.id, &transcript).await
            {
                tracing::error!(call_id = %call_id, error = %error, "failed to store transcript");
            }
        }

        let artifact_tool_calls: Vec<&ToolCall> = artifact
            .messages
            .iter()
            .flatten()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .collect();
        if !artifact_tool_calls.is_empty() {
            let transcript = extract_transcript(artifact);
            if let Err(error) = self
                .apply_tool_calls(captain, envelope, call_id, &artifact_tool_calls, transcript.as_deref())
                .await
            {
                tracing::error!(call_id = %call_id, error = %error, "artifact tool-call replay failed");
            }
        }
    }

    /// `tool-calls` message: the assistant invoked `collect_customer_info`
    /// mid-call.
    pub async fn handle_tool_calls(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let Some(call_id) = envelope.call_id() else {
            tracing::warn!(captain_id = %captain.id, "tool-calls without a call id");
            return Ok(());
        };
        let tool_calls: Vec<&ToolCall> = envelope
            .message
            .as_ref()
            .and_then(|m| m.tool_calls.as_ref())
            .map(|calls| calls.iter().collect())
            .unwrap_or_default();
        let transcript = envelope
            .message
            .as_ref()
            .and_then(|m| m.artifact.as_ref())
            .and_then(extract_transcript);
        self.apply_tool_calls(captain, envelope, call_id, &tool_calls, transcript.as_deref())
            .await
    }

    /// Legacy `function-call` event shape (parameters instead of
    /// tool-call arguments).
    pub async fn handle_function_call(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let Some(function_call) = envelope.function_call.as_ref() else {
            return Ok(());
        };
        if function_call.name.as_deref() != Some(COLLECT_CUSTOMER_INFO) {
            tracing::debug!(
                function = %function_call.name.as_deref().unwrap_or("<none>"),
                "ignoring unrecognized function call"
            );
            return Ok(());
        }
        let Some(call_id) = envelope.call_id() else {
            tracing::warn!(captain_id = %captain.id, "function-call without a call id");
            return Ok(());
        };
        let Some(parameters) = function_call.parameters.as_ref() else {
            tracing::warn!(call_id = %call_id, "function-call without parameters");
            return Ok(());
        };
        match CustomerInfo::from_parameters(parameters) {
            Ok(info) => {
                self.apply_customer_info(captain, envelope, call_id, info, None)
                    .await
            }
            Err(error) => {
                tracing::error!(call_id = %call_id, error = %error, "unparseable function call");
                Ok(())
            }
        }
    }

    /// Store a live partial transcript when the call is already known.
    pub async fn handle_transcript(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
    ) -> VoiceResult<()> {
        let (Some(call_id), Some(text)) = (
            envelope.call_id(),
            envelope
                .transcript
                .as_ref()
                .and_then(|t| t.text.as_deref())
                .filter(|t| !t.trim().is_empty()),
        ) else {
            return Ok(());
        };
        Call::set_transcript(&self.pool, call_id, captain.id, text).await?;
        Ok(())
    }

    /// Process every `collect_customer_info` invocation in order. One bad
    /// tool call is skipped with a log line; the rest still apply.
    async fn apply_tool_calls(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
        call_id: &str,
        tool_calls: &[&ToolCall],
        transcript: Option<&str>,
    ) -> VoiceResult<()> {
        for tool_call in tool_calls {
            let Some(function) = tool_call.function.as_ref() else {
                continue;
            };
            if function.name.as_deref() != Some(COLLECT_CUSTOMER_INFO) {
                continue;
            }
            match CustomerInfo::from_tool_function(function) {
                Ok(info) => {
                    self.apply_customer_info(captain, envelope, call_id, info, transcript)
                        .await?;
                }
                Err(error) => {
                    tracing::error!(
                        call_id = %call_id,
                        tool_call_id = %tool_call.id.as_deref().unwrap_or("<none>"),
                        error = %error,
                        "skipping unparseable tool call"
                    );
                }
            }
        }
        Ok(())
    }

    /// One collected-info payload: attach to the call, merge into the
    /// customer profile, then attempt the one SMS this call is allowed.
    async fn apply_customer_info(
        &self,
        captain: &Captain,
        envelope: &VapiEnvelope,
        call_id: &str,
        info: CustomerInfo,
        transcript: Option<&str>,
    ) -> VoiceResult<()> {
        let mut patch = info.into_patch();
        // Caller id from the telephony leg beats an absent tool argument.
        if patch.phone_number.is_none() {
            patch.phone_number = envelope
                .message
                .as_ref()
                .and_then(|m| m.call.as_ref())
                .or(envelope.call.as_ref())
                .and_then(|c| c.customer.as_ref())
                .and_then(|cu| cu.number.clone());
        }

        Call::apply_customer_data(
            &self.pool,
            call_id,
            captain.id,
            envelope.assistant_id().unwrap_or(""),
            &patch,
            transcript,
        )
        .await?;

        match patch.phone_number.as_deref() {
            Some(phone) => {
                let total_calls =
                    Customer::upsert_from_patch(&self.pool, captain.id, phone, &patch).await?;
                tracing::info!(
                    captain_id = %captain.id,
                    call_id = %call_id,
                    customer_phone = %phone,
                    total_calls = total_calls,
                    "customer profile reconciled"
                );
            }
            None => {
                tracing::warn!(
                    call_id = %call_id,
                    "no phone number collected, skipping customer profile"
                );
            }
        }

        self.send_inquiry_sms(captain, call_id, &patch).await;
        Ok(())
    }

    /// At most one notification per call. The claim is taken before the
    /// send and deliberately stands even if Twilio fails — a lost SMS is
    /// better than a captain paged twice for the same caller.
    async fn send_inquiry_sms(&self, captain: &Captain, call_id: &str, patch: &CustomerPatch) {
        let Some(notifier) = self.notifier.as_ref() else {
            tracing::debug!(call_id = %call_id, "sms notifier not configured");
            return;
        };
        if !captain.sms_opt_in {
            tracing::debug!(captain_id = %captain.id, "captain opted out of sms");
            return;
        }

        let claimed = match Call::claim_sms(&self.pool, call_id, captain.id).await {
            Ok(claimed) => claimed,
            Err(error) => {
                tracing::error!(call_id = %call_id, error = %error, "sms claim failed");
                return;
            }
        };
        if !claimed {
            tracing::debug!(call_id = %call_id, "sms already sent for this call");
            return;
        }

        match notifier.notify_inquiry(captain, patch).await {
            Ok(SmsDelivery::Sent { sid }) => {
                tracing::info!(call_id = %call_id, sms_sid = %sid, "inquiry sms sent");
            }
            Ok(SmsDelivery::Skipped(reason)) => {
                tracing::info!(call_id = %call_id, reason = ?reason, "inquiry sms skipped");
            }
            Err(error) => {
                tracing::error!(call_id = %call_id, error = %error, "inquiry sms failed");
            }
        }
    }
}

impl std::fmt::Debug for CallReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallReconciler")
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
