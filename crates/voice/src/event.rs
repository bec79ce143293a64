//! VAPI webhook envelope types and event classification
//!
//! VAPI uses two discriminator conventions at once: older events carry a
//! top-level `type`, newer ones only a nested `message.type`. Classification
//! follows the top-level field first and falls back to the message type;
//! anything unrecognized is `Ignored` — providers add event types over
//! time and an unknown kind is acknowledged, never an error.

use serde::Deserialize;
use time::OffsetDateTime;

use charterline_shared::models::CustomerPatch;
use charterline_shared::Urgency;

use crate::error::{VoiceError, VoiceResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapiEnvelope {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub message: Option<VapiMessage>,
    pub call: Option<VapiCall>,
    pub assistant: Option<VapiAssistant>,
    pub function_call: Option<VapiFunctionCall>,
    pub transcript: Option<TranscriptPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapiMessage {
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub status: Option<String>,
    pub ended_reason: Option<String>,
    pub call: Option<VapiCall>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub artifact: Option<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapiCall {
    pub id: Option<String>,
    pub assistant_id: Option<String>,
    pub customer: Option<VapiCustomer>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub cost: Option<f64>,
    pub recording_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VapiCustomer {
    pub number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VapiAssistant {
    pub id: Option<String>,
}

/// Legacy `function-call` event payload (predates tool-calls messages)
#[derive(Debug, Clone, Deserialize)]
pub struct VapiFunctionCall {
    pub name: Option<String>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptPayload {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: Option<String>,
    pub function: Option<ToolFunction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolFunction {
    pub name: Option<String>,
    /// JSON string or object, depending on the model provider
    pub arguments: Option<serde_json::Value>,
    pub parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub messages: Option<Vec<ArtifactMessage>>,
    #[serde(rename = "messagesOpenAIFormatted")]
    pub messages_openai_formatted: Option<Vec<OpenAiMessage>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMessage {
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiMessage {
    pub role: Option<String>,
    pub content: Option<serde_json::Value>,
}

/// Closed classification of an inbound VAPI webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VapiEventKind {
    AssistantCreated,
    CallStarted,
    CallEnded,
    FunctionCall,
    Transcript,
    SpeechUpdate,
    ToolCalls,
    StatusUpdate,
    /// Unrecognized type — acknowledged and dropped
    Ignored,
}

impl VapiEnvelope {
    /// Classify the envelope. First match wins: the top-level `type`
    /// (with the `message`/`tool-calls` special case), then `message.type`.
    pub fn kind(&self) -> VapiEventKind {
        if let Some(event_type) = self.event_type.as_deref() {
            return match event_type {
                "assistant-created" => VapiEventKind::AssistantCreated,
                "call-started" => VapiEventKind::CallStarted,
                "call-ended" => VapiEventKind::CallEnded,
                "function-call" => VapiEventKind::FunctionCall,
                "transcript" => VapiEventKind::Transcript,
                "speech-update" => VapiEventKind::SpeechUpdate,
                "message" => match self.message_type() {
                    Some("tool-calls") => VapiEventKind::ToolCalls,
                    _ => VapiEventKind::Ignored,
                },
                _ => VapiEventKind::Ignored,
            };
        }
        match self.message_type() {
            Some("status-update") => VapiEventKind::StatusUpdate,
            Some("tool-calls") => VapiEventKind::ToolCalls,
            _ => VapiEventKind::Ignored,
        }
    }

    fn message_type(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.message_type.as_deref())
    }

    /// The raw discriminator for logging dropped events
    pub fn raw_type(&self) -> &str {
        self.event_type
            .as_deref()
            .or_else(|| self.message_type())
            .unwrap_or("<none>")
    }

    /// Call id from the top-level call, falling back to the message's
    /// nested call (status-update payloads nest it there).
    pub fn call_id(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.call.as_ref())
            .and_then(|c| c.id.as_deref())
            .or_else(|| self.call.as_ref().and_then(|c| c.id.as_deref()))
    }

    /// Assistant id, same fallback order as [`call_id`](Self::call_id).
    pub fn assistant_id(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.call.as_ref())
            .and_then(|c| c.assistant_id.as_deref())
            .or_else(|| self.call.as_ref().and_then(|c| c.assistant_id.as_deref()))
    }
}

/// Arguments of a `collect_customer_info` tool call.
///
/// Required by the tool contract: customerName, phoneNumber,
/// callbackRequested. Everything else is optional and may arrive empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_dates: Vec<String>,
    pub party_size: Option<i32>,
    pub trip_type: Option<String>,
    pub experience: Option<String>,
    pub special_requests: Option<String>,
    pub budget: Option<String>,
    pub callback_requested: Option<bool>,
    pub urgency: Option<String>,
    pub lead_source: Option<String>,
}

impl CustomerInfo {
    /// Parse tool-call arguments, which arrive either as a JSON string or
    /// an already-decoded object (`arguments` preferred, `parameters` as
    /// the legacy fallback).
    pub fn from_tool_function(function: &ToolFunction) -> VoiceResult<Self> {
        let raw = function
            .arguments
            .as_ref()
            .or(function.parameters.as_ref())
            .ok_or_else(|| VoiceError::ToolArguments("no arguments present".into()))?;

        match raw {
            serde_json::Value::String(s) => serde_json::from_str(s)
                .map_err(|e| VoiceError::ToolArguments(format!("{e} in {s:?}"))),
            other => serde_json::from_value(other.clone())
                .map_err(|e| VoiceError::ToolArguments(e.to_string())),
        }
    }

    /// Parse a legacy `function-call` event's parameters object.
    pub fn from_parameters(parameters: &serde_json::Value) -> VoiceResult<Self> {
        serde_json::from_value(parameters.clone())
            .map_err(|e| VoiceError::ToolArguments(e.to_string()))
    }

    /// Sanitize into a merge patch: empty strings, zero party size, and
    /// empty date lists become `None` so they never erase stored data.
    /// `callback_requested` follows presence, not truthiness.
    pub fn into_patch(self) -> CustomerPatch {
        CustomerPatch {
            customer_name: non_empty(self.customer_name),
            phone_number: non_empty(self.phone_number),
            email: non_empty(self.email),
            preferred_dates: if self.preferred_dates.is_empty() {
                None
            } else {
                Some(self.preferred_dates)
            },
            party_size: self.party_size.filter(|n| *n > 0),
            trip_type: non_empty(self.trip_type),
            experience: non_empty(self.experience),
            special_requests: non_empty(self.special_requests),
            budget: non_empty(self.budget),
            callback_requested: self.callback_requested,
            // Models occasionally invent urgency values; only the three
            // the tool schema declares are stored.
            urgency: non_empty(self.urgency)
                .map(|u| u.to_lowercase())
                .filter(|u| Urgency::parse(u).is_some()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Render a conversation transcript from the artifact's OpenAI-formatted
/// messages. Returns None when there is nothing to render.
pub fn extract_transcript(artifact: &Artifact) -> Option<String> {
    let messages = artifact.messages_openai_formatted.as_ref()?;
    let lines: Vec<String> = messages
        .iter()
        .filter_map(|msg| {
            let role = msg.role.as_deref()?;
            let speaker = match role {
                "user" => "Customer",
                "assistant" => "Assistant",
                _ => return None,
            };
            let content = msg.content.as_ref()?.as_str()?;
            Some(format!("{speaker}: {content}"))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n\n"))
    }
}

/// Whole seconds between call start and end, floored, never negative.
pub fn call_duration_secs(started_at: OffsetDateTime, ended_at: OffsetDateTime) -> i32 {
    let secs = (ended_at - started_at).whole_seconds();
    secs.clamp(0, i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn parse(json: &str) -> VapiEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn top_level_type_wins() {
        let env = parse(r#"{"type": "call-started", "call": {"id": "c1"}}"#);
        assert_eq!(env.kind(), VapiEventKind::CallStarted);
        let env = parse(r#"{"type": "call-ended", "call": {"id": "c1"}}"#);
        assert_eq!(env.kind(), VapiEventKind::CallEnded);
    }

    #[test]
    fn message_event_special_cases_tool_calls() {
        let env = parse(r#"{"type": "message", "message": {"type": "tool-calls"}}"#);
        assert_eq!(env.kind(), VapiEventKind::ToolCalls);
        let env = parse(r#"{"type": "message", "message": {"type": "transcript"}}"#);
        assert_eq!(env.kind(), VapiEventKind::Ignored);
    }

    #[test]
    fn message_type_fallback_without_top_level_type() {
        let env = parse(r#"{"message": {"type": "status-update", "status": "ended"}}"#);
        assert_eq!(env.kind(), VapiEventKind::StatusUpdate);
        let env = parse(r#"{"message": {"type": "tool-calls"}}"#);
        assert_eq!(env.kind(), VapiEventKind::ToolCalls);
    }

    #[test]
    fn unknown_types_are_ignored_not_errors() {
        let env = parse(r#"{"type": "conversation-update"}"#);
        assert_eq!(env.kind(), VapiEventKind::Ignored);
        assert_eq!(env.raw_type(), "conversation-update");

        let env = parse(r#"{"message": {"type": "speech-update"}}"#);
        assert_eq!(env.kind(), VapiEventKind::Ignored);

        let env = parse("{}");
        assert_eq!(env.kind(), VapiEventKind::Ignored);
        assert_eq!(env.raw_type(), "<none>");
    }

    #[test]
    fn call_ids_prefer_the_message_nested_call() {
        let env = parse(
            r#"{
                "message": {
                    "type": "status-update",
                    "call": {"id": "nested", "assistantId": "a-nested"}
                },
                "call": {"id": "outer", "assistantId": "a-outer"}
            }"#,
        );
        assert_eq!(env.call_id(), Some("nested"));
        assert_eq!(env.assistant_id(), Some("a-nested"));

        let env = parse(r#"{"call": {"id": "outer", "assistantId": "a-outer"}}"#);
        assert_eq!(env.call_id(), Some("outer"));
        assert_eq!(env.assistant_id(), Some("a-outer"));
    }

    #[test]
    fn tool_arguments_parse_from_string_or_object() {
        let as_string = ToolFunction {
            name: Some("collect_customer_info".into()),
            arguments: Some(serde_json::Value::String(
                r#"{"customerName": "Jane", "phoneNumber": "+15550001111", "callbackRequested": true}"#
                    .into(),
            )),
            parameters: None,
        };
        let info = CustomerInfo::from_tool_function(&as_string).unwrap();
        assert_eq!(info.customer_name.as_deref(), Some("Jane"));
        assert_eq!(info.callback_requested, Some(true));

        let as_object = ToolFunction {
            name: Some("collect_customer_info".into()),
            arguments: Some(serde_json::json!({
                "customerName": "Bob",
                "phoneNumber": "+15550002222",
                "partySize": 4,
                "callbackRequested": false
            })),
            parameters: None,
        };
        let info = CustomerInfo::from_tool_function(&as_object).unwrap();
        assert_eq!(info.party_size, Some(4));
    }

    #[test]
    fn malformed_arguments_are_an_error() {
        let bad = ToolFunction {
            name: Some("collect_customer_info".into()),
            arguments: Some(serde_json::Value::String("{not json".into())),
            parameters: None,
        };
        assert!(CustomerInfo::from_tool_function(&bad).is_err());

        let none = ToolFunction {
            name: Some("collect_customer_info".into()),
            arguments: None,
            parameters: None,
        };
        assert!(CustomerInfo::from_tool_function(&none).is_err());
    }

    #[test]
    fn patch_drops_empty_values_but_keeps_presence_of_callback() {
        let info = CustomerInfo {
            customer_name: Some("".into()),
            phone_number: Some("+15550001111".into()),
            email: Some("  ".into()),
            preferred_dates: vec![],
            party_size: Some(0),
            trip_type: Some("offshore".into()),
            callback_requested: Some(false),
            ..Default::default()
        };
        let patch = info.into_patch();
        assert_eq!(patch.customer_name, None);
        assert_eq!(patch.email, None);
        assert_eq!(patch.preferred_dates, None);
        assert_eq!(patch.party_size, None);
        assert_eq!(patch.trip_type.as_deref(), Some("offshore"));
        // present-but-false still overwrites; absence would not
        assert_eq!(patch.callback_requested, Some(false));
    }

    #[test]
    fn patch_normalizes_urgency_and_drops_invented_values() {
        let info = CustomerInfo {
            urgency: Some("HIGH".into()),
            ..Default::default()
        };
        assert_eq!(info.into_patch().urgency.as_deref(), Some("high"));

        let info = CustomerInfo {
            urgency: Some("extremely urgent".into()),
            ..Default::default()
        };
        assert_eq!(info.into_patch().urgency, None);
    }

    #[test]
    fn transcript_renders_user_and_assistant_turns_only() {
        let artifact: Artifact = serde_json::from_value(serde_json::json!({
            "messagesOpenAIFormatted": [
                {"role": "system", "content": "You are an assistant"},
                {"role": "assistant", "content": "Hey, thanks for calling."},
                {"role": "user", "content": "I want to book a trip."},
                {"role": "tool", "content": "{}"}
            ]
        }))
        .unwrap();
        let transcript = extract_transcript(&artifact).unwrap();
        assert_eq!(
            transcript,
            "Assistant: Hey, thanks for calling.\n\nCustomer: I want to book a trip."
        );
    }

    #[test]
    fn transcript_is_none_when_nothing_renderable() {
        let artifact: Artifact =
            serde_json::from_value(serde_json::json!({"messages": []})).unwrap();
        assert_eq!(extract_transcript(&artifact), None);
    }

    #[test]
    fn duration_is_floored_whole_seconds() {
        let started = datetime!(2025-01-10 12:00:00 UTC);
        let ended = datetime!(2025-01-10 12:03:05.900 UTC);
        assert_eq!(call_duration_secs(started, ended), 185);
    }

    #[test]
    fn duration_never_goes_negative() {
        let started = datetime!(2025-01-10 12:00:00 UTC);
        let ended = datetime!(2025-01-10 11:59:00 UTC);
        assert_eq!(call_duration_secs(started, ended), 0);
    }

    #[test]
    fn call_timestamps_parse_rfc3339() {
        let env = parse(
            r#"{"type": "call-ended",
                "call": {"id": "c1", "startedAt": "2025-01-10T12:00:00Z",
                         "endedAt": "2025-01-10T12:03:05Z", "cost": 0.42}}"#,
        );
        let call = env.call.unwrap();
        assert!(call.started_at.is_some());
        assert_eq!(call.cost, Some(0.42));
    }
}
