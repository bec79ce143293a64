//! Edge case tests for webhook payload handling
//!
//! Real payloads captured from provider deliveries are messier than the
//! documented shapes; these tests pin down the behaviors that bit us.

use crate::event::{extract_transcript, CustomerInfo, VapiEnvelope, VapiEventKind};

fn parse(json: serde_json::Value) -> VapiEnvelope {
    serde_json::from_value(json).unwrap()
}

// ============================================================
// EDGE CASE 1: Dual discriminator conventions in one stream
// Accounts migrated mid-stream deliver old-style top-level types and
// new-style message types interleaved. Both must classify.
// ============================================================
#[test]
fn edge_case_mixed_discriminator_stream() {
    let old_style = parse(serde_json::json!({
        "type": "call-started",
        "call": {"id": "call_a", "assistantId": "asst_1"}
    }));
    assert_eq!(old_style.kind(), VapiEventKind::CallStarted);

    let new_style = parse(serde_json::json!({
        "message": {
            "type": "status-update",
            "status": "ended",
            "call": {"id": "call_a", "assistantId": "asst_1"}
        }
    }));
    assert_eq!(new_style.kind(), VapiEventKind::StatusUpdate);

    // both shapes must resolve the same call and assistant
    assert_eq!(old_style.call_id(), new_style.call_id());
    assert_eq!(old_style.assistant_id(), new_style.assistant_id());
}

// ============================================================
// EDGE CASE 2: Full end-of-call report payload
// The terminal status-update carries the whole conversation artifact;
// transcript rendering and tool-call replay both read from it.
// ============================================================
#[test]
fn edge_case_end_of_call_report_artifact() {
    let envelope = parse(serde_json::json!({
        "message": {
            "type": "status-update",
            "status": "ended",
            "endedReason": "customer-ended-call",
            "call": {
                "id": "call_b",
                "assistantId": "asst_1",
                "customer": {"number": "+15550001111"},
                "startedAt": "2025-01-10T12:00:00Z",
                "endedAt": "2025-01-10T12:04:30Z",
                "cost": 0.37
            },
            "artifact": {
                "messages": [
                    {"toolCalls": [{
                        "id": "tc_1",
                        "function": {
                            "name": "collect_customer_info",
                            "arguments": "{\"customerName\": \"Jane\", \"phoneNumber\": \"+15550001111\", \"callbackRequested\": true}"
                        }
                    }]}
                ],
                "messagesOpenAIFormatted": [
                    {"role": "assistant", "content": "Thanks for calling Reel Deal!"},
                    {"role": "user", "content": "Do you run night trips?"}
                ]
            }
        }
    }));

    assert_eq!(envelope.kind(), VapiEventKind::StatusUpdate);
    let message = envelope.message.as_ref().unwrap();
    assert_eq!(message.ended_reason.as_deref(), Some("customer-ended-call"));

    let artifact = message.artifact.as_ref().unwrap();
    let transcript = extract_transcript(artifact).unwrap();
    assert!(transcript.starts_with("Assistant: Thanks for calling"));
    assert!(transcript.contains("Customer: Do you run night trips?"));

    let tool_call = &artifact.messages.as_ref().unwrap()[0]
        .tool_calls
        .as_ref()
        .unwrap()[0];
    let info = CustomerInfo::from_tool_function(tool_call.function.as_ref().unwrap()).unwrap();
    assert_eq!(info.customer_name.as_deref(), Some("Jane"));
}

// ============================================================
// EDGE CASE 3: One bad tool call among good ones
// A model occasionally emits truncated JSON arguments. The bad call
// fails to parse on its own; its neighbors parse fine.
// ============================================================
#[test]
fn edge_case_bad_tool_call_does_not_poison_neighbors() {
    let envelope = parse(serde_json::json!({
        "message": {
            "type": "tool-calls",
            "call": {"id": "call_c", "assistantId": "asst_1"},
            "toolCalls": [
                {"id": "tc_bad", "function": {
                    "name": "collect_customer_info",
                    "arguments": "{\"customerName\": \"Trunc"
                }},
                {"id": "tc_good", "function": {
                    "name": "collect_customer_info",
                    "arguments": {"customerName": "Bob", "phoneNumber": "+15550002222", "callbackRequested": false}
                }}
            ]
        }
    }));

    let tool_calls = envelope
        .message
        .as_ref()
        .unwrap()
        .tool_calls
        .as_ref()
        .unwrap();
    assert!(CustomerInfo::from_tool_function(tool_calls[0].function.as_ref().unwrap()).is_err());
    let good = CustomerInfo::from_tool_function(tool_calls[1].function.as_ref().unwrap()).unwrap();
    assert_eq!(good.customer_name.as_deref(), Some("Bob"));
}

// ============================================================
// EDGE CASE 4: Sparse re-collection must not erase earlier data
// A replayed or second tool call with mostly-empty fields becomes a
// patch of Nones, which the merge upsert COALESCEs away.
// ============================================================
#[test]
fn edge_case_sparse_recollection_patch() {
    let info: CustomerInfo = serde_json::from_value(serde_json::json!({
        "customerName": "",
        "phoneNumber": "+15550001111",
        "email": "",
        "preferredDates": [],
        "partySize": 0,
        "callbackRequested": true
    }))
    .unwrap();
    let patch = info.into_patch();

    assert_eq!(patch.customer_name, None);
    assert_eq!(patch.email, None);
    assert_eq!(patch.preferred_dates, None);
    assert_eq!(patch.party_size, None);
    // the two meaningful fields survive
    assert_eq!(patch.phone_number.as_deref(), Some("+15550001111"));
    assert_eq!(patch.callback_requested, Some(true));
}

// ============================================================
// EDGE CASE 5: Unknown tool names pass through classification
// A `tool-calls` message whose functions are all foreign must still
// classify as ToolCalls; filtering by name happens downstream.
// ============================================================
#[test]
fn edge_case_foreign_tool_names_still_classify() {
    let envelope = parse(serde_json::json!({
        "message": {
            "type": "tool-calls",
            "call": {"id": "call_d", "assistantId": "asst_1"},
            "toolCalls": [
                {"id": "tc_1", "function": {"name": "transfer_call", "arguments": "{}"}}
            ]
        }
    }));
    assert_eq!(envelope.kind(), VapiEventKind::ToolCalls);
}

// ============================================================
// EDGE CASE 6: Provider adds a brand new event type
// Never an error; the delivery is acknowledged and dropped.
// ============================================================
#[test]
fn edge_case_future_event_types_ignored() {
    for payload in [
        serde_json::json!({"type": "model-output", "output": "..."}),
        serde_json::json!({"message": {"type": "voice-input"}}),
        serde_json::json!({"type": "message", "message": {"type": "hang-notification"}}),
    ] {
        assert_eq!(parse(payload).kind(), VapiEventKind::Ignored);
    }
}

// ============================================================
// EDGE CASE 7: Legacy function-call shape
// Pre-tool-call accounts send parameters as an object on a dedicated
// event. Same data, different envelope.
// ============================================================
#[test]
fn edge_case_legacy_function_call_shape() {
    let envelope = parse(serde_json::json!({
        "type": "function-call",
        "call": {"id": "call_e", "assistantId": "asst_1"},
        "functionCall": {
            "name": "collect_customer_info",
            "parameters": {
                "customerName": "Ada",
                "phoneNumber": "+15550003333",
                "partySize": 2,
                "callbackRequested": true
            }
        }
    }));
    assert_eq!(envelope.kind(), VapiEventKind::FunctionCall);
    let fc = envelope.function_call.as_ref().unwrap();
    let info = CustomerInfo::from_parameters(fc.parameters.as_ref().unwrap()).unwrap();
    assert_eq!(info.customer_name.as_deref(), Some("Ada"));
    assert_eq!(info.party_size, Some(2));
}
