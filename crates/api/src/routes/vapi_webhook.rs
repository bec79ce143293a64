//! VAPI webhook endpoint
//!
//! Returns 200 for every payload that passes secret verification, even
//! when processing fails: VAPI treats non-2xx as a retry signal, and a
//! poisoned event would be redelivered forever.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use charterline_voice::WebhookOutcome;

use crate::state::AppState;

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let started = Instant::now();

    // VAPI sends the shared secret in either header depending on how the
    // server credential was configured; accept both like the dashboard does.
    let header_secret = headers
        .get("x-vapi-signature")
        .or_else(|| headers.get("x-vapi-secret"))
        .and_then(|value| value.to_str().ok());
    if !state.voice.verify_secret(header_secret) {
        tracing::warn!("VAPI webhook rejected: bad secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid webhook secret" })),
        )
            .into_response();
    }

    let message = match state.voice.handle(&body).await {
        Ok(outcome) => {
            if outcome == WebhookOutcome::Unattributed {
                tracing::warn!("VAPI event had no active captain");
            }
            outcome.message()
        }
        Err(error) => {
            // Acknowledge anyway; the event is logged for investigation
            tracing::error!(error = %error, "VAPI event processing failed");
            "event acknowledged, processing failed"
        }
    };

    Json(json!({
        "success": true,
        "message": message,
        "processingTimeMs": started.elapsed().as_millis() as u64,
        "timestamp": OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
    }))
    .into_response()
}

/// Readiness probe VAPI can hit when validating the server URL.
pub async fn readiness() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "endpoint": "vapi-webhook" }))
}
