//! Stripe webhook endpoint
//!
//! Signature failures return 400 so Stripe surfaces them in the
//! dashboard. Processing failures after verification still return 200;
//! the event ledger records the failure and redeliveries of that event
//! id are acknowledged without reprocessing. Only a claim stuck in
//! 'processing' for over 30 minutes (a crash mid-handle) is reclaimed
//! by a later delivery.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let Some(billing) = state.billing.as_ref() else {
        tracing::error!("Stripe webhook received but billing is not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "billing not configured" })),
        )
            .into_response();
    };

    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing stripe-signature header" })),
        )
            .into_response();
    };

    let event = match billing.webhooks.verify_event(&body, signature) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(error = %error, "Stripe webhook signature verification failed");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid signature" })),
            )
                .into_response();
        }
    };

    let event_id = event.id.to_string();
    let event_type = event.type_.to_string();
    if let Err(error) = billing.webhooks.handle_event(event).await {
        tracing::error!(
            event_id = %event_id,
            event_type = %event_type,
            error = %error,
            "Stripe event processing failed"
        );
    }

    Json(json!({ "received": true })).into_response()
}
