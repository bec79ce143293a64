//! HTTP route definitions

pub mod auth;
pub mod billing;
pub mod captains;
pub mod calls;
pub mod customers;
pub mod provisioning;
pub mod stripe_webhook;
pub mod vapi_webhook;

use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Webhooks
        .route(
            "/api/vapi/webhook",
            post(vapi_webhook::handle).get(vapi_webhook::readiness),
        )
        .route("/api/stripe/webhook", post(stripe_webhook::handle))
        // Accounts
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        // Captain profiles
        .route("/api/captains", post(captains::create))
        .route(
            "/api/captains/{id}",
            get(captains::get).put(captains::update),
        )
        .route("/api/users/{id}/captain", get(captains::get_by_user))
        .route(
            "/api/captains/{id}/sms-preferences",
            put(captains::update_sms_preferences),
        )
        .route("/api/captains/{id}/test-sms", post(captains::send_test_sms))
        // Dashboard data
        .route("/api/captains/{id}/calls", get(calls::list))
        .route("/api/captains/{id}/customers", get(customers::list))
        .route(
            "/api/captains/{captain_id}/customers/{customer_id}",
            put(customers::update),
        )
        // Billing
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/portal", post(billing::create_portal))
        .route(
            "/api/billing/status/{user_id}",
            get(billing::subscription_status),
        )
        // Telephony provisioning
        .route(
            "/api/captains/{id}/provision/number",
            post(provisioning::purchase_number),
        )
        .route(
            "/api/captains/{id}/provision/assistant",
            post(provisioning::create_assistant),
        )
        .route(
            "/api/captains/{id}/provision/phone-number",
            post(provisioning::attach_phone_number),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "charterline-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
