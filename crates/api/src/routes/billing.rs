//! Billing endpoints: checkout, portal, and subscription status

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use charterline_billing::BillingService;
use charterline_shared::models::User;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PortalRequest {
    pub user_id: Uuid,
}

fn billing_service(state: &AppState) -> ApiResult<&BillingService> {
    state
        .billing
        .as_deref()
        .ok_or_else(|| ApiError::Internal("billing is not configured".into()))
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let billing = billing_service(&state)?;
    let user = User::find_by_id(&state.pool, req.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if user.has_active_subscription() {
        return Err(ApiError::Conflict(
            "user already has an active subscription".into(),
        ));
    }

    let session = billing.checkout.create_subscription_checkout(&user).await?;
    Ok(Json(json!({ "url": session.url, "sessionId": session.id })))
}

pub async fn create_portal(
    State(state): State<AppState>,
    Json(req): Json<PortalRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let billing = billing_service(&state)?;
    let user = User::find_by_id(&state.pool, req.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    let customer_id = user
        .stripe_customer_id
        .clone()
        .ok_or_else(|| ApiError::BadRequest("user has no billing account yet".into()))?;

    let session = billing.checkout.create_portal_session(&user, &customer_id).await?;
    Ok(Json(json!({ "url": session.url })))
}

pub async fn subscription_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = User::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(json!({
        "status": user.subscription_status,
        "hasActiveSubscription": user.has_active_subscription(),
        "canAccessPlatform": user.can_access_platform(),
        "currentPeriodEnd": user.current_period_end,
        "cancelAtPeriodEnd": user.cancel_at_period_end,
        "priceId": user.price_id,
    })))
}
