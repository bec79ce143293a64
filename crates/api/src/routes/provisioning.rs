//! Telephony provisioning: assistant creation and phone number binding
//!
//! Two-step flow. First an assistant is created from the captain's
//! profile; later a Twilio number is imported into VAPI and bound to that
//! assistant. `number_assistant_id` is only written by the binding step,
//! because it is the key inbound webhooks resolve captains by.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use charterline_shared::models::{Captain, TwilioNumberUpdate, VapiBinding};
use charterline_voice::{TwilioConfig, VapiClient};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AttachNumberRequest {
    /// E.164 number already on the Twilio account. Defaults to the number
    /// previously purchased for this captain.
    pub twilio_phone_number: Option<String>,
    pub twilio_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseNumberRequest {
    pub area_code: Option<String>,
}

fn vapi_client(state: &AppState) -> ApiResult<&VapiClient> {
    state
        .vapi
        .as_deref()
        .ok_or_else(|| ApiError::Internal("VAPI provisioning is not configured".into()))
}

pub async fn create_assistant(
    State(state): State<AppState>,
    Path(captain_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let vapi = vapi_client(&state)?;
    let captain = Captain::find_by_id(&state.pool, captain_id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;

    if let Some(existing) = captain.vapi_assistant_id.as_deref() {
        return Ok(Json(json!({
            "assistantId": existing,
            "created": false,
        })));
    }

    let created = vapi.create_assistant(&captain).await?;
    Captain::set_vapi_assistant_id(&state.pool, captain_id, &created.id).await?;
    tracing::info!(
        captain_id = %captain_id,
        assistant_id = %created.id,
        "VAPI assistant provisioned"
    );
    Ok(Json(json!({ "assistantId": created.id, "created": true })))
}

/// Buy a Twilio number for the captain and persist it; binding to an
/// assistant happens in the attach step.
pub async fn purchase_number(
    State(state): State<AppState>,
    Path(captain_id): Path<Uuid>,
    Json(req): Json<PurchaseNumberRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let notifier = state
        .notifier
        .as_ref()
        .ok_or_else(|| ApiError::Internal("Twilio is not configured".into()))?;

    let captain = Captain::find_by_id(&state.pool, captain_id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    if let Some(existing) = captain.twilio_phone_number.as_deref() {
        return Ok(Json(json!({
            "phoneNumber": existing,
            "purchased": false,
        })));
    }

    let purchased = notifier
        .client()
        .purchase_local_number(req.area_code.as_deref())
        .await?;
    Captain::set_twilio_number(
        &state.pool,
        captain_id,
        TwilioNumberUpdate {
            phone_number: &purchased.phone_number,
            sid: &purchased.sid,
            status: "active",
        },
    )
    .await?;

    tracing::info!(
        captain_id = %captain_id,
        phone_number = %purchased.phone_number,
        "Twilio number purchased"
    );
    Ok(Json(json!({
        "phoneNumber": purchased.phone_number,
        "sid": purchased.sid,
        "purchased": true,
    })))
}

pub async fn attach_phone_number(
    State(state): State<AppState>,
    Path(captain_id): Path<Uuid>,
    Json(req): Json<AttachNumberRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let vapi = vapi_client(&state)?;
    let twilio = TwilioConfig::from_env()?;

    let captain = Captain::find_by_id(&state.pool, captain_id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    let assistant_id = captain
        .vapi_assistant_id
        .clone()
        .ok_or_else(|| ApiError::BadRequest("provision an assistant first".into()))?;

    let number = match req.twilio_phone_number.as_deref() {
        Some(number) => number.trim().to_string(),
        None => captain
            .twilio_phone_number
            .clone()
            .ok_or_else(|| ApiError::BadRequest("purchase a number first".into()))?,
    };
    if !number.starts_with('+') {
        return Err(ApiError::BadRequest(
            "twilio_phone_number must be in E.164 format".into(),
        ));
    }

    // An explicitly supplied number replaces whatever was stored
    if req.twilio_phone_number.is_some() {
        Captain::set_twilio_number(
            &state.pool,
            captain_id,
            TwilioNumberUpdate {
                phone_number: &number,
                sid: req.twilio_sid.as_deref().unwrap_or(""),
                status: "active",
            },
        )
        .await?;
    }

    let imported = vapi
        .import_twilio_number(&number, &twilio.account_sid, &twilio.auth_token)
        .await?;
    vapi.assign_assistant(&imported.id, &assistant_id).await?;

    Captain::set_vapi_binding(
        &state.pool,
        captain_id,
        VapiBinding {
            assistant_id: &assistant_id,
            vapi_phone_number_id: &imported.id,
            vapi_phone_number: imported.number.as_deref(),
            integration_status: "active",
        },
    )
    .await?;

    tracing::info!(
        captain_id = %captain_id,
        phone_number = %number,
        assistant_id = %assistant_id,
        "phone number imported and bound to assistant"
    );
    Ok(Json(json!({
        "phoneNumberId": imported.id,
        "phoneNumber": imported.number,
        "assistantId": assistant_id,
    })))
}
