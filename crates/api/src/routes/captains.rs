//! Captain profile CRUD

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use charterline_shared::models::{Captain, CaptainProfileUpdate, NewCaptain};
use charterline_voice::SmsDelivery;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCaptainRequest {
    pub user_id: Uuid,
    pub captain_name: String,
    pub business_name: String,
    pub phone_number: String,
    pub email: String,
    pub location: String,
    #[serde(default)]
    pub trip_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SmsPreferencesRequest {
    pub sms_opt_in: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCaptainRequest>,
) -> ApiResult<(StatusCode, Json<Captain>)> {
    if req.captain_name.trim().is_empty() || req.business_name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "captain_name and business_name are required".into(),
        ));
    }

    let captain = Captain::insert(
        &state.pool,
        NewCaptain {
            user_id: req.user_id,
            captain_name: req.captain_name.trim(),
            business_name: req.business_name.trim(),
            phone_number: req.phone_number.trim(),
            email: req.email.trim(),
            location: req.location.trim(),
            trip_types: &req.trip_types,
        },
    )
    .await
    .map_err(|error| match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("this user already has a captain profile".into())
        }
        _ => ApiError::Database(error),
    })?;

    tracing::info!(captain_id = %captain.id, "captain profile created");
    Ok((StatusCode::CREATED, Json(captain)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Captain>> {
    let captain = Captain::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    Ok(Json(captain))
}

/// Dashboard bootstrap lookup: the frontend knows the session user, not
/// the captain id.
pub async fn get_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Captain>> {
    let captain = Captain::find_by_user_id(&state.pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    Ok(Json(captain))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<CaptainProfileUpdate>,
) -> ApiResult<Json<Captain>> {
    Captain::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    Captain::update_profile(&state.pool, id, &update).await?;

    let captain = Captain::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    Ok(Json(captain))
}

pub async fn update_sms_preferences(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SmsPreferencesRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    Captain::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;
    Captain::set_sms_opt_in(&state.pool, id, req.sms_opt_in).await?;
    tracing::info!(captain_id = %id, sms_opt_in = req.sms_opt_in, "SMS preference updated");
    Ok(Json(serde_json::json!({ "sms_opt_in": req.sms_opt_in })))
}

/// Fire a test message at the captain's own number so they can confirm
/// inquiry alerts are reaching them.
pub async fn send_test_sms(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let notifier = state
        .notifier
        .as_ref()
        .ok_or_else(|| ApiError::Internal("Twilio is not configured".into()))?;
    let captain = Captain::find_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("captain"))?;

    let delivery = notifier.send_test(&captain).await?;
    let response = match delivery {
        SmsDelivery::Sent { sid } => serde_json::json!({ "sent": true, "sid": sid }),
        SmsDelivery::Skipped(reason) => serde_json::json!({
            "sent": false,
            "reason": format!("{reason:?}"),
        }),
    };
    Ok(Json(response))
}
