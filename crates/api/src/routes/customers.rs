//! Customer pipeline for the dashboard

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use charterline_shared::models::Customer;
use charterline_shared::types::CustomerStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(captain_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Customer>>> {
    if let Some(status) = query.status.as_deref() {
        if CustomerStatus::parse(status).is_none() {
            return Err(ApiError::BadRequest(format!(
                "unknown customer status {status:?}"
            )));
        }
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let customers =
        Customer::list_for_captain(&state.pool, captain_id, query.status.as_deref(), limit).await?;
    Ok(Json(customers))
}

pub async fn update(
    State(state): State<AppState>,
    Path((captain_id, customer_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(status) = req.status.as_deref() {
        if CustomerStatus::parse(status).is_none() {
            return Err(ApiError::BadRequest(format!(
                "unknown customer status {status:?}"
            )));
        }
    }
    if req.status.is_none() && req.notes.is_none() {
        return Err(ApiError::BadRequest("nothing to update".into()));
    }

    let updated = Customer::update_status(
        &state.pool,
        customer_id,
        captain_id,
        req.status.as_deref(),
        req.notes.as_deref(),
    )
    .await?;
    if !updated {
        return Err(ApiError::NotFound("customer"));
    }
    Ok(Json(serde_json::json!({ "updated": true })))
}
