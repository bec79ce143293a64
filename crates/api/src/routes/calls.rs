//! Call history for the dashboard

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use charterline_shared::models::Call;
use charterline_shared::types::CallStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(captain_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Call>>> {
    if let Some(status) = query.status.as_deref() {
        if CallStatus::parse(status).is_none() {
            return Err(ApiError::BadRequest(format!(
                "unknown call status {status:?}"
            )));
        }
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let calls =
        Call::list_for_captain(&state.pool, captain_id, query.status.as_deref(), limit).await?;
    Ok(Json(calls))
}
