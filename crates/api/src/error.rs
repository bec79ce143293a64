//! API error type with HTTP response mapping
//!
//! Used by the CRUD and provisioning routes. The webhook routes do their
//! own status handling because providers interpret statuses as retry
//! signals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Billing(#[from] charterline_billing::BillingError),

    #[error(transparent)]
    Voice(#[from] charterline_voice::VoiceError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Database(_)
            | ApiError::Billing(_)
            | ApiError::Voice(_)
            | ApiError::Internal(_) => {
                tracing::error!(error = %self, "internal error serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_their_status_codes() {
        let cases = [
            (
                ApiError::BadRequest("bad".into()).into_response(),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Unauthorized.into_response(), StatusCode::UNAUTHORIZED),
            (
                ApiError::NotFound("captain").into_response(),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Conflict("dup".into()).into_response(),
                StatusCode::CONFLICT,
            ),
        ];
        for (response, expected) in cases {
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let response = ApiError::Internal("connection string with password".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
