//! Credentials signup and login
//!
//! Passwords are hashed with Argon2id. Session issuance is handled by the
//! dashboard frontend; these endpoints return the user record on success.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use charterline_shared::models::{NewUser, User};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    let user = User::insert(
        &state.pool,
        NewUser {
            email,
            password_hash: Some(&password_hash),
            name: req.name.trim(),
            provider: "credentials",
        },
    )
    .await
    .map_err(|error| match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("an account with this email already exists".into())
        }
        _ => ApiError::Database(error),
    })?;

    tracing::info!(user_id = %user.id, "account created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_email(&state.pool, req.email.trim())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // OAuth-provider accounts have no password to check against
    let stored = user.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;
    let parsed = PasswordHash::new(stored).map_err(|_| ApiError::Unauthorized)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)?;

    if !user.is_active {
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use sqlx::PgPool;

    // connect_lazy never dials; validation must reject before any query
    fn state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/none".into(),
            bind_address: "127.0.0.1:0".into(),
            app_env: "test".into(),
            app_url: "http://localhost:3000".into(),
            allowed_origins: String::new(),
            vapi_webhook_secret: None,
        };
        let pool = PgPool::connect_lazy(&config.database_url).unwrap();
        AppState::new(pool, config)
    }

    #[tokio::test]
    async fn signup_rejects_invalid_email() {
        let result = signup(
            State(state()),
            Json(SignupRequest {
                email: "not-an-email".into(),
                password: "longenough".into(),
                name: "Sal".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn signup_rejects_short_password() {
        let result = signup(
            State(state()),
            Json(SignupRequest {
                email: "sal@example.com".into(),
                password: "short".into(),
                name: "Sal".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn signup_rejects_blank_name() {
        let result = signup(
            State(state()),
            Json(SignupRequest {
                email: "sal@example.com".into(),
                password: "longenough".into(),
                name: "   ".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
