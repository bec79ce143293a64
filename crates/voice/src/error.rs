//! Voice crate error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("twilio request failed: {0}")]
    Twilio(String),

    #[error("vapi request failed: {0}")]
    Vapi(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid tool call arguments: {0}")]
    ToolArguments(String),

    #[error("missing configuration: {0}")]
    Config(&'static str),
}

pub type VoiceResult<T> = Result<T, VoiceError>;
