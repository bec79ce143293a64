//! Server configuration

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// `development` or `production`; development relaxes webhook
    /// verification for local tunnel testing.
    pub app_env: String,
    /// Public base URL of the dashboard, used for redirects and as the
    /// webhook callback base.
    pub app_url: String,
    pub allowed_origins: String,
    pub vapi_webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| "production".to_string()),
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string()),
            vapi_webhook_secret: std::env::var("VAPI_WEBHOOK_SECRET").ok(),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// Webhook URL handed to VAPI when provisioning assistants.
    pub fn vapi_webhook_url(&self) -> String {
        format!("{}/api/vapi/webhook", self.app_url)
    }
}
