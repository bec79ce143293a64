//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use charterline_billing::BillingService;
use charterline_voice::{
    SmsNotifier, TwilioConfig, VapiClient, VapiConfig, VoiceWebhookHandler,
};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service; None when Stripe credentials are not configured,
    /// which keeps the rest of the platform usable in local development.
    pub billing: Option<Arc<BillingService>>,
    pub voice: Arc<VoiceWebhookHandler>,
    /// VAPI provisioning client; None without VAPI_API_KEY.
    pub vapi: Option<Arc<VapiClient>>,
    /// Kept alongside the webhook handler for the test-SMS and number
    /// purchase endpoints.
    pub notifier: Option<SmsNotifier>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        let notifier = match TwilioConfig::from_env() {
            Ok(twilio_config) => {
                tracing::info!("Twilio SMS notifications enabled");
                Some(SmsNotifier::new(twilio_config))
            }
            Err(e) => {
                tracing::warn!("Twilio SMS not configured: {}", e);
                None
            }
        };

        let voice = Arc::new(VoiceWebhookHandler::new(
            pool.clone(),
            notifier.clone(),
            config.vapi_webhook_secret.clone(),
            config.is_development(),
        ));

        let vapi = match VapiConfig::from_env(config.vapi_webhook_url()) {
            Ok(vapi_config) => {
                tracing::info!("VAPI provisioning client initialized");
                Some(Arc::new(VapiClient::new(vapi_config)))
            }
            Err(e) => {
                tracing::warn!("VAPI provisioning not configured: {}", e);
                None
            }
        };

        Self {
            pool,
            config,
            billing,
            voice,
            vapi,
            notifier,
        }
    }
}
