//! VAPI provisioning client
//!
//! Covers the three provisioning calls the platform needs: create an
//! assistant from a captain's profile, import a Twilio number, and bind
//! an assistant to an imported number. No Rust SDK exists, so this talks
//! to the REST API directly.

use charterline_shared::models::Captain;
use serde::Deserialize;
use serde_json::json;

use crate::error::{VoiceError, VoiceResult};

const VAPI_API_BASE: &str = "https://api.vapi.ai";

#[derive(Debug, Clone)]
pub struct VapiConfig {
    pub api_key: String,
    /// Public URL VAPI should deliver webhooks to.
    pub webhook_url: String,
    pub webhook_secret: Option<String>,
}

impl VapiConfig {
    pub fn from_env(webhook_url: String) -> VoiceResult<Self> {
        Ok(Self {
            api_key: std::env::var("VAPI_API_KEY").map_err(|_| VoiceError::Config("VAPI_API_KEY"))?,
            webhook_url,
            webhook_secret: std::env::var("VAPI_WEBHOOK_SECRET").ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VapiClient {
    http: reqwest::Client,
    config: VapiConfig,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedAssistant {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedPhoneNumber {
    pub id: String,
    pub number: Option<String>,
}

impl VapiClient {
    pub fn new(config: VapiConfig) -> Self {
        Self::with_base_url(config, VAPI_API_BASE.to_string())
    }

    pub fn with_base_url(config: VapiConfig, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            base_url,
        }
    }

    /// Create a voice assistant configured from the captain's profile.
    pub async fn create_assistant(&self, captain: &Captain) -> VoiceResult<CreatedAssistant> {
        let mut server = json!({ "url": self.config.webhook_url });
        if let Some(secret) = self.config.webhook_secret.as_deref() {
            server["secret"] = json!(secret);
        }

        let body = json!({
            "name": format!("{} Assistant", captain.business_name),
            "model": {
                "provider": "openai",
                "model": "gpt-4o",
                "messages": [{
                    "role": "system",
                    "content": build_system_prompt(captain),
                }],
                "tools": [collect_customer_info_tool()],
            },
            "voice": {
                "provider": "11labs",
                "voiceId": "burt",
            },
            "firstMessage": format!(
                "Thanks for calling {}! How can I help you plan your trip?",
                captain.business_name
            ),
            "server": server,
            "endCallFunctionEnabled": true,
            "recordingEnabled": true,
        });

        self.post_json("/assistant", &body).await
    }

    /// Import a Twilio-owned number into VAPI so it can route calls.
    pub async fn import_twilio_number(
        &self,
        twilio_number: &str,
        twilio_account_sid: &str,
        twilio_auth_token: &str,
    ) -> VoiceResult<ImportedPhoneNumber> {
        let body = json!({
            "twilioPhoneNumber": twilio_number,
            "twilioAccountSid": twilio_account_sid,
            "twilioAuthToken": twilio_auth_token,
        });
        self.post_json("/phone-number/import/twilio", &body).await
    }

    /// Bind an assistant to an imported phone number.
    pub async fn assign_assistant(
        &self,
        phone_number_id: &str,
        assistant_id: &str,
    ) -> VoiceResult<()> {
        let url = format!("{}/phone-number/{phone_number_id}", self.base_url);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "assistantId": assistant_id }))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.api_error(response).await)
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> VoiceResult<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.api_error(response).await)
        }
    }

    async fn api_error(&self, response: reqwest::Response) -> VoiceError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        VoiceError::Vapi(format!("{status}: {body}"))
    }
}

/// Render the assistant's system prompt from the captain's profile.
/// Optional profile sections are only included when filled in.
pub fn build_system_prompt(captain: &Captain) -> String {
    let mut prompt = format!(
        "You are the phone assistant for {business}, a fishing charter run by \
         Captain {name} out of {location}. Answer questions about trips and \
         collect booking inquiries. Be friendly and concise; this is a phone \
         call, so keep responses short.",
        business = captain.business_name,
        name = captain.captain_name,
        location = captain.location,
    );

    if !captain.trip_types.is_empty() {
        prompt.push_str(&format!("\n\nTrips offered: {}.", captain.trip_types.join(", ")));
    }
    if !captain.boat_info.trim().is_empty() {
        prompt.push_str(&format!("\nBoat: {}.", captain.boat_info.trim()));
    }
    if !captain.pricing_info.trim().is_empty() {
        prompt.push_str(&format!("\nPricing: {}.", captain.pricing_info.trim()));
    }
    if !captain.seasonal_info.trim().is_empty() {
        prompt.push_str(&format!("\nSeasons: {}.", captain.seasonal_info.trim()));
    }
    if !captain.custom_instructions.trim().is_empty() {
        prompt.push_str(&format!("\n\n{}", captain.custom_instructions.trim()));
    }

    prompt.push_str(
        "\n\nWhen a caller shows booking interest, use the collect_customer_info \
         tool to capture their name, phone number, and trip details before the \
         call ends. Always confirm the phone number back to the caller.",
    );
    prompt
}

fn collect_customer_info_tool() -> serde_json::Value {
    json!({
        "type": "function",
        "function": {
            "name": "collect_customer_info",
            "description": "Capture a caller's booking inquiry details",
            "parameters": {
                "type": "object",
                "properties": {
                    "customerName": { "type": "string" },
                    "phoneNumber": { "type": "string" },
                    "email": { "type": "string" },
                    "preferredDates": { "type": "array", "items": { "type": "string" } },
                    "partySize": { "type": "integer" },
                    "tripType": { "type": "string" },
                    "experience": { "type": "string" },
                    "specialRequests": { "type": "string" },
                    "budget": { "type": "string" },
                    "callbackRequested": { "type": "boolean" },
                    "urgency": { "type": "string", "enum": ["low", "medium", "high"] }
                },
                "required": ["customerName", "phoneNumber", "callbackRequested"]
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn profile_captain() -> Captain {
        Captain {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            captain_name: "Sal".into(),
            business_name: "Reel Deal Charters".into(),
            phone_number: "+15550009999".into(),
            email: "sal@example.com".into(),
            location: "Key West, FL".into(),
            seasonal_info: "Tarpon runs April through June".into(),
            trip_types: vec!["offshore".into(), "flats".into()],
            boat_info: "32ft center console".into(),
            pricing_info: "".into(),
            custom_instructions: "Never quote exact prices.".into(),
            sms_opt_in: true,
            service_enabled: true,
            subscription_active: true,
            vapi_assistant_id: None,
            twilio_phone_number: None,
            twilio_sid: None,
            twilio_status: "none".into(),
            number_assistant_id: None,
            vapi_phone_number_id: None,
            vapi_phone_number: None,
            vapi_integration_status: "none".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn system_prompt_includes_filled_profile_sections() {
        let prompt = build_system_prompt(&profile_captain());
        assert!(prompt.contains("Reel Deal Charters"));
        assert!(prompt.contains("Captain Sal"));
        assert!(prompt.contains("offshore, flats"));
        assert!(prompt.contains("32ft center console"));
        assert!(prompt.contains("Tarpon runs"));
        assert!(prompt.contains("Never quote exact prices."));
        assert!(!prompt.contains("Pricing:"));
        assert!(prompt.contains("collect_customer_info"));
    }

    #[tokio::test]
    async fn create_assistant_posts_and_returns_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/assistant")
            .match_header("authorization", "Bearer key_test")
            .with_status(201)
            .with_body(r#"{"id": "asst_123"}"#)
            .create_async()
            .await;

        let client = VapiClient::with_base_url(
            VapiConfig {
                api_key: "key_test".into(),
                webhook_url: "https://example.com/api/vapi/webhook".into(),
                webhook_secret: Some("shh".into()),
            },
            server.url(),
        );
        let created = client.create_assistant(&profile_captain()).await.unwrap();
        assert_eq!(created.id, "asst_123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn import_failure_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/phone-number/import/twilio")
            .with_status(422)
            .with_body(r#"{"message": "number already imported"}"#)
            .create_async()
            .await;

        let client = VapiClient::with_base_url(
            VapiConfig {
                api_key: "key_test".into(),
                webhook_url: "https://example.com/api/vapi/webhook".into(),
                webhook_secret: None,
            },
            server.url(),
        );
        let err = client
            .import_twilio_number("+15550001111", "AC_test", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Vapi(_)));
        assert!(err.to_string().contains("already imported"));
    }
}
