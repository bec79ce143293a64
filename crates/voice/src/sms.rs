//! Captain SMS notifications via the Twilio REST API
//!
//! Twilio has no official Rust SDK, so this is a thin reqwest wrapper
//! around the Messages endpoint. Delivery is best-effort: a send failure
//! is logged by the caller and never fails webhook processing.

use charterline_shared::models::{Captain, CustomerPatch};
use serde::Deserialize;

use crate::error::{VoiceError, VoiceResult};

const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Shared campaign number used as the From when no messaging service
    /// is configured.
    pub campaign_number: Option<String>,
    pub messaging_service_sid: Option<String>,
}

impl TwilioConfig {
    pub fn from_env() -> VoiceResult<Self> {
        Ok(Self {
            account_sid: std::env::var("TWILIO_ACCOUNT_SID")
                .map_err(|_| VoiceError::Config("TWILIO_ACCOUNT_SID"))?,
            auth_token: std::env::var("TWILIO_AUTH_TOKEN")
                .map_err(|_| VoiceError::Config("TWILIO_AUTH_TOKEN"))?,
            campaign_number: std::env::var("TWILIO_SMS_CAMPAIGN_NUMBER").ok(),
            messaging_service_sid: std::env::var("TWILIO_MESSAGING_SERVICE_SID").ok(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TwilioConfig,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AvailableNumbersResponse {
    available_phone_numbers: Vec<AvailableNumber>,
}

#[derive(Debug, Deserialize)]
struct AvailableNumber {
    phone_number: String,
}

/// A number bought on the Twilio account
#[derive(Debug, Clone, Deserialize)]
pub struct PurchasedNumber {
    pub sid: String,
    pub phone_number: String,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Self {
        Self::with_base_url(config, TWILIO_API_BASE.to_string())
    }

    /// Point the client at a different API host (test servers).
    pub fn with_base_url(config: TwilioConfig, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            base_url,
        }
    }

    /// Send one SMS. Returns the Twilio message SID.
    pub async fn send_sms(&self, to: &str, from: &str, body: &str) -> VoiceResult<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        );

        let mut params = vec![("Body", body), ("To", to)];
        if let Some(sid) = self.config.messaging_service_sid.as_deref() {
            params.push(("MessagingServiceSid", sid));
        } else {
            params.push(("From", from));
        }

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await?;

        let message: MessageResponse = self.parse_response(response).await?;
        Ok(message.sid)
    }

    /// Search for an available US local number, optionally within an area
    /// code, and buy the first match.
    pub async fn purchase_local_number(
        &self,
        area_code: Option<&str>,
    ) -> VoiceResult<PurchasedNumber> {
        let search_url = format!(
            "{}/2010-04-01/Accounts/{}/AvailablePhoneNumbers/US/Local.json",
            self.base_url, self.config.account_sid
        );
        let mut query = vec![
            ("SmsEnabled", "true"),
            ("VoiceEnabled", "true"),
            ("PageSize", "1"),
        ];
        if let Some(area_code) = area_code {
            query.push(("AreaCode", area_code));
        }

        let response = self
            .http
            .get(&search_url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .query(&query)
            .send()
            .await?;
        let available: AvailableNumbersResponse = self.parse_response(response).await?;
        let number = available
            .available_phone_numbers
            .into_iter()
            .next()
            .ok_or_else(|| VoiceError::Twilio("no available numbers matched".into()))?;

        let buy_url = format!(
            "{}/2010-04-01/Accounts/{}/IncomingPhoneNumbers.json",
            self.base_url, self.config.account_sid
        );
        let response = self
            .http
            .post(&buy_url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("PhoneNumber", number.phone_number.as_str())])
            .send()
            .await?;
        self.parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> VoiceResult<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status();
            let detail = response
                .json::<TwilioErrorBody>()
                .await
                .ok()
                .and_then(|b| match (b.code, b.message) {
                    (Some(code), Some(msg)) => Some(format!("{code}: {msg}")),
                    (_, Some(msg)) => Some(msg),
                    _ => None,
                })
                .unwrap_or_else(|| "no error body".to_string());
            Err(VoiceError::Twilio(format!("{status} ({detail})")))
        }
    }
}

/// Why an SMS was not attempted for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsSkip {
    OptedOut,
    NoCaptainNumber,
    NoSenderNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsDelivery {
    Sent { sid: String },
    Skipped(SmsSkip),
}

#[derive(Debug, Clone)]
pub struct SmsNotifier {
    client: TwilioClient,
    campaign_number: Option<String>,
    has_messaging_service: bool,
}

impl SmsNotifier {
    pub fn new(config: TwilioConfig) -> Self {
        let campaign_number = config.campaign_number.clone();
        let has_messaging_service = config.messaging_service_sid.is_some();
        Self {
            client: TwilioClient::new(config),
            campaign_number,
            has_messaging_service,
        }
    }

    #[cfg(test)]
    pub fn with_client(client: TwilioClient, campaign_number: Option<String>) -> Self {
        Self {
            client,
            campaign_number,
            has_messaging_service: false,
        }
    }

    /// Notify a captain of a new inquiry. Preference and configuration
    /// checks happen here; the caller handles the once-per-call claim.
    pub async fn notify_inquiry(
        &self,
        captain: &Captain,
        patch: &CustomerPatch,
    ) -> VoiceResult<SmsDelivery> {
        if !captain.sms_opt_in {
            return Ok(SmsDelivery::Skipped(SmsSkip::OptedOut));
        }
        if captain.phone_number.trim().is_empty() {
            return Ok(SmsDelivery::Skipped(SmsSkip::NoCaptainNumber));
        }
        let from = match (self.campaign_number.as_deref(), self.has_messaging_service) {
            (Some(number), _) => number,
            (None, true) => "",
            (None, false) => return Ok(SmsDelivery::Skipped(SmsSkip::NoSenderNumber)),
        };

        let body = format_inquiry_sms(captain, patch);
        let sid = self.client.send_sms(&captain.phone_number, from, &body).await?;
        Ok(SmsDelivery::Sent { sid })
    }

    /// Send a test message so a captain can confirm their number and
    /// opt-in are wired up. Same preference checks as a real inquiry.
    pub async fn send_test(&self, captain: &Captain) -> VoiceResult<SmsDelivery> {
        if !captain.sms_opt_in {
            return Ok(SmsDelivery::Skipped(SmsSkip::OptedOut));
        }
        if captain.phone_number.trim().is_empty() {
            return Ok(SmsDelivery::Skipped(SmsSkip::NoCaptainNumber));
        }
        let from = match (self.campaign_number.as_deref(), self.has_messaging_service) {
            (Some(number), _) => number,
            (None, true) => "",
            (None, false) => return Ok(SmsDelivery::Skipped(SmsSkip::NoSenderNumber)),
        };

        let body = format!(
            "\u{1F3A3} Test message from {}. Inquiry alerts are working!",
            captain.business_name
        );
        let sid = self.client.send_sms(&captain.phone_number, from, &body).await?;
        Ok(SmsDelivery::Sent { sid })
    }

    pub fn client(&self) -> &TwilioClient {
        &self.client
    }
}

/// Render the inquiry notification body.
pub fn format_inquiry_sms(captain: &Captain, patch: &CustomerPatch) -> String {
    let name = patch.customer_name.as_deref().unwrap_or("Unknown caller");
    let phone = patch.phone_number.as_deref().unwrap_or("no number");

    let mut body = format!(
        "\u{1F3A3} New inquiry for {}!\n{name} ({phone})",
        captain.business_name
    );
    if let Some(trip_type) = patch.trip_type.as_deref() {
        body.push_str(&format!("\nTrip: {trip_type}"));
    }
    if let Some(party_size) = patch.party_size {
        body.push_str(&format!("\nParty of {party_size}"));
    }
    if let Some(dates) = patch.preferred_dates.as_deref() {
        if !dates.is_empty() {
            body.push_str(&format!("\nDates: {}", dates.join(", ")));
        }
    }
    if patch.callback_requested == Some(true) {
        body.push_str("\n\u{2705} Callback requested");
    }
    body.push_str("\nCheck your dashboard for details.");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn test_captain(sms_opt_in: bool) -> Captain {
        Captain {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            captain_name: "Sal".into(),
            business_name: "Reel Deal Charters".into(),
            phone_number: "+15550009999".into(),
            email: "sal@example.com".into(),
            location: "Key West, FL".into(),
            seasonal_info: String::new(),
            trip_types: vec!["offshore".into()],
            boat_info: String::new(),
            pricing_info: String::new(),
            custom_instructions: String::new(),
            sms_opt_in,
            service_enabled: true,
            subscription_active: true,
            vapi_assistant_id: Some("asst_1".into()),
            twilio_phone_number: None,
            twilio_sid: None,
            twilio_status: "none".into(),
            number_assistant_id: Some("asst_1".into()),
            vapi_phone_number_id: None,
            vapi_phone_number: None,
            vapi_integration_status: "none".into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn test_patch() -> CustomerPatch {
        CustomerPatch {
            customer_name: Some("Jane Doe".into()),
            phone_number: Some("+15550001111".into()),
            trip_type: Some("offshore".into()),
            party_size: Some(4),
            preferred_dates: Some(vec!["2025-07-04".into()]),
            callback_requested: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn inquiry_body_includes_collected_fields() {
        let body = format_inquiry_sms(&test_captain(true), &test_patch());
        assert!(body.contains("Reel Deal Charters"));
        assert!(body.contains("Jane Doe (+15550001111)"));
        assert!(body.contains("Trip: offshore"));
        assert!(body.contains("Party of 4"));
        assert!(body.contains("Dates: 2025-07-04"));
        assert!(body.contains("Callback requested"));
    }

    #[test]
    fn inquiry_body_degrades_for_sparse_patch() {
        let body = format_inquiry_sms(&test_captain(true), &CustomerPatch::default());
        assert!(body.contains("Unknown caller (no number)"));
        assert!(!body.contains("Trip:"));
        assert!(!body.contains("Callback requested"));
    }

    #[tokio::test]
    async fn opted_out_captain_is_skipped_without_a_request() {
        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: Some("+15550000000".into()),
            messaging_service_sid: None,
        };
        // No mock server running: a real request attempt would error, so a
        // clean Skipped result proves no request was made.
        let notifier = SmsNotifier::with_client(
            TwilioClient::with_base_url(config, "http://127.0.0.1:1".into()),
            Some("+15550000000".into()),
        );
        let delivery = notifier
            .notify_inquiry(&test_captain(false), &test_patch())
            .await
            .unwrap();
        assert_eq!(delivery, SmsDelivery::Skipped(SmsSkip::OptedOut));
    }

    #[tokio::test]
    async fn missing_sender_number_is_skipped() {
        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: None,
            messaging_service_sid: None,
        };
        let notifier = SmsNotifier::with_client(
            TwilioClient::with_base_url(config, "http://127.0.0.1:1".into()),
            None,
        );
        let delivery = notifier
            .notify_inquiry(&test_captain(true), &test_patch())
            .await
            .unwrap();
        assert_eq!(delivery, SmsDelivery::Skipped(SmsSkip::NoSenderNumber));
    }

    #[tokio::test]
    async fn send_sms_posts_form_and_returns_sid() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC_test/Messages.json")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("To".into(), "+15550009999".into()),
                mockito::Matcher::UrlEncoded("From".into(), "+15550000000".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"sid": "SM123", "status": "queued"}"#)
            .create_async()
            .await;

        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: Some("+15550000000".into()),
            messaging_service_sid: None,
        };
        let client = TwilioClient::with_base_url(config, server.url());
        let sid = client
            .send_sms("+15550009999", "+15550000000", "hello")
            .await
            .unwrap();
        assert_eq!(sid, "SM123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn purchase_searches_then_buys_first_match() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock(
                "GET",
                "/2010-04-01/Accounts/AC_test/AvailablePhoneNumbers/US/Local.json",
            )
            .match_query(mockito::Matcher::UrlEncoded(
                "AreaCode".into(),
                "305".into(),
            ))
            .with_status(200)
            .with_body(r#"{"available_phone_numbers": [{"phone_number": "+13055550123"}]}"#)
            .create_async()
            .await;
        let buy = server
            .mock(
                "POST",
                "/2010-04-01/Accounts/AC_test/IncomingPhoneNumbers.json",
            )
            .match_body(mockito::Matcher::UrlEncoded(
                "PhoneNumber".into(),
                "+13055550123".into(),
            ))
            .with_status(201)
            .with_body(r#"{"sid": "PN123", "phone_number": "+13055550123"}"#)
            .create_async()
            .await;

        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: None,
            messaging_service_sid: None,
        };
        let client = TwilioClient::with_base_url(config, server.url());
        let purchased = client.purchase_local_number(Some("305")).await.unwrap();
        assert_eq!(purchased.sid, "PN123");
        assert_eq!(purchased.phone_number, "+13055550123");
        search.assert_async().await;
        buy.assert_async().await;
    }

    #[tokio::test]
    async fn purchase_with_no_matches_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "GET",
                "/2010-04-01/Accounts/AC_test/AvailablePhoneNumbers/US/Local.json",
            )
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"available_phone_numbers": []}"#)
            .create_async()
            .await;

        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: None,
            messaging_service_sid: None,
        };
        let client = TwilioClient::with_base_url(config, server.url());
        let err = client.purchase_local_number(None).await.unwrap_err();
        assert!(matches!(err, VoiceError::Twilio(_)));
        assert!(err.to_string().contains("no available numbers"));
    }

    #[tokio::test]
    async fn send_sms_surfaces_twilio_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC_test/Messages.json")
            .with_status(400)
            .with_body(r#"{"code": 21211, "message": "Invalid 'To' number"}"#)
            .create_async()
            .await;

        let config = TwilioConfig {
            account_sid: "AC_test".into(),
            auth_token: "token".into(),
            campaign_number: Some("+15550000000".into()),
            messaging_service_sid: None,
        };
        let client = TwilioClient::with_base_url(config, server.url());
        let err = client
            .send_sms("bad", "+15550000000", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Twilio(_)));
        assert!(err.to_string().contains("21211"));
    }
}
