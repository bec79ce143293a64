#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Voice-AI integration: webhook ingestion, call/customer reconciliation,
//! SMS notifications, and VAPI provisioning.

pub mod client;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod resolver;
pub mod sms;
pub mod webhook;

#[cfg(test)]
mod edge_case_tests;

pub use client::{VapiClient, VapiConfig};
pub use error::{VoiceError, VoiceResult};
pub use event::{VapiEnvelope, VapiEventKind};
pub use reconciler::CallReconciler;
pub use sms::{PurchasedNumber, SmsDelivery, SmsNotifier, SmsSkip, TwilioClient, TwilioConfig};
pub use webhook::{VoiceWebhookHandler, WebhookOutcome};
