//! Persistent entity models
//!
//! Row structs plus their query and upsert functions. Webhook
//! reconciliation paths use single-statement upserts keyed on the natural
//! unique keys (`calls.call_id`, `(customers.captain_id, phone_number)`)
//! so concurrent deliveries cannot interleave a check with its write.

mod call;
mod captain;
mod customer;
mod user;

pub use call::{Call, CallCompletion, NewCall};
pub use captain::{Captain, CaptainProfileUpdate, NewCaptain, TwilioNumberUpdate, VapiBinding};
pub use customer::{Customer, CustomerPatch};
pub use user::{NewUser, SubscriptionUpdate, User};
