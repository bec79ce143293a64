#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Charterline shared crate
//!
//! Database pool helpers, domain type enums, and the persistent entity
//! models (users, captains, calls, customers) used by the api, billing,
//! and voice crates.

pub mod db;
pub mod models;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{
    CallStatus, CustomerStatus, SubscriptionStatus, Urgency, UserRole,
};
