//! starchart-core
//!
//! Pure domain types, idempotency key derivation, and store key conventions.
//! No AWS SDK dependency. This is the shared vocabulary of the Starchart system.

pub mod clock;
pub mod error;
pub mod idempotency;
pub mod mode;
pub mod models;
pub mod store_keys;
pub mod zodiac;
