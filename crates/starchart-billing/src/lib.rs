//! starchart-billing
//!
//! Payment gate for paid reports: credential verification (signed payment
//! tokens or Stripe Checkout sessions), and capture/cancel of manual-capture
//! PaymentIntents with bounded retry.

pub mod error;
pub mod gate;
pub mod gateway;
pub mod stripe;
pub mod token;

pub use crate::error::BillingError;
pub use crate::gate::{CancelReason, Credential, PaymentGate, RetryPolicy, SettleOutcome, Verification};
pub use crate::gateway::{CheckoutSession, PaymentGateway, PaymentIntent};
pub use crate::stripe::StripeClient;
pub use crate::token::{PaymentClaims, PaymentTokens};
