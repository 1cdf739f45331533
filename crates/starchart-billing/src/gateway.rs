use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::BillingError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The subset of a Stripe PaymentIntent the gate looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
}

impl PaymentIntent {
    /// Authorized and waiting for capture, or already captured.
    pub fn is_authorized(&self) -> bool {
        matches!(self.status.as_str(), "requires_capture" | "succeeded")
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "canceled"
    }
}

/// A field Stripe returns either as an id or, when expanded, as the object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(T),
    Id(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }

    pub fn intent(&self) -> Option<&PaymentIntent> {
        match &self.payment_intent {
            Some(Expandable::Object(intent)) => Some(intent),
            _ => None,
        }
    }

    pub fn intent_id(&self) -> Option<&str> {
        match &self.payment_intent {
            Some(Expandable::Object(intent)) => Some(&intent.id),
            Some(Expandable::Id(id)) => Some(id),
            None => None,
        }
    }
}

/// Payment vendor operations the gate depends on.
pub trait PaymentGateway: Send + Sync {
    /// Retrieve a Checkout session with its PaymentIntent expanded.
    fn retrieve_checkout_session<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<CheckoutSession, BillingError>>;

    fn capture_intent<'a>(
        &'a self,
        intent_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentIntent, BillingError>>;

    /// Cancel an uncaptured intent. `reason` is one of the vendor's
    /// cancellation reasons. An intent that is already cancelled is returned
    /// as-is rather than as an error.
    fn cancel_intent<'a>(
        &'a self,
        intent_id: &'a str,
        reason: &'static str,
    ) -> BoxFuture<'a, Result<PaymentIntent, BillingError>>;
}
