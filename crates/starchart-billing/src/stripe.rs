use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::BillingError;
use crate::gateway::{BoxFuture, CheckoutSession, PaymentGateway, PaymentIntent};

const STRIPE_API: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Present on `payment_intent_unexpected_state` errors.
    #[serde(default)]
    payment_intent: Option<PaymentIntent>,
}

/// Stripe REST client for the PaymentIntent and Checkout endpoints.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            secret_key: secret_key.into(),
            base_url: STRIPE_API.to_string(),
        }
    }

    /// Point the client at a different API host (stripe-mock, a proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, BillingError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/checkout/sessions/{session_id}")))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("expand[]", "payment_intent")])
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn capture(&self, intent_id: &str) -> Result<PaymentIntent, BillingError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{intent_id}/capture")))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn cancel(&self, intent_id: &str, reason: &str) -> Result<PaymentIntent, BillingError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{intent_id}/cancel")))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("cancellation_reason", reason)])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response.json().await?);
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if let Ok(envelope) = serde_json::from_str::<StripeErrorEnvelope>(&text)
            && let Some(intent) = envelope.error.payment_intent
            && intent.is_cancelled()
        {
            debug!(intent_id, "payment intent already cancelled");
            return Ok(intent);
        }
        Err(classify(status, &text))
    }
}

impl PaymentGateway for StripeClient {
    fn retrieve_checkout_session<'a>(
        &'a self,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<CheckoutSession, BillingError>> {
        Box::pin(self.retrieve_session(session_id))
    }

    fn capture_intent<'a>(
        &'a self,
        intent_id: &'a str,
    ) -> BoxFuture<'a, Result<PaymentIntent, BillingError>> {
        Box::pin(self.capture(intent_id))
    }

    fn cancel_intent<'a>(
        &'a self,
        intent_id: &'a str,
        reason: &'static str,
    ) -> BoxFuture<'a, Result<PaymentIntent, BillingError>> {
        Box::pin(self.cancel(intent_id, reason))
    }
}

async fn check(response: Response) -> Result<Response, BillingError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(classify(status, &text))
}

fn classify(status: StatusCode, body: &str) -> BillingError {
    let message = serde_json::from_str::<StripeErrorEnvelope>(body)
        .ok()
        .map(|e| {
            let code = e.error.code.unwrap_or_default();
            let message = e.error.message.unwrap_or_default();
            format!("{code}: {message}")
        })
        .unwrap_or_else(|| body.to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        BillingError::Unavailable(format!("HTTP {}: {message}", status.as_u16()))
    } else {
        BillingError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
