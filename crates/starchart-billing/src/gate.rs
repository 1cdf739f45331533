use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{error, info, warn};

use starchart_audit::{AuditAction, AuditEvent};
use starchart_core::mode::ExecutionMode;
use starchart_core::models::report_type::ReportType;

use crate::error::BillingError;
use crate::gateway::PaymentGateway;
use crate::token::PaymentTokens;

/// What the client presented as proof of payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Signed payment token.
    Token(String),
    /// Stripe Checkout session id.
    CheckoutSession(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verification {
    pub valid: bool,
    /// Product the payment was made for, when the credential says.
    pub report_type: Option<ReportType>,
    pub session_ref: Option<String>,
    /// PaymentIntent to capture or cancel. `None` when verification was
    /// bypassed, in which case there is nothing to settle.
    pub payment_intent: Option<String>,
    /// Why the credential was rejected.
    pub reason: Option<String>,
}

impl Verification {
    fn bypassed() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Valid, and for the product being requested.
    pub fn covers(&self, report_type: ReportType) -> bool {
        self.valid && self.report_type.is_none_or(|t| t == report_type)
    }
}

/// Why an authorization is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    InvalidRequest,
    VerificationFailed,
    Duplicate,
    StoreUnavailable,
    GenerationFailed,
    GenerationTimeout,
    MockContent,
    StaleLock,
    CaptureFailed,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::InvalidRequest => "invalid_request",
            CancelReason::VerificationFailed => "verification_failed",
            CancelReason::Duplicate => "duplicate",
            CancelReason::StoreUnavailable => "store_unavailable",
            CancelReason::GenerationFailed => "generation_failed",
            CancelReason::GenerationTimeout => "generation_timeout",
            CancelReason::MockContent => "mock_content",
            CancelReason::StaleLock => "stale_lock",
            CancelReason::CaptureFailed => "capture_failed",
        }
    }

    /// Closest of the vendor's fixed cancellation reasons.
    pub fn vendor_reason(&self) -> &'static str {
        match self {
            CancelReason::Duplicate => "duplicate",
            _ => "abandoned",
        }
    }
}

/// Bounded retry for cancellation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempt.saturating_sub(1)))
    }
}

/// Final state of an authorization after a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Captured,
    /// Capture failed and the authorization was released.
    Released,
    /// Capture failed and so did every cancel attempt.
    ManualReview,
}

/// Verifies payment credentials and settles authorizations.
///
/// `capture` and `cancel` never return errors: a payment call that cannot be
/// completed is logged and audited, and the caller carries on.
#[derive(Clone)]
pub struct PaymentGate {
    gateway: Arc<dyn PaymentGateway>,
    tokens: Option<PaymentTokens>,
    retry: RetryPolicy,
    capture_timeout: Duration,
}

impl PaymentGate {
    pub fn new(gateway: Arc<dyn PaymentGateway>, tokens: Option<PaymentTokens>) -> Self {
        Self {
            gateway,
            tokens,
            retry: RetryPolicy::default(),
            capture_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Verify a credential. Demo and test-bypass requests are accepted
    /// without a vendor call. Errors are vendor outages only; a bad
    /// credential is an invalid `Verification`.
    pub async fn verify(
        &self,
        credential: Option<&Credential>,
        mode: ExecutionMode,
    ) -> Result<Verification, BillingError> {
        if mode.bypasses_payment() {
            info!(mode = mode.as_str(), "payment verification bypassed");
            return Ok(Verification::bypassed());
        }

        match credential {
            None => Ok(Verification::rejected("no payment credential supplied")),
            Some(Credential::Token(token)) => self.verify_token(token),
            Some(Credential::CheckoutSession(session_id)) => {
                self.verify_checkout_session(session_id).await
            }
        }
    }

    fn verify_token(&self, token: &str) -> Result<Verification, BillingError> {
        let tokens = self
            .tokens
            .as_ref()
            .ok_or(BillingError::NotConfigured("payment token secret"))?;

        let claims = match tokens.verify(token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "payment token rejected");
                return Ok(Verification::rejected(e.to_string()));
            }
        };

        let Ok(report_type) = claims.report_type.parse::<ReportType>() else {
            return Ok(Verification::rejected(format!(
                "token names unknown report type {:?}",
                claims.report_type
            )));
        };

        Ok(Verification {
            valid: true,
            report_type: Some(report_type),
            session_ref: Some(claims.sub),
            payment_intent: Some(claims.payment_intent),
            reason: None,
        })
    }

    async fn verify_checkout_session(&self, session_id: &str) -> Result<Verification, BillingError> {
        let session = match self.gateway.retrieve_checkout_session(session_id).await {
            Ok(session) => session,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                warn!(session_id, error = %e, "checkout session lookup rejected");
                return Ok(Verification::rejected(e.to_string()));
            }
        };

        if !session.is_complete() {
            return Ok(Verification::rejected(format!(
                "checkout session is {}",
                session.status.as_deref().unwrap_or("unknown")
            )));
        }
        let Some(intent) = session.intent() else {
            return Ok(Verification::rejected("checkout session has no payment intent"));
        };
        if !intent.is_authorized() {
            return Ok(Verification::rejected(format!(
                "payment intent is {}",
                intent.status
            )));
        }

        let report_type = match session.metadata.get("report_type") {
            Some(raw) => match raw.parse::<ReportType>() {
                Ok(t) => Some(t),
                Err(_) => {
                    return Ok(Verification::rejected(format!(
                        "checkout session names unknown report type {raw:?}"
                    )));
                }
            },
            None => None,
        };

        Ok(Verification {
            valid: true,
            report_type,
            session_ref: Some(
                session
                    .client_reference_id
                    .clone()
                    .unwrap_or_else(|| session.id.clone()),
            ),
            payment_intent: Some(intent.id.clone()),
            reason: None,
        })
    }

    /// Capture an authorization. Single attempt.
    pub async fn capture(&self, payment_ref: &str) -> bool {
        match self.gateway.capture_intent(payment_ref).await {
            Ok(intent) => {
                info!(payment_ref, status = %intent.status, "payment captured");
                AuditEvent::payment(AuditAction::PaymentCaptured, payment_ref).emit();
                true
            }
            Err(e) => {
                warn!(payment_ref, error = %e, "payment capture failed");
                AuditEvent::payment(AuditAction::PaymentCaptureFailed, payment_ref)
                    .with_details(json!({ "error": e.to_string() }))
                    .emit();
                false
            }
        }
    }

    /// Release an authorization, retrying with exponential backoff.
    ///
    /// Returns false only after every attempt failed, in which case a manual
    /// intervention event has been emitted.
    pub async fn cancel(&self, payment_ref: &str, reason: CancelReason) -> bool {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .gateway
                .cancel_intent(payment_ref, reason.vendor_reason())
                .await
            {
                Ok(intent) => {
                    info!(
                        payment_ref,
                        reason = reason.as_str(),
                        attempt,
                        status = %intent.status,
                        "payment authorization cancelled"
                    );
                    AuditEvent::payment(AuditAction::PaymentCancelled, payment_ref)
                        .with_details(json!({ "reason": reason.as_str(), "attempt": attempt }))
                        .emit();
                    return true;
                }
                Err(e) => {
                    warn!(payment_ref, attempt, error = %e, "payment cancel attempt failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        error!(
            payment_ref,
            reason = reason.as_str(),
            attempts,
            error = %last_error,
            "payment cancel exhausted retries, manual intervention required"
        );
        AuditEvent::payment(AuditAction::PaymentManualIntervention, payment_ref)
            .with_details(json!({
                "reason": reason.as_str(),
                "attempts": attempts,
                "error": last_error,
            }))
            .emit();
        false
    }

    /// Capture under the gate's capture timeout; if capture fails or times
    /// out, release the authorization instead.
    pub async fn settle(&self, payment_ref: &str) -> SettleOutcome {
        let captured = match tokio::time::timeout(self.capture_timeout, self.capture(payment_ref)).await
        {
            Ok(captured) => captured,
            Err(_) => {
                warn!(payment_ref, timeout_ms = self.capture_timeout.as_millis() as u64, "payment capture timed out");
                false
            }
        };
        if captured {
            return SettleOutcome::Captured;
        }
        if self.cancel(payment_ref, CancelReason::CaptureFailed).await {
            SettleOutcome::Released
        } else {
            SettleOutcome::ManualReview
        }
    }
}
