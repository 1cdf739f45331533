use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-visible failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    MissingSections,
    MockContentDetected,
    GenerationFailed,
    GenerationTimeout,
    DependencyFailure,
    PaymentVerificationRequired,
    PaymentVerificationFailed,
    RateLimitExceeded,
    ServiceUnavailable,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::MissingSections => "MISSING_SECTIONS",
            ErrorCode::MockContentDetected => "MOCK_CONTENT_DETECTED",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::GenerationTimeout => "GENERATION_TIMEOUT",
            ErrorCode::DependencyFailure => "DEPENDENCY_FAILURE",
            ErrorCode::PaymentVerificationRequired => "PAYMENT_VERIFICATION_REQUIRED",
            ErrorCode::PaymentVerificationFailed => "PAYMENT_VERIFICATION_FAILED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }

    const ALL: [ErrorCode; 11] = [
        ErrorCode::ValidationFailed,
        ErrorCode::MissingSections,
        ErrorCode::MockContentDetected,
        ErrorCode::GenerationFailed,
        ErrorCode::GenerationTimeout,
        ErrorCode::DependencyFailure,
        ErrorCode::PaymentVerificationRequired,
        ErrorCode::PaymentVerificationFailed,
        ErrorCode::RateLimitExceeded,
        ErrorCode::ServiceUnavailable,
        ErrorCode::NotFound,
    ];
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// Orchestrator steps, in order. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Received,
    ValidatedInput,
    AccessChecked,
    IdempotencyChecked,
    LockAcquired,
    PaymentVerified,
    Generating,
    Validating,
    Repairing,
    Terminal,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Received => "RECEIVED",
            Step::ValidatedInput => "VALIDATED_INPUT",
            Step::AccessChecked => "ACCESS_CHECKED",
            Step::IdempotencyChecked => "IDEMPOTENCY_CHECKED",
            Step::LockAcquired => "LOCK_ACQUIRED",
            Step::PaymentVerified => "PAYMENT_VERIFIED",
            Step::Generating => "GENERATING",
            Step::Validating => "VALIDATING",
            Step::Repairing => "REPAIRING",
            Step::Terminal => "TERMINAL",
        }
    }
}

/// A request that ended without a report.
///
/// `stage` is the last step reached; failures from `Generating` onward are
/// failures of the report itself, earlier ones are rejections of the request.
#[derive(Debug, Clone, Error)]
#[error("{code} at {}: {message}", .stage.as_str())]
pub struct OrchestratorError {
    pub code: ErrorCode,
    pub message: String,
    pub stage: Step,
    pub report_id: Option<String>,
    /// The report was paid for and any authorization has been released.
    pub payment_cancelled: bool,
    pub retry_after: Option<Duration>,
}

impl OrchestratorError {
    pub fn new(code: ErrorCode, stage: Step, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage,
            report_id: None,
            payment_cancelled: false,
            retry_after: None,
        }
    }

    pub fn with_report(mut self, report_id: impl Into<String>) -> Self {
        self.report_id = Some(report_id.into());
        self
    }

    pub fn with_payment_cancelled(mut self, cancelled: bool) -> Self {
        self.payment_cancelled = cancelled;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_report_failure(&self) -> bool {
        self.stage >= Step::Generating
    }
}

/// Why the worker trigger could not be delivered.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("worker URL not configured")]
    NotConfigured,

    #[error("worker request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("worker rejected trigger with HTTP {0}")]
    Rejected(u16),
}
