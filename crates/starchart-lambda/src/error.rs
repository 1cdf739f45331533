use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use starchart_orchestrator::{ErrorCode, OrchestratorError};

pub const PAYMENT_CANCELLED_MESSAGE: &str =
    "Your payment authorization has been cancelled. You have not been charged.";

/// Unified API error type for all route handlers.
#[derive(Debug)]
pub enum ApiError {
    Orchestrator(OrchestratorError),
    BadRequest(String),
    Unauthorized(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: &'static str,
    code: ErrorCode,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_id: Option<String>,
    payment_cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::PaymentVerificationRequired | ErrorCode::PaymentVerificationFailed => {
            StatusCode::FORBIDDEN
        }
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServiceUnavailable | ErrorCode::DependencyFailure => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorCode::GenerationTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::GenerationFailed
        | ErrorCode::MockContentDetected
        | ErrorCode::MissingSections => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `Retry-After` in whole seconds, never zero.
pub fn retry_after_header(retry_after: Duration) -> HeaderValue {
    HeaderValue::from(retry_after.as_secs_f64().ceil().max(1.0) as u64)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::Orchestrator(e) => e,
            ApiError::BadRequest(msg) => {
                let body = ErrorBody {
                    status: "error",
                    code: ErrorCode::ValidationFailed,
                    error: msg,
                    report_id: None,
                    payment_cancelled: false,
                    message: None,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Unauthorized(msg) => {
                tracing::warn!(error = %msg, "unauthorized request");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "status": "error", "error": msg })),
                )
                .into_response();
            }
        };

        let status = status_for(e.code);
        if status.is_server_error() {
            tracing::error!(code = %e.code, error = %e.message, "request failed");
        }
        let body = ErrorBody {
            status: if e.is_report_failure() { "failed" } else { "error" },
            code: e.code,
            error: e.message,
            report_id: e.report_id,
            payment_cancelled: e.payment_cancelled,
            message: e.payment_cancelled.then_some(PAYMENT_CANCELLED_MESSAGE),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = e.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, retry_after_header(retry_after));
        }
        response
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        ApiError::Orchestrator(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}
