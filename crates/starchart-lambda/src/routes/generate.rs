use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use starchart_core::models::report::{Quality, ReportContent};
use starchart_core::models::report_type::ReportType;
use starchart_orchestrator::worker::WORKER_SECRET_HEADER;
use starchart_orchestrator::{Delivery, ErrorCode, GenerateRequest, PaymentStatus};

use crate::error::{ApiError, retry_after_header};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliveredBody {
    status: &'static str,
    report_id: String,
    report_type: ReportType,
    quality: Quality,
    payment_status: PaymentStatus,
    replayed: bool,
    content: ReportContent,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessingBody {
    status: &'static str,
    report_id: String,
    retry_after: u64,
}

fn delivery_response(delivery: Delivery) -> Response {
    match delivery {
        Delivery::Delivered(d) => {
            let body = DeliveredBody {
                status: "DELIVERED",
                quality: d.quality(),
                report_id: d.report_id,
                report_type: d.report_type,
                payment_status: d.payment,
                replayed: d.replayed,
                content: d.content,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Delivery::Processing {
            report_id,
            retry_after,
        } => {
            let body = ProcessingBody {
                status: "processing",
                report_id,
                retry_after: retry_after.as_secs(),
            };
            (
                StatusCode::ACCEPTED,
                [(header::RETRY_AFTER, retry_after_header(retry_after))],
                Json(body),
            )
                .into_response()
        }
    }
}

/// Request a report.
pub async fn create_report(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let delivery = state.orchestrator.generate(request).await?;
    Ok(delivery_response(delivery))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub report_id: Option<String>,
}

/// Report status for polling clients.
pub async fn poll_report(
    State(state): State<AppState>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let Some(report_id) = query
        .report_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Err(ApiError::BadRequest("reportId is required".into()));
    };
    let delivery = state.orchestrator.poll(report_id).await?;
    Ok(delivery_response(delivery))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    pub report_id: String,
}

/// Generate a heavy report. Called by the worker trigger, not by clients.
pub async fn run_worker(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<WorkerRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let presented = headers
        .get(WORKER_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match (&state.worker_secret, presented) {
        (Some(expected), Some(presented)) if expected == presented => {}
        _ => return Err(ApiError::Unauthorized("invalid worker secret".into())),
    }

    let Json(request) = payload?;
    let report_id = request.report_id;
    match state.orchestrator.process(&report_id).await {
        Ok(_) => {}
        Err(e) if matches!(e.code, ErrorCode::NotFound | ErrorCode::ValidationFailed) => {
            return Err(e.into());
        }
        // The outcome is on the record; pollers will see it.
        Err(e) => tracing::warn!(report_id = %report_id, code = %e.code, "worker run failed"),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "reportId": report_id })),
    )
        .into_response())
}
