//! starchart-lambda
//!
//! HTTP surface of the report service: an axum router served through
//! `lambda_http`, environment configuration, and wiring of the production
//! collaborators.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use starchart_bedrock::BedrockGenerator;
use starchart_billing::{PaymentGate, PaymentTokens, StripeClient};
use starchart_orchestrator::{HttpWorkerTrigger, Orchestrator};
use starchart_storage::{MemoryReportStore, S3ReportStore};

use crate::config::AppConfig;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/generate-report",
            post(routes::generate::create_report).get(routes::generate::poll_report),
        )
        .route("/generate-report/worker", post(routes::generate::run_worker))
        .layer(axum_mw::from_fn(middleware::audit::audit_log))
        .layer(cors)
        .with_state(state)
}

/// Wire the production collaborators from configuration.
pub async fn build_state(config: &AppConfig) -> eyre::Result<AppState> {
    let orchestrator_config = config.orchestrator();

    let s3 = starchart_storage::client::build_client().await;
    let store = Arc::new(S3ReportStore::new(s3, &config.bucket));

    let bedrock = starchart_bedrock::client::build_client().await;
    let generator = Arc::new(BedrockGenerator::new(bedrock, &config.model_id));

    let stripe = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone().unwrap_or_default(),
    ));
    let tokens = config
        .payment_token_secret
        .as_deref()
        .map(|secret| PaymentTokens::new(secret.as_bytes()));
    let gate = PaymentGate::new(stripe, tokens);

    let worker = Arc::new(HttpWorkerTrigger::new(
        config.worker_url.clone(),
        config.worker_secret.clone().unwrap_or_default(),
        orchestrator_config.worker_trigger_timeout,
    ));

    let mut orchestrator = Orchestrator::new(store, generator, gate, worker, orchestrator_config);
    if !config.environment.is_production() {
        orchestrator = orchestrator.with_fallback(Arc::new(MemoryReportStore::new()));
    }

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        worker_secret: config.worker_secret.clone(),
    })
}
