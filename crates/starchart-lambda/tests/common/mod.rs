#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response};
use serde_json::Value;

use starchart_bedrock::generator::BoxFuture;
use starchart_bedrock::{ContentGenerator, GenerationError, GenerationOutput, GenerationRequest};
use starchart_billing::{
    BillingError, CheckoutSession, PaymentGate, PaymentGateway, PaymentIntent, PaymentTokens,
    RetryPolicy,
};
use starchart_core::models::report::{ReportContent, ReportSection};
use starchart_core::models::report_type::{ReportType, section_title};
use starchart_core::models::usage::TokenUsage;
use starchart_lambda::app;
use starchart_lambda::state::AppState;
use starchart_orchestrator::error::TriggerError;
use starchart_orchestrator::{Environment, Orchestrator, OrchestratorConfig, WorkerTrigger};
use starchart_storage::MemoryReportStore;

pub const TOKEN_SECRET: &[u8] = b"lambda-test-secret";
pub const WORKER_SECRET: &str = "worker-secret";

fn content_for(report_type: ReportType) -> ReportContent {
    let profile = report_type.profile();
    let sentence = "Your chart shows a steady rhythm of growth and reflection this season.";
    let repeats = profile.min_words / profile.required_sections.len() / 12 + 3;
    ReportContent {
        title: format!("{} for Ada", report_type.display_name()),
        summary: "A reading for a Cancer Sun.".into(),
        sections: profile
            .required_sections
            .iter()
            .map(|key| ReportSection {
                key: key.to_string(),
                title: section_title(key),
                body: vec![sentence; repeats].join(" "),
            })
            .collect(),
        quality: Default::default(),
        disclaimer: None,
        degraded_source: false,
    }
}

#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub delay: Mutex<Option<Duration>>,
    pub errors: Mutex<VecDeque<GenerationError>>,
}

impl ContentGenerator for FakeGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, GenerationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let error = self.errors.lock().unwrap().pop_front();
            if let Some(e) = error {
                return Err(e);
            }
            Ok(GenerationOutput {
                content: content_for(request.report_type),
                usage: TokenUsage::default(),
                model_id: "fake".into(),
            })
        })
    }
}

#[derive(Default)]
pub struct FakeGateway {
    pub calls: AtomicUsize,
}

impl PaymentGateway for FakeGateway {
    fn retrieve_checkout_session<'a>(
        &'a self,
        _session_id: &'a str,
    ) -> starchart_billing::gateway::BoxFuture<'a, Result<CheckoutSession, BillingError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BillingError::Rejected {
                status: 404,
                message: "No such checkout.session".into(),
            })
        })
    }

    fn capture_intent<'a>(
        &'a self,
        intent_id: &'a str,
    ) -> starchart_billing::gateway::BoxFuture<'a, Result<PaymentIntent, BillingError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PaymentIntent {
                id: intent_id.into(),
                status: "succeeded".into(),
            })
        })
    }

    fn cancel_intent<'a>(
        &'a self,
        intent_id: &'a str,
        _reason: &'static str,
    ) -> starchart_billing::gateway::BoxFuture<'a, Result<PaymentIntent, BillingError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PaymentIntent {
                id: intent_id.into(),
                status: "canceled".into(),
            })
        })
    }
}

#[derive(Default)]
pub struct NoopTrigger {
    pub triggered: Mutex<Vec<String>>,
}

impl WorkerTrigger for NoopTrigger {
    fn trigger<'a>(
        &'a self,
        report_id: &'a str,
    ) -> starchart_orchestrator::worker::BoxFuture<'a, Result<(), TriggerError>> {
        Box::pin(async move {
            self.triggered.lock().unwrap().push(report_id.to_string());
            Ok(())
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub generator: Arc<FakeGenerator>,
    pub gateway: Arc<FakeGateway>,
    pub worker: Arc<NoopTrigger>,
    pub orchestrator: Arc<Orchestrator>,
}

impl TestApp {
    pub fn new() -> Self {
        let generator = Arc::new(FakeGenerator::default());
        let gateway = Arc::new(FakeGateway::default());
        let worker = Arc::new(NoopTrigger::default());
        let gate = PaymentGate::new(gateway.clone(), Some(PaymentTokens::new(TOKEN_SECRET)))
            .with_retry(RetryPolicy {
                attempts: 1,
                base_delay: Duration::from_millis(1),
            });
        let config = OrchestratorConfig {
            environment: Environment::Test,
            test_session_ids: HashSet::from(["qa_1".to_string()]),
            ..Default::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(MemoryReportStore::new()),
            generator.clone(),
            gate,
            worker.clone(),
            config,
        ));
        let router = app(AppState {
            orchestrator: orchestrator.clone(),
            worker_secret: Some(WORKER_SECRET.into()),
        });
        Self {
            router,
            generator,
            gateway,
            worker,
            orchestrator,
        }
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn birth_input() -> Value {
    serde_json::json!({
        "name": "Ada Lovelace",
        "birthDate": "1990-07-04",
        "birthTime": "14:30",
        "birthPlace": "London, UK",
        "latitude": 51.5072,
        "longitude": -0.1276
    })
}
