#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jiff::Timestamp;

use starchart_bedrock::generator::BoxFuture;
use starchart_bedrock::{Attempt, ContentGenerator, GenerationError, GenerationOutput, GenerationRequest};
use starchart_billing::gateway::Expandable;
use starchart_billing::{
    BillingError, CheckoutSession, PaymentGate, PaymentGateway, PaymentIntent, PaymentTokens,
    RetryPolicy,
};
use starchart_core::clock::ManualClock;
use starchart_core::idempotency::{self, ANONYMOUS_SESSION};
use starchart_core::models::input::{BirthInput, NormalizedInput};
use starchart_core::models::report::{ReportContent, ReportRecord, ReportSection};
use starchart_core::models::report_type::{ReportType, section_title};
use starchart_core::models::usage::TokenUsage;
use starchart_orchestrator::error::TriggerError;
use starchart_orchestrator::{
    Environment, GenerateRequest, Orchestrator, OrchestratorConfig, WorkerTrigger,
};
use starchart_storage::{
    CreateOutcome, Lease, MemoryReportStore, ReclaimOutcome, ReportStore, StorageError,
};

pub const TOKEN_SECRET: &[u8] = b"orchestrator-test-secret";
pub const TEST_SESSION: &str = "test_session_1";

const FILLER: &str = "The stars favour steady progress in this part of your life.";

pub fn birth_input() -> BirthInput {
    BirthInput {
        name: "Ada Lovelace".into(),
        birth_date: "1990-07-04".into(),
        birth_time: Some("14:30".into()),
        birth_place: "London, UK".into(),
        latitude: Some(51.5072),
        longitude: Some(-0.1276),
        timezone: Some("Europe/London".into()),
    }
}

pub fn normalized(today: Timestamp) -> NormalizedInput {
    birth_input()
        .normalize(None, today.to_zoned(jiff::tz::TimeZone::UTC).date())
        .unwrap()
}

pub fn request(report_type: ReportType) -> GenerateRequest {
    GenerateRequest {
        input: birth_input(),
        report_type: report_type.as_str().to_string(),
        ..Default::default()
    }
}

pub fn paid_request(report_type: ReportType, token: String) -> GenerateRequest {
    GenerateRequest {
        payment_token: Some(token),
        ..request(report_type)
    }
}

pub fn token(report_type: ReportType, payment_intent: &str) -> String {
    PaymentTokens::new(TOKEN_SECRET)
        .issue(
            "client-ref",
            report_type.as_str(),
            payment_intent,
            Timestamp::now(),
            Duration::from_secs(600),
        )
        .unwrap()
}

/// Key the orchestrator derives for an anonymous request with the fixture
/// input.
pub fn anonymous_key(report_type: ReportType, today: Timestamp) -> String {
    idempotency::derive_key(&normalized(today), report_type, ANONYMOUS_SESSION)
}

fn paragraph(words: usize) -> String {
    let sentence_words = FILLER.split_whitespace().count();
    let repeats = words.div_ceil(sentence_words);
    vec![FILLER; repeats].join(" ")
}

/// Content that passes validation for `report_type`.
pub fn good_content(report_type: ReportType) -> ReportContent {
    let profile = report_type.profile();
    let per_section = profile.min_words / profile.required_sections.len() + 20;
    content_with(profile.required_sections, per_section)
}

pub fn content_with(keys: &[&str], words_per_section: usize) -> ReportContent {
    ReportContent {
        title: "Your Chart".into(),
        summary: "A reading shaped by the Sun in Cancer and a strong pull toward home.".into(),
        sections: keys
            .iter()
            .map(|key| ReportSection {
                key: key.to_string(),
                title: section_title(key),
                body: paragraph(words_per_section),
            })
            .collect(),
        quality: Default::default(),
        disclaimer: None,
        degraded_source: false,
    }
}

pub fn placeholder_content(report_type: ReportType, degraded: bool) -> ReportContent {
    let mut content = good_content(report_type);
    content.sections[0]
        .body
        .push_str(" Lorem ipsum dolor sit amet.");
    content.degraded_source = degraded;
    content
}

#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<ReportContent, GenerationError>>>,
    attempts: Mutex<Vec<Attempt>>,
    session_keys: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedGenerator {
    pub fn push(&self, result: Result<ReportContent, GenerationError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn session_keys(&self) -> Vec<String> {
        self.session_keys.lock().unwrap().clone()
    }
}

impl ContentGenerator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, GenerationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attempts.lock().unwrap().push(request.attempt.clone());
            self.session_keys.lock().unwrap().push(request.session_key.clone());
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            let content = match next {
                Some(result) => result?,
                None => good_content(request.report_type),
            };
            Ok(GenerationOutput {
                content,
                usage: TokenUsage::default(),
                model_id: "fake-model".into(),
            })
        })
    }
}

#[derive(Default)]
pub struct RecordingGateway {
    pub sessions: Mutex<HashMap<String, CheckoutSession>>,
    pub captures: Mutex<Vec<String>>,
    pub cancels: Mutex<Vec<(String, &'static str)>>,
    pub fail_captures: Mutex<bool>,
    pub fail_cancels: Mutex<bool>,
}

impl RecordingGateway {
    pub fn captures(&self) -> Vec<String> {
        self.captures.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancels
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn add_session(&self, id: &str, intent_id: &str, report_type: ReportType) {
        self.sessions.lock().unwrap().insert(
            id.to_string(),
            CheckoutSession {
                id: id.into(),
                status: Some("complete".into()),
                payment_status: Some("unpaid".into()),
                payment_intent: Some(Expandable::Object(PaymentIntent {
                    id: intent_id.into(),
                    status: "requires_capture".into(),
                })),
                client_reference_id: None,
                metadata: HashMap::from([(
                    "report_type".to_string(),
                    report_type.as_str().to_string(),
                )]),
            },
        );
    }
}

impl PaymentGateway for RecordingGateway {
    fn retrieve_checkout_session<'a>(
        &'a self,
        session_id: &'a str,
    ) -> starchart_billing::gateway::BoxFuture<'a, Result<CheckoutSession, BillingError>> {
        Box::pin(async move {
            self.sessions
                .lock()
                .unwrap()
                .get(session_id)
                .cloned()
                .ok_or(BillingError::Rejected {
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
            self.captures.lock().unwrap().push(intent_id.to_string());
            if *self.fail_captures.lock().unwrap() {
                return Err(BillingError::Unavailable("capture failed".into()));
            }
            Ok(PaymentIntent {
                id: intent_id.into(),
                status: "succeeded".into(),
            })
        })
    }

    fn cancel_intent<'a>(
        &'a self,
        intent_id: &'a str,
        reason: &'static str,
    ) -> starchart_billing::gateway::BoxFuture<'a, Result<PaymentIntent, BillingError>> {
        Box::pin(async move {
            self.cancels
                .lock()
                .unwrap()
                .push((intent_id.to_string(), reason));
            if *self.fail_cancels.lock().unwrap() {
                return Err(BillingError::Unavailable("cancel failed".into()));
            }
            Ok(PaymentIntent {
                id: intent_id.into(),
                status: "canceled".into(),
            })
        })
    }
}

#[derive(Default)]
pub struct RecordingTrigger {
    pub triggered: Mutex<Vec<String>>,
}

impl RecordingTrigger {
    pub fn triggered(&self) -> Vec<String> {
        self.triggered.lock().unwrap().clone()
    }
}

impl WorkerTrigger for RecordingTrigger {
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

/// A store whose backend is down.
pub struct DownStore;

fn down() -> StorageError {
    StorageError::Unavailable("connection refused".into())
}

impl ReportStore for DownStore {
    fn get_by_key<'a>(
        &'a self,
        _key: &'a str,
    ) -> starchart_storage::BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn get_by_id<'a>(
        &'a self,
        _report_id: &'a str,
    ) -> starchart_storage::BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn create_processing(
        &self,
        _record: ReportRecord,
    ) -> starchart_storage::BoxFuture<'_, Result<CreateOutcome, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn reclaim<'a>(
        &'a self,
        _key: &'a str,
        _expected_attempt: u32,
        _payment_ref: Option<String>,
    ) -> starchart_storage::BoxFuture<'a, Result<ReclaimOutcome, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn claim<'a>(
        &'a self,
        _key: &'a str,
        _expected_attempt: u32,
    ) -> starchart_storage::BoxFuture<'a, Result<ReclaimOutcome, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn attach_payment<'a>(
        &'a self,
        _key: &'a str,
        _lease: &'a Lease,
        _payment_ref: String,
    ) -> starchart_storage::BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn complete<'a>(
        &'a self,
        _key: &'a str,
        _lease: &'a Lease,
        _content: ReportContent,
    ) -> starchart_storage::BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn fail<'a>(
        &'a self,
        _key: &'a str,
        _lease: &'a Lease,
        _message: String,
        _code: String,
    ) -> starchart_storage::BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn heartbeat<'a>(
        &'a self,
        _key: &'a str,
        _lease: &'a Lease,
    ) -> starchart_storage::BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async { Err(down()) })
    }

    fn set_payment_state<'a>(
        &'a self,
        _key: &'a str,
        _lease: &'a Lease,
        _state: starchart_core::models::report::PaymentState,
    ) -> starchart_storage::BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async { Err(down()) })
    }
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryReportStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub gateway: Arc<RecordingGateway>,
    pub worker: Arc<RecordingTrigger>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn config(environment: Environment) -> OrchestratorConfig {
    OrchestratorConfig {
        environment,
        test_session_ids: HashSet::from([TEST_SESSION.to_string()]),
        ..Default::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config(Environment::Production))
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::now()));
        let store = Arc::new(MemoryReportStore::with_clock(clock.clone()));
        let generator = Arc::new(ScriptedGenerator::default());
        let gateway = Arc::new(RecordingGateway::default());
        let worker = Arc::new(RecordingTrigger::default());
        let gate = PaymentGate::new(gateway.clone(), Some(PaymentTokens::new(TOKEN_SECRET)))
            .with_retry(RetryPolicy {
                attempts: 3,
                base_delay: Duration::from_millis(1),
            });
        let orchestrator = Orchestrator::new(
            store.clone(),
            generator.clone(),
            gate,
            worker.clone(),
            config,
        )
        .with_clock(clock.clone());
        Self {
            clock,
            store,
            generator,
            gateway,
            worker,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub async fn record(&self, report_id: &str) -> ReportRecord {
        self.store.get_by_id(report_id).await.unwrap().unwrap()
    }

    pub async fn settle(&self) {
        self.orchestrator.tasks().wait_idle().await;
    }
}
