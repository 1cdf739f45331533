use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use starchart_audit::{AuditAction, AuditEvent};
use starchart_bedrock::{Attempt, ContentGenerator, GenerationError, GenerationRequest};
use starchart_billing::{CancelReason, Credential, PaymentGate, SettleOutcome, Verification};
use starchart_core::clock::{Clock, SystemClock};
use starchart_core::idempotency::{self, ANONYMOUS_SESSION};
use starchart_core::mode::ExecutionMode;
use starchart_core::models::input::{BirthInput, NormalizedInput};
use starchart_core::models::report::{
    PaymentState, Quality, ReportContent, ReportRecord, ReportStatus,
};
use starchart_core::models::report_type::ReportType;
use starchart_storage::{CreateOutcome, Lease, ReclaimOutcome, ReportStore, StorageError};

use crate::config::OrchestratorConfig;
use crate::detached::DetachedTasks;
use crate::error::{ErrorCode, OrchestratorError, Step};
use crate::heartbeat::Heartbeat;
use crate::lock::{self, LockState};
use crate::mode::ModeResolver;
use crate::repair;
use crate::validation::{self, Severity};
use crate::worker::WorkerTrigger;

const STORE_RETRY_AFTER: Duration = Duration::from_secs(30);
const RATE_LIMIT_RETRY_AFTER: Duration = Duration::from_secs(30);
const DEPENDENCY_RETRY_AFTER: Duration = Duration::from_secs(60);

/// A report request as received from the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub input: BirthInput,
    pub report_type: String,
    pub payment_token: Option<String>,
    pub payment_intent_id: Option<String>,
    pub session_id: Option<String>,
    pub decision_context: Option<String>,
    pub bypass_cache: bool,
}

impl GenerateRequest {
    fn payment_token(&self) -> Option<&str> {
        non_empty(self.payment_token.as_deref())
    }

    fn session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref())
    }

    fn payment_intent_id(&self) -> Option<&str> {
        non_empty(self.payment_intent_id.as_deref())
    }

    /// What separates this client's requests from everyone else's.
    fn session_discriminator(&self) -> String {
        match (self.session_id(), self.payment_token()) {
            (Some(session), _) => session.to_string(),
            (None, Some(token)) => idempotency::fingerprint(token),
            (None, None) => ANONYMOUS_SESSION.to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NotRequired,
    /// Paid product delivered without payment (demo or test session).
    Bypassed,
    CapturePending,
    Captured,
    NotCharged,
}

impl PaymentStatus {
    fn from_record(record: &ReportRecord) -> Self {
        match record.payment_state {
            PaymentState::Captured => PaymentStatus::Captured,
            PaymentState::Authorized | PaymentState::CapturePending => PaymentStatus::CapturePending,
            PaymentState::NotCharged | PaymentState::Cancelled | PaymentState::ManualReview => {
                PaymentStatus::NotCharged
            }
            PaymentState::None if record.report_type.is_paid() => PaymentStatus::Bypassed,
            PaymentState::None => PaymentStatus::NotRequired,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Delivered {
    pub report_id: String,
    pub report_type: ReportType,
    pub content: ReportContent,
    pub payment: PaymentStatus,
    /// Served from a previously completed record.
    pub replayed: bool,
}

impl Delivered {
    pub fn quality(&self) -> Quality {
        self.content.quality
    }
}

#[derive(Debug, Clone)]
pub enum Delivery {
    Delivered(Delivered),
    Processing {
        report_id: String,
        retry_after: Duration,
    },
}

impl Delivery {
    pub fn report_id(&self) -> &str {
        match self {
            Delivery::Delivered(d) => &d.report_id,
            Delivery::Processing { report_id, .. } => report_id,
        }
    }
}

/// Carried into a single placeholder regeneration.
pub struct RegenerationContext {
    pub report_id: String,
    pub session_key: String,
    /// Why the previous output was rejected, fed back to the generator.
    pub reason: String,
    pub deadline: Instant,
}

/// One owned PROCESSING record and everything needed to finish it.
#[derive(Clone)]
struct Job {
    store: Arc<dyn ReportStore>,
    key: String,
    report_id: String,
    /// Attempt this job owns; writes from a superseded attempt are refused.
    attempt: u32,
    report_type: ReportType,
    input: NormalizedInput,
    session_key: String,
    /// The authorization to capture on success or release on failure.
    payment_ref: Option<String>,
}

impl Job {
    fn from_record(store: Arc<dyn ReportStore>, record: ReportRecord) -> Self {
        Self {
            store,
            key: record.idempotency_key,
            report_id: record.report_id,
            attempt: record.attempt,
            report_type: record.report_type,
            input: record.input,
            session_key: record.session_key,
            payment_ref: record.payment_intent_ref,
        }
    }

    fn lease(&self) -> Lease {
        Lease::new(self.report_id.clone(), self.attempt)
    }

    fn paid(&self) -> bool {
        self.report_type.is_paid() || self.payment_ref.is_some()
    }
}

enum Lock {
    Owned {
        record: ReportRecord,
        /// Authorization left behind by the stale attempt that was taken over.
        orphaned_payment: Option<String>,
    },
    Busy(Delivery),
}

fn step(report_id: &str, step: Step) {
    debug!(report_id, step = step.as_str(), "orchestrator step");
}

/// Sequences a report request through idempotency, the processing lock,
/// payment verification, generation, validation and repair, and settles
/// the payment according to the outcome.
///
/// No failure after a payment reference is known leaves it uncancelled, and
/// nothing is captured unless a STANDARD quality report was stored.
pub struct Orchestrator {
    store: Arc<dyn ReportStore>,
    fallback: Option<Arc<dyn ReportStore>>,
    generator: Arc<dyn ContentGenerator>,
    gate: PaymentGate,
    worker: Arc<dyn WorkerTrigger>,
    tasks: DetachedTasks,
    clock: Arc<dyn Clock>,
    modes: ModeResolver,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ReportStore>,
        generator: Arc<dyn ContentGenerator>,
        gate: PaymentGate,
        worker: Arc<dyn WorkerTrigger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            fallback: None,
            generator,
            gate,
            worker,
            tasks: DetachedTasks::new(),
            clock: Arc::new(SystemClock),
            modes: ModeResolver::from_config(&config),
            config,
        }
    }

    /// Store used when the primary one is unavailable. Never used in
    /// production.
    pub fn with_fallback(mut self, fallback: Arc<dyn ReportStore>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tasks(&self) -> &DetachedTasks {
        &self.tasks
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Handle a report request.
    pub async fn generate(&self, request: GenerateRequest) -> Result<Delivery, OrchestratorError> {
        let mode = self.modes.resolve(request.session_id());
        debug!(step = Step::Received.as_str(), mode = mode.as_str(), "orchestrator step");

        // Demo and test sessions never touch real payments.
        let supplied_ref = if mode.bypasses_payment() {
            None
        } else {
            request.payment_intent_id().map(str::to_string)
        };

        let report_type = match request.report_type.parse::<ReportType>() {
            Ok(t) => t,
            Err(e) => {
                return Err(self
                    .reject(
                        ErrorCode::ValidationFailed,
                        Step::Received,
                        e.to_string(),
                        false,
                        supplied_ref.as_deref(),
                        CancelReason::InvalidRequest,
                    )
                    .await);
            }
        };
        let paid = report_type.is_paid() && !mode.bypasses_payment();

        // Only a verified payment may ever be settled. An authorization sent
        // with a free report is released and otherwise ignored.
        let supplied_ref = match supplied_ref {
            Some(payment_ref) if !paid => {
                warn!(
                    payment_ref = %payment_ref,
                    report_type = %report_type,
                    "payment supplied for a report that needs none, releasing"
                );
                self.spawn_release(payment_ref, CancelReason::InvalidRequest);
                None
            }
            other => other,
        };

        let input = match self.validate_input(&request, report_type) {
            Ok(input) => input,
            Err(message) => {
                return Err(self
                    .reject(
                        ErrorCode::ValidationFailed,
                        Step::Received,
                        message,
                        paid,
                        supplied_ref.as_deref(),
                        CancelReason::InvalidRequest,
                    )
                    .await);
            }
        };
        debug!(step = Step::ValidatedInput.as_str(), report_type = %report_type, "orchestrator step");

        if paid && request.payment_token().is_none() && request.session_id().is_none() {
            return Err(self
                .reject(
                    ErrorCode::PaymentVerificationRequired,
                    Step::ValidatedInput,
                    format!("{} is a paid report and requires a payment", report_type.display_name()),
                    paid,
                    supplied_ref.as_deref(),
                    CancelReason::VerificationFailed,
                )
                .await);
        }
        debug!(step = Step::AccessChecked.as_str(), report_type = %report_type, "orchestrator step");

        let mut session = request.session_discriminator();
        if request.bypass_cache {
            if mode.may_bypass_cache() {
                info!(report_type = %report_type, "cache bypass requested by test session");
                session = idempotency::cache_bypass_session(&session);
            } else {
                debug!("cache bypass ignored outside test sessions");
            }
        }
        let key = idempotency::derive_key(&input, report_type, &session);

        let (store, existing) = match self.lookup_key(&key).await {
            Ok(found) => found,
            Err(e) => {
                return Err(self
                    .reject(
                        ErrorCode::ServiceUnavailable,
                        Step::AccessChecked,
                        format!("report store unavailable: {e}"),
                        paid,
                        supplied_ref.as_deref(),
                        CancelReason::StoreUnavailable,
                    )
                    .await
                    .with_retry_after(STORE_RETRY_AFTER));
            }
        };
        debug!(step = Step::IdempotencyChecked.as_str(), key = %key, hit = existing.is_some(), "orchestrator step");

        let lock = match self
            .acquire(&store, &key, &session, existing, report_type, &input, supplied_ref.clone())
            .await
        {
            Ok(lock) => lock,
            Err(e) => {
                return Err(self
                    .reject(
                        ErrorCode::ServiceUnavailable,
                        Step::IdempotencyChecked,
                        format!("report store unavailable: {e}"),
                        paid,
                        supplied_ref.as_deref(),
                        CancelReason::StoreUnavailable,
                    )
                    .await
                    .with_retry_after(STORE_RETRY_AFTER));
            }
        };

        let (record, orphaned_payment) = match lock {
            Lock::Owned {
                record,
                orphaned_payment,
            } => (record, orphaned_payment),
            Lock::Busy(delivery) => {
                if let Some(supplied) = &supplied_ref {
                    self.release_duplicate(&store, &key, supplied).await;
                }
                return Ok(delivery);
            }
        };
        step(&record.report_id, Step::LockAcquired);

        let mut job = Job {
            store,
            key,
            report_id: record.report_id,
            attempt: record.attempt,
            report_type,
            input,
            session_key: session,
            payment_ref: supplied_ref.clone(),
        };

        if paid {
            let verified = self.verify_payment(&request, mode, &job).await?;
            self.release_unused(supplied_ref.as_deref(), &verified, CancelReason::Duplicate);
            if let Err(e) = job
                .store
                .attach_payment(&job.key, &job.lease(), verified.clone())
                .await
            {
                warn!(report_id = %job.report_id, error = %e, "could not record payment reference");
            }
            job.payment_ref = Some(verified);
        }
        if let Some(orphan) = orphaned_payment
            && job.payment_ref.as_deref() != Some(orphan.as_str())
        {
            self.spawn_release(orphan, CancelReason::StaleLock);
        }
        step(&job.report_id, Step::PaymentVerified);

        if report_type.is_heavy() {
            self.spawn_worker_trigger(job.report_id.clone());
            return Ok(Delivery::Processing {
                retry_after: lock::retry_after(report_type),
                report_id: job.report_id,
            });
        }

        self.run(job).await
    }

    /// Worker entry point: generate a heavy report whose request already
    /// returned `processing`.
    pub async fn process(&self, report_id: &str) -> Result<Delivery, OrchestratorError> {
        let (store, record) = self.find_report(report_id).await?;
        if record.status != ReportStatus::Processing {
            info!(report_id, status = ?record.status, "worker skipping report that is not processing");
            return self.observe(record);
        }

        // A record some owner is already generating is left alone unless that
        // owner has stopped heartbeating.
        let state = lock::assess(&record, self.clock.now());
        if record.generation_started && !matches!(state, LockState::Stale { .. }) {
            info!(report_id, attempt = record.attempt, "report already being generated");
            return self.observe(record);
        }

        let job = match store.claim(&record.idempotency_key, record.attempt).await {
            Ok(ReclaimOutcome::Reclaimed(record)) => {
                info!(report_id, attempt = record.attempt, "worker claimed report");
                Job::from_record(store, record)
            }
            Ok(ReclaimOutcome::Lost(current)) => {
                info!(report_id, "report claimed elsewhere");
                return self.observe(current);
            }
            Err(e) => {
                return Err(OrchestratorError::new(
                    ErrorCode::ServiceUnavailable,
                    Step::LockAcquired,
                    format!("report store unavailable: {e}"),
                )
                .with_report(report_id)
                .with_retry_after(STORE_RETRY_AFTER));
            }
        };

        self.run(job).await
    }

    /// Status of a previously created report. A PROCESSING record that has
    /// gone stale is failed and its payment released.
    pub async fn poll(&self, report_id: &str) -> Result<Delivery, OrchestratorError> {
        let (store, record) = self.find_report(report_id).await?;
        match lock::assess(&record, self.clock.now()) {
            LockState::Stale { age } => {
                warn!(report_id, age_secs = age.as_secs(), "report went stale, failing it");
                let job = Job::from_record(store, record);
                Err(self
                    .fail_report(
                        &job,
                        ErrorCode::GenerationTimeout,
                        Step::Generating,
                        "report generation stopped responding".to_string(),
                        CancelReason::StaleLock,
                    )
                    .await)
            }
            _ => self.observe(record),
        }
    }

    /// The single regeneration path, shared by every report type.
    pub async fn regenerate(
        &self,
        report_type: ReportType,
        input: &NormalizedInput,
        context: &RegenerationContext,
    ) -> Result<ReportContent, GenerationError> {
        let request = GenerationRequest {
            report_type,
            input: input.clone(),
            report_id: context.report_id.clone(),
            session_key: context.session_key.clone(),
            attempt: Attempt::Regeneration {
                reason: context.reason.clone(),
            },
        };
        info!(report_id = %context.report_id, reason = %context.reason, "regenerating report");
        match tokio::time::timeout_at(context.deadline, self.generator.generate(&request)).await {
            Ok(result) => result.map(|output| output.content),
            Err(_) => Err(GenerationError::Failed(
                "regeneration ran past the time budget".into(),
            )),
        }
    }

    fn validate_input(
        &self,
        request: &GenerateRequest,
        report_type: ReportType,
    ) -> Result<NormalizedInput, String> {
        let decision_context = non_empty(request.decision_context.as_deref());
        if report_type.requires_decision_context() && decision_context.is_none() {
            return Err(format!(
                "decisionContext is required for {} reports",
                report_type.as_str()
            ));
        }
        let today = self
            .clock
            .now()
            .to_zoned(jiff::tz::TimeZone::UTC)
            .date();
        request
            .input
            .normalize(decision_context, today)
            .map_err(|e| e.to_string())
    }

    fn fallback_store(&self) -> Option<&Arc<dyn ReportStore>> {
        if self.config.environment.is_production() {
            None
        } else {
            self.fallback.as_ref()
        }
    }

    async fn lookup_key(
        &self,
        key: &str,
    ) -> Result<(Arc<dyn ReportStore>, Option<ReportRecord>), StorageError> {
        match self.store.get_by_key(key).await {
            Ok(record) => Ok((self.store.clone(), record)),
            Err(e) if e.is_unavailable() => match self.fallback_store() {
                Some(fallback) => {
                    warn!(error = %e, "primary report store unavailable, using in-memory fallback");
                    Ok((fallback.clone(), fallback.get_by_key(key).await?))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn lookup_id(
        &self,
        report_id: &str,
    ) -> Result<(Arc<dyn ReportStore>, Option<ReportRecord>), StorageError> {
        match self.store.get_by_id(report_id).await {
            Ok(record) => Ok((self.store.clone(), record)),
            Err(e) if e.is_unavailable() => match self.fallback_store() {
                Some(fallback) => {
                    warn!(error = %e, "primary report store unavailable, using in-memory fallback");
                    Ok((fallback.clone(), fallback.get_by_id(report_id).await?))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    async fn find_report(
        &self,
        report_id: &str,
    ) -> Result<(Arc<dyn ReportStore>, ReportRecord), OrchestratorError> {
        if !idempotency::is_valid_report_id(report_id) {
            return Err(OrchestratorError::new(
                ErrorCode::ValidationFailed,
                Step::Received,
                format!("malformed report id {report_id:?}"),
            ));
        }
        match self.lookup_id(report_id).await {
            Ok((store, Some(record))) => Ok((store, record)),
            Ok((_, None)) => Err(OrchestratorError::new(
                ErrorCode::NotFound,
                Step::IdempotencyChecked,
                format!("no report with id {report_id}"),
            )),
            Err(e) => Err(OrchestratorError::new(
                ErrorCode::ServiceUnavailable,
                Step::IdempotencyChecked,
                format!("report store unavailable: {e}"),
            )
            .with_retry_after(STORE_RETRY_AFTER)),
        }
    }

    /// Take the processing lock for `key`, or explain why someone else has it.
    #[allow(clippy::too_many_arguments)]
    async fn acquire(
        &self,
        store: &Arc<dyn ReportStore>,
        key: &str,
        session: &str,
        existing: Option<ReportRecord>,
        report_type: ReportType,
        input: &NormalizedInput,
        supplied_ref: Option<String>,
    ) -> Result<Lock, StorageError> {
        let record = match existing {
            Some(record) => record,
            None => {
                let now = self.clock.now();
                let fresh = ReportRecord::new_processing(
                    key,
                    idempotency::new_report_id(now),
                    report_type,
                    input.clone(),
                    supplied_ref.clone(),
                    now,
                )
                .with_session_key(session);
                match store.create_processing(fresh).await? {
                    CreateOutcome::Created(record) => {
                        info!(report_id = %record.report_id, report_type = %report_type, "report created");
                        AuditEvent::report(AuditAction::ReportCreated, &record.report_id)
                            .with_details(json!({ "reportType": report_type.as_str() }))
                            .emit();
                        return Ok(Lock::Owned {
                            record,
                            orphaned_payment: None,
                        });
                    }
                    CreateOutcome::Existing(record) => record,
                }
            }
        };

        let state = lock::assess(&record, self.clock.now());
        if !state.is_reclaimable() {
            return Ok(Lock::Busy(self.busy(record, state)));
        }

        let orphaned_payment = match (state, record.payment_state) {
            (LockState::Stale { .. }, PaymentState::Authorized) => record.payment_intent_ref.clone(),
            _ => None,
        };
        match store.reclaim(key, record.attempt, supplied_ref).await? {
            ReclaimOutcome::Reclaimed(record) => {
                info!(
                    report_id = %record.report_id,
                    attempt = record.attempt,
                    previous = ?state,
                    "report reclaimed"
                );
                AuditEvent::report(AuditAction::ReportReclaimed, &record.report_id)
                    .with_details(json!({ "attempt": record.attempt }))
                    .emit();
                Ok(Lock::Owned {
                    record,
                    orphaned_payment,
                })
            }
            ReclaimOutcome::Lost(current) => {
                let state = lock::assess(&current, self.clock.now());
                Ok(Lock::Busy(self.busy(current, state)))
            }
        }
    }

    /// Response for a request that found the lock held or the work done.
    fn busy(&self, record: ReportRecord, state: LockState) -> Delivery {
        match (state, self.replay(&record)) {
            (LockState::Completed, Some(delivered)) => Delivery::Delivered(delivered),
            _ => {
                debug!(report_id = %record.report_id, ?state, "report already in progress");
                Delivery::Processing {
                    retry_after: lock::retry_after(record.report_type),
                    report_id: record.report_id,
                }
            }
        }
    }

    fn replay(&self, record: &ReportRecord) -> Option<Delivered> {
        let content = record.content.clone()?;
        info!(report_id = %record.report_id, "serving completed report");
        Some(Delivered {
            report_id: record.report_id.clone(),
            report_type: record.report_type,
            content,
            payment: PaymentStatus::from_record(record),
            replayed: true,
        })
    }

    /// The client-facing view of a stored record.
    fn observe(&self, record: ReportRecord) -> Result<Delivery, OrchestratorError> {
        match record.status {
            ReportStatus::Completed => match self.replay(&record) {
                Some(delivered) => Ok(Delivery::Delivered(delivered)),
                None => Err(OrchestratorError::new(
                    ErrorCode::GenerationFailed,
                    Step::Terminal,
                    "completed report has no content",
                )
                .with_report(record.report_id)),
            },
            ReportStatus::Processing => Ok(Delivery::Processing {
                retry_after: lock::retry_after(record.report_type),
                report_id: record.report_id,
            }),
            ReportStatus::Failed => {
                let code = record
                    .error_code
                    .as_deref()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(ErrorCode::GenerationFailed);
                let paid = record.report_type.is_paid() || record.payment_intent_ref.is_some();
                Err(OrchestratorError::new(
                    code,
                    Step::Terminal,
                    record
                        .error_message
                        .unwrap_or_else(|| "report generation failed".to_string()),
                )
                .with_report(record.report_id)
                .with_payment_cancelled(paid))
            }
        }
    }

    /// Verify the request's payment credentials. A payment token is tried
    /// first, then the checkout session. Returns the authorization to settle.
    async fn verify_payment(
        &self,
        request: &GenerateRequest,
        mode: ExecutionMode,
        job: &Job,
    ) -> Result<String, OrchestratorError> {
        let mut credentials = Vec::with_capacity(2);
        if let Some(token) = request.payment_token() {
            credentials.push(Credential::Token(token.to_string()));
        }
        if let Some(session) = request.session_id() {
            credentials.push(Credential::CheckoutSession(session.to_string()));
        }

        let mut last = Verification::default();
        for credential in &credentials {
            match self.gate.verify(Some(credential), mode).await {
                Ok(v) => {
                    if v.covers(job.report_type)
                        && let Some(payment_ref) = v.payment_intent.clone()
                    {
                        info!(report_id = %job.report_id, payment_ref = %payment_ref, "payment verified");
                        return Ok(payment_ref);
                    }
                    if v.valid {
                        warn!(
                            report_id = %job.report_id,
                            paid_for = ?v.report_type,
                            requested = %job.report_type,
                            "payment is for a different report type"
                        );
                    }
                    last = v;
                }
                Err(e) => {
                    let (code, retry_after) = match e {
                        starchart_billing::BillingError::NotConfigured(_) => {
                            (ErrorCode::ServiceUnavailable, STORE_RETRY_AFTER)
                        }
                        _ => (ErrorCode::DependencyFailure, DEPENDENCY_RETRY_AFTER),
                    };
                    let failing = Job {
                        payment_ref: last.payment_intent.clone().or(job.payment_ref.clone()),
                        ..job.clone()
                    };
                    if let Some(cancelled) = &failing.payment_ref {
                        self.release_unused(
                            job.payment_ref.as_deref(),
                            cancelled,
                            CancelReason::VerificationFailed,
                        );
                    }
                    return Err(self
                        .fail_report(
                            &failing,
                            code,
                            Step::LockAcquired,
                            format!("payment verification unavailable: {e}"),
                            CancelReason::VerificationFailed,
                        )
                        .await
                        .with_retry_after(retry_after));
                }
            }
        }

        // A bad token with no checkout session to fall back on means no
        // usable payment was presented at all.
        let code = if request.session_id().is_none() {
            ErrorCode::PaymentVerificationRequired
        } else {
            ErrorCode::PaymentVerificationFailed
        };
        let failing = Job {
            payment_ref: last.payment_intent.clone().or(job.payment_ref.clone()),
            ..job.clone()
        };
        if let Some(cancelled) = &failing.payment_ref {
            self.release_unused(
                job.payment_ref.as_deref(),
                cancelled,
                CancelReason::VerificationFailed,
            );
        }
        Err(self
            .fail_report(
                &failing,
                code,
                Step::LockAcquired,
                last.reason
                    .unwrap_or_else(|| "payment could not be verified".to_string()),
                CancelReason::VerificationFailed,
            )
            .await)
    }

    /// GENERATING through TERMINAL for an owned record.
    async fn run(&self, job: Job) -> Result<Delivery, OrchestratorError> {
        let heartbeat = Heartbeat::start(
            job.store.clone(),
            job.key.clone(),
            job.lease(),
            self.config.heartbeat_interval,
        );
        step(&job.report_id, Step::Generating);

        let budget = job.report_type.profile().timeout_budget;
        let deadline = Instant::now() + budget;
        let request = GenerationRequest {
            report_type: job.report_type,
            input: job.input.clone(),
            report_id: job.report_id.clone(),
            session_key: job.session_key.clone(),
            attempt: Attempt::Primary,
        };

        let output = match tokio::time::timeout_at(deadline, self.generator.generate(&request)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                drop(heartbeat);
                return Err(self.fail_generation(&job, e).await);
            }
            Err(_) => {
                drop(heartbeat);
                return Err(self
                    .fail_report(
                        &job,
                        ErrorCode::GenerationTimeout,
                        Step::Generating,
                        format!("generation exceeded {}s", budget.as_secs()),
                        CancelReason::GenerationTimeout,
                    )
                    .await);
            }
        };
        info!(
            report_id = %job.report_id,
            model = %output.model_id,
            input_tokens = output.usage.tokens.input,
            output_tokens = output.usage.tokens.output,
            cost_usd = output.usage.cost_usd,
            "content generated"
        );

        step(&job.report_id, Step::Validating);
        let content = self.validate_and_repair(&job, output.content, deadline).await;
        drop(heartbeat);

        match content {
            Ok(content) => self.deliver(&job, content).await,
            Err(e) => Err(e),
        }
    }

    async fn validate_and_repair(
        &self,
        job: &Job,
        mut content: ReportContent,
        deadline: Instant,
    ) -> Result<ReportContent, OrchestratorError> {
        let outcome = validation::validate(&content, job.report_type);
        if outcome.passed() {
            return Ok(content);
        }
        info!(report_id = %job.report_id, failures = %outcome.summary(), "content failed validation");

        if let Some(placeholder) = outcome.placeholder() {
            if placeholder.severity == Severity::Fatal {
                return Err(self
                    .fail_report(
                        job,
                        ErrorCode::MockContentDetected,
                        Step::Validating,
                        format!("generated report {}", placeholder.reason),
                        CancelReason::MockContent,
                    )
                    .await);
            }

            let context = RegenerationContext {
                report_id: job.report_id.clone(),
                session_key: job.session_key.clone(),
                reason: placeholder.reason.to_string(),
                deadline,
            };
            match self.regenerate(job.report_type, &job.input, &context).await {
                Ok(regenerated) => content = regenerated,
                Err(e) => {
                    warn!(report_id = %job.report_id, error = %e, "regeneration failed, repairing first draft");
                }
            }
            if validation::find_placeholder(&content.full_text()).is_some() {
                let removed = repair::strip_placeholders(&mut content);
                info!(report_id = %job.report_id, removed, "placeholder sentences stripped");
            }
            if validation::validate(&content, job.report_type).passed() {
                return Ok(content);
            }
        }

        step(&job.report_id, Step::Repairing);
        repair::repair(&mut content, job.report_type, &job.input);

        let revalidated = validation::validate(&content, job.report_type);
        if !revalidated.passed() {
            warn!(
                report_id = %job.report_id,
                failures = %revalidated.summary(),
                "content still below standard after repair, delivering at low quality"
            );
            repair::mark_low_quality(&mut content);
        }
        Ok(content)
    }

    async fn deliver(&self, job: &Job, content: ReportContent) -> Result<Delivery, OrchestratorError> {
        step(&job.report_id, Step::Terminal);
        match job
            .store
            .complete(&job.key, &job.lease(), content.clone())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // Another attempt owns the record now. Our authorization is
                // released unless that attempt carries it forward.
                warn!(
                    report_id = %job.report_id,
                    attempt = job.attempt,
                    "lost ownership before completion, discarding result"
                );
                if let Some(payment_ref) = &job.payment_ref
                    && !self.payment_in_use(job, payment_ref).await
                {
                    self.gate.cancel(payment_ref, CancelReason::Duplicate).await;
                }
                return match job.store.get_by_key(&job.key).await {
                    Ok(Some(current)) => self.observe(current),
                    _ => Ok(Delivery::Processing {
                        report_id: job.report_id.clone(),
                        retry_after: lock::retry_after(job.report_type),
                    }),
                };
            }
            Err(e) => {
                return Err(self
                    .fail_report(
                        job,
                        ErrorCode::ServiceUnavailable,
                        Step::Terminal,
                        format!("report could not be stored: {e}"),
                        CancelReason::StoreUnavailable,
                    )
                    .await
                    .with_retry_after(STORE_RETRY_AFTER));
            }
        }

        AuditEvent::report(AuditAction::ReportCompleted, &job.report_id)
            .with_details(json!({
                "reportType": job.report_type.as_str(),
                "words": content.word_count(),
                "quality": content.quality,
            }))
            .emit();

        if content.quality == Quality::Low {
            AuditEvent::report(AuditAction::ReportLowQuality, &job.report_id)
                .with_details(json!({ "paymentRef": job.payment_ref }))
                .emit();
        }

        let payment = match (&job.payment_ref, content.quality) {
            (None, _) if job.report_type.is_paid() => PaymentStatus::Bypassed,
            (None, _) => PaymentStatus::NotRequired,
            (Some(payment_ref), Quality::Standard) => {
                self.set_payment_state(job, PaymentState::CapturePending).await;
                self.spawn_settlement(job, payment_ref.clone());
                PaymentStatus::CapturePending
            }
            (Some(_), Quality::Low) => {
                self.set_payment_state(job, PaymentState::NotCharged).await;
                PaymentStatus::NotCharged
            }
        };

        info!(
            report_id = %job.report_id,
            quality = ?content.quality,
            payment = ?payment,
            "report delivered"
        );
        Ok(Delivery::Delivered(Delivered {
            report_id: job.report_id.clone(),
            report_type: job.report_type,
            content,
            payment,
            replayed: false,
        }))
    }

    async fn fail_generation(&self, job: &Job, e: GenerationError) -> OrchestratorError {
        let message = e.to_string();
        match e {
            GenerationError::RateLimited { retry_after } => self
                .fail_report(
                    job,
                    ErrorCode::RateLimitExceeded,
                    Step::Generating,
                    message,
                    CancelReason::GenerationFailed,
                )
                .await
                .with_retry_after(retry_after.unwrap_or(RATE_LIMIT_RETRY_AFTER)),
            GenerationError::Unavailable(_) => self
                .fail_report(
                    job,
                    ErrorCode::ServiceUnavailable,
                    Step::Generating,
                    message,
                    CancelReason::GenerationFailed,
                )
                .await
                .with_retry_after(STORE_RETRY_AFTER),
            GenerationError::DependencyFailure(_) => self
                .fail_report(
                    job,
                    ErrorCode::DependencyFailure,
                    Step::Generating,
                    message,
                    CancelReason::GenerationFailed,
                )
                .await
                .with_retry_after(DEPENDENCY_RETRY_AFTER),
            GenerationError::Failed(_) | GenerationError::InvalidOutput(_) => {
                self.fail_report(
                    job,
                    ErrorCode::GenerationFailed,
                    Step::Generating,
                    message,
                    CancelReason::GenerationFailed,
                )
                .await
            }
        }
    }

    /// Mark an owned record FAILED and release its payment.
    async fn fail_report(
        &self,
        job: &Job,
        code: ErrorCode,
        stage: Step,
        message: String,
        reason: CancelReason,
    ) -> OrchestratorError {
        error!(
            report_id = %job.report_id,
            code = %code,
            step = stage.as_str(),
            error = %message,
            "report failed"
        );

        let still_owner = match job
            .store
            .fail(&job.key, &job.lease(), message.clone(), code.as_str().to_string())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(report_id = %job.report_id, "record no longer processing, failure not recorded");
                false
            }
            Err(e) => {
                warn!(report_id = %job.report_id, error = %e, "could not record failure");
                true
            }
        };
        AuditEvent::report(AuditAction::ReportFailed, &job.report_id)
            .with_details(json!({ "code": code, "step": stage.as_str() }))
            .emit();

        if let Some(payment_ref) = &job.payment_ref {
            if still_owner || !self.payment_in_use(job, payment_ref).await {
                let cancelled = self.gate.cancel(payment_ref, reason).await;
                let state = if cancelled {
                    PaymentState::Cancelled
                } else {
                    PaymentState::ManualReview
                };
                self.set_payment_state(job, state).await;
            }
        }

        OrchestratorError::new(code, stage, message)
            .with_report(job.report_id.clone())
            .with_payment_cancelled(job.paid())
    }

    /// Another attempt has taken the record over and may be relying on the
    /// same authorization.
    async fn payment_in_use(&self, job: &Job, payment_ref: &str) -> bool {
        match job.store.get_by_key(&job.key).await {
            Ok(Some(current)) => {
                current.status != ReportStatus::Failed
                    && current.payment_intent_ref.as_deref() == Some(payment_ref)
            }
            _ => false,
        }
    }

    /// Fail a request that never reached the processing lock.
    async fn reject(
        &self,
        code: ErrorCode,
        stage: Step,
        message: String,
        paid: bool,
        supplied_ref: Option<&str>,
        reason: CancelReason,
    ) -> OrchestratorError {
        warn!(code = %code, step = stage.as_str(), error = %message, "request rejected");
        if let Some(payment_ref) = supplied_ref {
            self.gate.cancel(payment_ref, reason).await;
        }
        OrchestratorError::new(code, stage, message)
            .with_payment_cancelled(paid || supplied_ref.is_some())
    }

    async fn set_payment_state(&self, job: &Job, state: PaymentState) {
        if let Err(e) = job
            .store
            .set_payment_state(&job.key, &job.lease(), state)
            .await
        {
            warn!(report_id = %job.report_id, ?state, error = %e, "could not record payment state");
        }
    }

    fn spawn_settlement(&self, job: &Job, payment_ref: String) {
        let gate = self.gate.clone();
        let store = job.store.clone();
        let key = job.key.clone();
        let lease = job.lease();
        self.tasks.spawn(
            "payment.settle",
            self.config.capture_task_timeout,
            async move {
                let state = match gate.settle(&payment_ref).await {
                    SettleOutcome::Captured => PaymentState::Captured,
                    SettleOutcome::Released => PaymentState::Cancelled,
                    SettleOutcome::ManualReview => PaymentState::ManualReview,
                };
                store.set_payment_state(&key, &lease, state).await
            },
        );
    }

    fn spawn_release(&self, payment_ref: String, reason: CancelReason) {
        let gate = self.gate.clone();
        self.tasks.spawn(
            "payment.release",
            self.config.capture_task_timeout,
            async move {
                if gate.cancel(&payment_ref, reason).await {
                    Ok(())
                } else {
                    Err(format!("could not release {payment_ref}"))
                }
            },
        );
    }

    /// Release a client-supplied authorization that lost out to `kept`.
    fn release_unused(&self, supplied: Option<&str>, kept: &str, reason: CancelReason) {
        if let Some(supplied) = supplied
            && supplied != kept
        {
            info!(payment_ref = supplied, kept, "releasing unused payment authorization");
            self.spawn_release(supplied.to_string(), reason);
        }
    }

    /// A second authorization for a report that is in progress or already
    /// delivered is released, unless it is the one the record is using.
    async fn release_duplicate(&self, store: &Arc<dyn ReportStore>, key: &str, supplied: &str) {
        let in_use = match store.get_by_key(key).await {
            Ok(Some(record)) => record.payment_intent_ref.as_deref() == Some(supplied),
            _ => true,
        };
        if !in_use {
            info!(payment_ref = supplied, "releasing duplicate payment authorization");
            self.spawn_release(supplied.to_string(), CancelReason::Duplicate);
        }
    }

    fn spawn_worker_trigger(&self, report_id: String) {
        let worker = self.worker.clone();
        info!(report_id = %report_id, "handing heavy report to worker");
        self.tasks.spawn(
            "worker.trigger",
            self.config.worker_trigger_timeout + Duration::from_secs(1),
            async move { worker.trigger(&report_id).await },
        );
    }
}
