use std::future::Future;
use std::pin::Pin;

use starchart_core::models::report::{PaymentState, ReportContent, ReportRecord};

use crate::error::StorageError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Proof of ownership of a PROCESSING record: its report id and the
/// attempt that was granted. Reclaim keeps the report id and bumps the
/// attempt, so a lease from an earlier attempt no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub report_id: String,
    pub attempt: u32,
}

impl Lease {
    pub fn new(report_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            report_id: report_id.into(),
            attempt,
        }
    }

    pub fn of(record: &ReportRecord) -> Self {
        Self::new(record.report_id.clone(), record.attempt)
    }

    pub fn matches(&self, record: &ReportRecord) -> bool {
        record.report_id == self.report_id && record.attempt == self.attempt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The caller now owns the PROCESSING lock.
    Created(ReportRecord),
    /// Someone got there first. This is the record they wrote.
    Existing(ReportRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReclaimOutcome {
    /// Ownership moved to the caller; `attempt` has been bumped.
    Reclaimed(ReportRecord),
    /// The record changed since it was read. This is what it looks like now.
    Lost(ReportRecord),
}

/// One record per idempotency key.
///
/// Owner writes take the caller's [`Lease`] and only apply while it still
/// matches the stored record. Terminal writes (`complete`, `fail`) also
/// require PROCESSING and return whether they applied. Every method
/// reports backend outages as [`StorageError::Unavailable`].
pub trait ReportStore: Send + Sync {
    fn get_by_key<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>>;

    fn get_by_id<'a>(
        &'a self,
        report_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>>;

    /// Atomic insert-if-absent of a PROCESSING record.
    fn create_processing(
        &self,
        record: ReportRecord,
    ) -> BoxFuture<'_, Result<CreateOutcome, StorageError>>;

    /// Take over a stale PROCESSING or a FAILED record, keeping its report id.
    /// Succeeds only if the stored `attempt` still equals `expected_attempt`
    /// and nothing else touched the record in between.
    fn reclaim<'a>(
        &'a self,
        key: &'a str,
        expected_attempt: u32,
        payment_ref: Option<String>,
    ) -> BoxFuture<'a, Result<ReclaimOutcome, StorageError>>;

    /// Worker pickup of a PROCESSING record: bumps `attempt` and marks
    /// generation as started, under the same compare-and-swap as `reclaim`.
    fn claim<'a>(
        &'a self,
        key: &'a str,
        expected_attempt: u32,
    ) -> BoxFuture<'a, Result<ReclaimOutcome, StorageError>>;

    fn attach_payment<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        payment_ref: String,
    ) -> BoxFuture<'a, Result<bool, StorageError>>;

    fn complete<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        content: ReportContent,
    ) -> BoxFuture<'a, Result<bool, StorageError>>;

    fn fail<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        message: String,
        code: String,
    ) -> BoxFuture<'a, Result<bool, StorageError>>;

    fn heartbeat<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn set_payment_state<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        state: PaymentState,
    ) -> BoxFuture<'a, Result<(), StorageError>>;
}
