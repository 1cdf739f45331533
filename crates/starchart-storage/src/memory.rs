use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use starchart_core::clock::{Clock, SystemClock};
use starchart_core::models::report::{PaymentState, ReportContent, ReportRecord};

use crate::error::StorageError;
use crate::store::{BoxFuture, CreateOutcome, Lease, ReclaimOutcome, ReportStore};
use crate::transitions;

#[derive(Default)]
struct Tables {
    records: HashMap<String, ReportRecord>,
    report_ids: HashMap<String, String>,
}

/// Process-local report store.
///
/// Not durable and not shared between instances, so it only ever backs
/// development and test deployments.
#[derive(Clone)]
pub struct MemoryReportStore {
    inner: Arc<Mutex<Tables>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Tables::default())),
            clock,
        }
    }

    /// Insert or overwrite a record as-is. For seeding fixtures.
    pub fn put(&self, record: ReportRecord) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        tables
            .report_ids
            .insert(record.report_id.clone(), record.idempotency_key.clone());
        tables
            .records
            .insert(record.idempotency_key.clone(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|t| t.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))
    }

    fn swap(
        &self,
        key: &str,
        apply: impl FnOnce(&mut ReportRecord, jiff::Timestamp) -> bool,
    ) -> Result<ReclaimOutcome, StorageError> {
        let now = self.clock.now();
        let mut tables = self.lock()?;
        let record = tables
            .records
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound { key: key.to_string() })?;
        if apply(record, now) {
            Ok(ReclaimOutcome::Reclaimed(record.clone()))
        } else {
            Ok(ReclaimOutcome::Lost(record.clone()))
        }
    }

    fn mutate(
        &self,
        key: &str,
        apply: impl FnOnce(&mut ReportRecord, jiff::Timestamp) -> bool,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let mut tables = self.lock()?;
        match tables.records.get_mut(key) {
            Some(record) => Ok(apply(record, now)),
            None => Ok(false),
        }
    }
}

impl ReportStore for MemoryReportStore {
    fn get_by_key<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async move { Ok(self.lock()?.records.get(key).cloned()) })
    }

    fn get_by_id<'a>(
        &'a self,
        report_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async move {
            let tables = self.lock()?;
            Ok(tables
                .report_ids
                .get(report_id)
                .and_then(|key| tables.records.get(key))
                .filter(|r| r.report_id == report_id)
                .cloned())
        })
    }

    fn create_processing(
        &self,
        record: ReportRecord,
    ) -> BoxFuture<'_, Result<CreateOutcome, StorageError>> {
        Box::pin(async move {
            let mut tables = self.lock()?;
            if let Some(existing) = tables.records.get(&record.idempotency_key) {
                return Ok(CreateOutcome::Existing(existing.clone()));
            }
            tables
                .report_ids
                .insert(record.report_id.clone(), record.idempotency_key.clone());
            tables
                .records
                .insert(record.idempotency_key.clone(), record.clone());
            Ok(CreateOutcome::Created(record))
        })
    }

    fn reclaim<'a>(
        &'a self,
        key: &'a str,
        expected_attempt: u32,
        payment_ref: Option<String>,
    ) -> BoxFuture<'a, Result<ReclaimOutcome, StorageError>> {
        Box::pin(async move {
            self.swap(key, |r, now| transitions::reclaim(r, expected_attempt, payment_ref, now))
        })
    }

    fn claim<'a>(
        &'a self,
        key: &'a str,
        expected_attempt: u32,
    ) -> BoxFuture<'a, Result<ReclaimOutcome, StorageError>> {
        Box::pin(async move { self.swap(key, |r, now| transitions::claim(r, expected_attempt, now)) })
    }

    fn attach_payment<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        payment_ref: String,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| {
                transitions::attach_payment(r, lease, payment_ref, now)
            })
        })
    }

    fn complete<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        content: ReportContent,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| transitions::complete(r, lease, content, now))
        })
    }

    fn fail<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        message: String,
        code: String,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| {
                transitions::fail(r, lease, message, code, now)
            })
        })
    }

    fn heartbeat<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| transitions::heartbeat(r, lease, now))?;
            Ok(())
        })
    }

    fn set_payment_state<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        state: PaymentState,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, _| transitions::set_payment_state(r, lease, state))?;
            Ok(())
        })
    }
}
