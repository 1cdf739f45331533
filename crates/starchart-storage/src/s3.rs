use std::sync::Arc;

use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use starchart_core::clock::{Clock, SystemClock};
use starchart_core::models::report::{PaymentState, ReportContent, ReportRecord};
use starchart_core::store_keys;

use crate::error::StorageError;
use crate::objects;
use crate::store::{BoxFuture, CreateOutcome, Lease, ReclaimOutcome, ReportStore};
use crate::transitions;

/// Re-read/re-write rounds before a conditional mutation gives up.
const MUTATE_RETRY_LIMIT: usize = 3;

/// Points a report id back at its record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportIndexEntry {
    idempotency_key: String,
}

/// Durable report table on S3.
///
/// One JSON object per idempotency key. Insert-if-absent relies on
/// `If-None-Match: *`; every later write is a read-modify-write guarded by
/// `If-Match` on the ETag that was read.
#[derive(Clone)]
pub struct S3ReportStore {
    s3: Client,
    bucket: String,
    clock: Arc<dyn Clock>,
}

impl S3ReportStore {
    pub fn new(s3: Client, bucket: impl Into<String>) -> Self {
        Self {
            s3,
            bucket: bucket.into(),
            clock: Arc::new(SystemClock),
        }
    }

    async fn load(&self, key: &str) -> Result<Option<(ReportRecord, String)>, StorageError> {
        let object_key = store_keys::record(key);
        match objects::get_object(&self.s3, &self.bucket, &object_key).await {
            Ok(output) => {
                let record: ReportRecord =
                    serde_json::from_slice(&output.body).map_err(|e| StorageError::Corrupt {
                        key: object_key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Some((record, output.etag.unwrap_or_default())))
            }
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Ownership transfer. Single shot: losing the If-Match means someone
    /// else touched the record (heartbeat, reclaim, terminal write) and the
    /// caller must re-assess rather than retry blindly.
    async fn swap(
        &self,
        key: &str,
        apply: impl FnOnce(&mut ReportRecord, jiff::Timestamp) -> bool,
    ) -> Result<ReclaimOutcome, StorageError> {
        let object_key = store_keys::record(key);
        let Some((mut record, etag)) = self.load(key).await? else {
            return Err(StorageError::NotFound { key: object_key });
        };
        if !apply(&mut record, self.clock.now()) {
            return Ok(ReclaimOutcome::Lost(record));
        }

        let body = serde_json::to_vec_pretty(&record)?;
        match objects::put_json_if_match(&self.s3, &self.bucket, &object_key, body, &etag).await {
            Ok(_) => Ok(ReclaimOutcome::Reclaimed(record)),
            Err(StorageError::PreconditionFailed { .. }) => match self.load(key).await? {
                Some((current, _)) => Ok(ReclaimOutcome::Lost(current)),
                None => Err(StorageError::NotFound { key: object_key }),
            },
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write with optimistic locking. `apply` returns false when
    /// there is nothing to write, which short-circuits without a PUT.
    async fn mutate(
        &self,
        key: &str,
        mut apply: impl FnMut(&mut ReportRecord, jiff::Timestamp) -> bool,
    ) -> Result<bool, StorageError> {
        let object_key = store_keys::record(key);
        for attempt in 0..MUTATE_RETRY_LIMIT {
            let Some((mut record, etag)) = self.load(key).await? else {
                return Ok(false);
            };
            if !apply(&mut record, self.clock.now()) {
                return Ok(false);
            }
            let body = serde_json::to_vec_pretty(&record)?;
            match objects::put_json_if_match(&self.s3, &self.bucket, &object_key, body, &etag)
                .await
            {
                Ok(_) => return Ok(true),
                Err(StorageError::PreconditionFailed { .. }) => {
                    debug!(key = %object_key, attempt, "record changed underneath write, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::Conflict {
            key: object_key,
            attempts: MUTATE_RETRY_LIMIT,
        })
    }
}

impl ReportStore for S3ReportStore {
    fn get_by_key<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async move { Ok(self.load(key).await?.map(|(record, _)| record)) })
    }

    fn get_by_id<'a>(
        &'a self,
        report_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ReportRecord>, StorageError>> {
        Box::pin(async move {
            let index_key = store_keys::report_index(report_id);
            let entry: ReportIndexEntry =
                match objects::get_object(&self.s3, &self.bucket, &index_key).await {
                    Ok(output) => serde_json::from_slice(&output.body)?,
                    Err(StorageError::NotFound { .. }) => return Ok(None),
                    Err(e) => return Err(e),
                };
            // An index entry can outlive a lost insert race; only trust it if
            // the record it points at carries the same report id.
            Ok(self
                .load(&entry.idempotency_key)
                .await?
                .map(|(record, _)| record)
                .filter(|record| record.report_id == report_id))
        })
    }

    fn create_processing(
        &self,
        record: ReportRecord,
    ) -> BoxFuture<'_, Result<CreateOutcome, StorageError>> {
        Box::pin(async move {
            let key = record.idempotency_key.clone();

            // Index first: a dangling index entry is harmless, a record
            // without one cannot be polled.
            let index = serde_json::to_vec(&ReportIndexEntry {
                idempotency_key: key.clone(),
            })?;
            objects::put_json(
                &self.s3,
                &self.bucket,
                &store_keys::report_index(&record.report_id),
                index,
            )
            .await?;

            let body = serde_json::to_vec_pretty(&record)?;
            match objects::put_json_if_absent(&self.s3, &self.bucket, &store_keys::record(&key), body)
                .await
            {
                Ok(_) => Ok(CreateOutcome::Created(record)),
                Err(StorageError::PreconditionFailed { .. }) => match self.load(&key).await? {
                    Some((existing, _)) => Ok(CreateOutcome::Existing(existing)),
                    None => {
                        warn!(key = %key, "conditional insert lost but no record found");
                        Err(StorageError::Conflict { key, attempts: 1 })
                    }
                },
                Err(e) => Err(e),
            }
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
                .await
        })
    }

    fn claim<'a>(
        &'a self,
        key: &'a str,
        expected_attempt: u32,
    ) -> BoxFuture<'a, Result<ReclaimOutcome, StorageError>> {
        Box::pin(async move {
            self.swap(key, |r, now| transitions::claim(r, expected_attempt, now))
                .await
        })
    }

    fn attach_payment<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        payment_ref: String,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| {
                transitions::attach_payment(r, lease, payment_ref.clone(), now)
            })
            .await
        })
    }

    fn complete<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
        content: ReportContent,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| {
                transitions::complete(r, lease, content.clone(), now)
            })
            .await
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
                transitions::fail(r, lease, message.clone(), code.clone(), now)
            })
            .await
        })
    }

    fn heartbeat<'a>(
        &'a self,
        key: &'a str,
        lease: &'a Lease,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.mutate(key, |r, now| transitions::heartbeat(r, lease, now))
                .await?;
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
            self.mutate(key, |r, _| transitions::set_payment_state(r, lease, state))
                .await?;
            Ok(())
        })
    }
}
