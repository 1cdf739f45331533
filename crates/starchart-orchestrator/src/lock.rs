//! The processing lock is the PROCESSING status of a record. It is held as
//! long as the owner keeps heartbeating and becomes reclaimable once the
//! record has been idle for longer than its report type's threshold.

use std::time::Duration;

use starchart_core::models::report::{ReportRecord, ReportStatus};
use starchart_core::models::report_type::ReportType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Completed,
    InFlight { age: Duration },
    Stale { age: Duration },
    Failed,
}

impl LockState {
    /// A new attempt may take the record over.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, LockState::Stale { .. } | LockState::Failed)
    }
}

pub fn stale_threshold(report_type: ReportType) -> Duration {
    report_type.profile().stale_threshold
}

pub fn assess(record: &ReportRecord, now: jiff::Timestamp) -> LockState {
    match record.status {
        ReportStatus::Completed => LockState::Completed,
        ReportStatus::Failed => LockState::Failed,
        ReportStatus::Processing => {
            let age = record.idle_for(now);
            if age > stale_threshold(record.report_type) {
                LockState::Stale { age }
            } else {
                LockState::InFlight { age }
            }
        }
    }
}

/// How long a client should wait before polling a PROCESSING report.
pub fn retry_after(report_type: ReportType) -> Duration {
    if report_type.is_heavy() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(5)
    }
}
