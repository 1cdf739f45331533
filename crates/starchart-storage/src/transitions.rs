//! Record transitions shared by every backend. Each returns whether the
//! record changed; backends persist only when it did.

use starchart_core::models::report::{PaymentState, ReportContent, ReportRecord, ReportStatus};

use crate::store::Lease;

fn owns(record: &ReportRecord, lease: &Lease) -> bool {
    lease.matches(record)
}

pub(crate) fn reclaim(
    record: &mut ReportRecord,
    expected_attempt: u32,
    payment_ref: Option<String>,
    now: jiff::Timestamp,
) -> bool {
    if record.attempt != expected_attempt || record.status == ReportStatus::Completed {
        return false;
    }
    record.attempt += 1;
    record.status = ReportStatus::Processing;
    record.generation_started = !record.report_type.is_heavy();
    record.content = None;
    record.error_code = None;
    record.error_message = None;
    record.updated_at = now;
    if let Some(payment_ref) = payment_ref {
        record.payment_intent_ref = Some(payment_ref);
        record.payment_state = PaymentState::Authorized;
    }
    true
}

pub(crate) fn claim(record: &mut ReportRecord, expected_attempt: u32, now: jiff::Timestamp) -> bool {
    if record.attempt != expected_attempt || record.status != ReportStatus::Processing {
        return false;
    }
    record.attempt += 1;
    record.generation_started = true;
    record.updated_at = now;
    true
}

pub(crate) fn attach_payment(
    record: &mut ReportRecord,
    lease: &Lease,
    payment_ref: String,
    now: jiff::Timestamp,
) -> bool {
    if !owns(record, lease) || record.status != ReportStatus::Processing {
        return false;
    }
    if record.payment_intent_ref.as_deref() == Some(payment_ref.as_str()) {
        return false;
    }
    record.payment_intent_ref = Some(payment_ref);
    record.payment_state = PaymentState::Authorized;
    record.updated_at = now;
    true
}

pub(crate) fn complete(
    record: &mut ReportRecord,
    lease: &Lease,
    content: ReportContent,
    now: jiff::Timestamp,
) -> bool {
    if !owns(record, lease) || record.status != ReportStatus::Processing {
        return false;
    }
    record.status = ReportStatus::Completed;
    record.content = Some(content);
    record.error_code = None;
    record.error_message = None;
    record.updated_at = now;
    true
}

pub(crate) fn fail(
    record: &mut ReportRecord,
    lease: &Lease,
    message: String,
    code: String,
    now: jiff::Timestamp,
) -> bool {
    if !owns(record, lease) || record.status != ReportStatus::Processing {
        return false;
    }
    record.status = ReportStatus::Failed;
    record.error_message = Some(message);
    record.error_code = Some(code);
    record.updated_at = now;
    true
}

pub(crate) fn heartbeat(record: &mut ReportRecord, lease: &Lease, now: jiff::Timestamp) -> bool {
    if !owns(record, lease) || record.status != ReportStatus::Processing {
        return false;
    }
    record.updated_at = now;
    true
}

pub(crate) fn set_payment_state(
    record: &mut ReportRecord,
    lease: &Lease,
    state: PaymentState,
) -> bool {
    if !owns(record, lease) || record.payment_state == state {
        return false;
    }
    record.payment_state = state;
    true
}
