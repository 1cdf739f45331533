//! Object key conventions for the durable report table.
//!
//! Pure string functions with no AWS SDK dependency.

pub const RECORDS_PREFIX: &str = "records/";

pub const REPORT_IDS_PREFIX: &str = "report-ids/";

pub fn record(idempotency_key: &str) -> String {
    format!("{RECORDS_PREFIX}{idempotency_key}.json")
}

pub fn report_index(report_id: &str) -> String {
    format!("{REPORT_IDS_PREFIX}{report_id}.json")
}
