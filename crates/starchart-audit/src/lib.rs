//! starchart-audit
//!
//! Application-level audit trail for report and payment lifecycle events.
//! Events are emitted through `tracing` and land in CloudWatch Logs next to
//! the request logs.

pub mod events;

pub use crate::events::{AuditAction, AuditEvent};
