//! starchart-storage
//!
//! The idempotency store. A `ReportStore` trait with a durable S3 backend
//! (conditional writes) and an in-memory backend for non-production use.

pub mod client;
pub mod error;
pub mod memory;
pub mod objects;
pub mod s3;
pub mod store;
mod transitions;

pub use crate::error::StorageError;
pub use crate::memory::MemoryReportStore;
pub use crate::s3::S3ReportStore;
pub use crate::store::{BoxFuture, CreateOutcome, Lease, ReclaimOutcome, ReportStore};
