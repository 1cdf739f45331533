//! starchart-orchestrator
//!
//! The report generation pipeline: execution mode resolution, the processing
//! lock and its staleness policy, payment-safe sequencing around the content
//! generator, and validation and repair of generated content.

pub mod config;
pub mod detached;
pub mod error;
pub mod heartbeat;
pub mod lock;
pub mod mode;
pub mod orchestrator;
pub mod repair;
pub mod validation;
pub mod worker;

pub use crate::config::{Environment, OrchestratorConfig};
pub use crate::detached::DetachedTasks;
pub use crate::error::{ErrorCode, OrchestratorError, Step};
pub use crate::mode::ModeResolver;
pub use crate::orchestrator::{
    Delivered, Delivery, GenerateRequest, Orchestrator, PaymentStatus,
};
pub use crate::worker::{HttpWorkerTrigger, WorkerTrigger};
