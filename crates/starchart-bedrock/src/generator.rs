use std::future::Future;
use std::pin::Pin;

use starchart_core::models::input::NormalizedInput;
use starchart_core::models::report::ReportContent;
use starchart_core::models::report_type::ReportType;
use starchart_core::models::usage::TokenUsage;

use crate::error::GenerationError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Why this call is being made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Primary,
    /// The previous output was rejected; `reason` is fed back to the model.
    Regeneration { reason: String },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub report_type: ReportType,
    pub input: NormalizedInput,
    pub report_id: String,
    /// Stable per-session key, passed through for provider-side tracing.
    pub session_key: String,
    pub attempt: Attempt,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub content: ReportContent,
    pub usage: TokenUsage,
    pub model_id: String,
}

/// External content generation. May be slow, may fail, may return poor
/// content; callers validate everything it returns.
pub trait ContentGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<GenerationOutput, GenerationError>>;
}
