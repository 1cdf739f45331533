use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BedrockError {
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("model invocation throttled: {0}")]
    Throttled(String),

    #[error("model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("response did not conform to expected schema: {0}")]
    SchemaViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a generation attempt failed, as far as the caller needs to know.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("content generator rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("content generator unavailable: {0}")]
    Unavailable(String),

    /// An upstream data source (ephemeris, geocoding) is down or out of quota.
    #[error("upstream dependency failed: {0}")]
    DependencyFailure(String),

    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generator returned unusable output: {0}")]
    InvalidOutput(String),
}

impl From<BedrockError> for GenerationError {
    fn from(e: BedrockError) -> Self {
        match e {
            BedrockError::Throttled(_) => GenerationError::RateLimited { retry_after: None },
            BedrockError::ServiceUnavailable(msg) => GenerationError::Unavailable(msg),
            BedrockError::ResponseParse(msg) | BedrockError::SchemaViolation(msg) => {
                GenerationError::InvalidOutput(msg)
            }
            BedrockError::Serialization(e) => GenerationError::InvalidOutput(e.to_string()),
            BedrockError::Invocation(msg) => GenerationError::Failed(msg),
        }
    }
}
