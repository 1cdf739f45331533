use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("precondition failed for key: {key}")]
    PreconditionFailed { key: String },

    /// The backend (bucket, table, network path) cannot be reached at all.
    /// Distinct from any per-key outcome so callers can decide on a fallback.
    #[error("report store unavailable: {0}")]
    Unavailable(String),

    #[error("conditional write for {key} kept losing after {attempts} attempts")]
    Conflict { key: String, attempts: usize },

    #[error("record {key} could not be decoded: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("S3 GetObject error: {0}")]
    GetObject(String),

    #[error("S3 PutObject error: {0}")]
    PutObject(String),
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}
