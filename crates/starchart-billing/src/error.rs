use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    /// The payment vendor could not be reached or answered 5xx/429.
    #[error("payment vendor unavailable: {0}")]
    Unavailable(String),

    #[error("payment vendor rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid payment token: {0}")]
    InvalidToken(String),

    #[error("payment gate not configured: {0}")]
    NotConfigured(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BillingError {
    /// Worth retrying: the request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self, BillingError::Unavailable(_))
    }
}

impl From<jsonwebtoken::errors::Error> for BillingError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        BillingError::InvalidToken(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::Unavailable(e.to_string())
    }
}
