//! Short-lived signed payment tokens.
//!
//! Issued by the checkout flow once an authorization is in place and handed
//! to the client, which presents it with the report request. HS256 over a
//! shared secret.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Longest accepted span between `iat` and `exp`.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentClaims {
    /// Session reference the payment belongs to.
    pub sub: String,
    pub report_type: String,
    pub payment_intent: String,
    pub exp: u64,
    pub iat: u64,
}

#[derive(Clone)]
pub struct PaymentTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl PaymentTokens {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a token valid from `issued_at` for `ttl`, capped at
    /// [`MAX_TOKEN_LIFETIME`].
    pub fn issue(
        &self,
        session_ref: &str,
        report_type: &str,
        payment_intent: &str,
        issued_at: jiff::Timestamp,
        ttl: Duration,
    ) -> Result<String, BillingError> {
        let iat = issued_at.as_second().max(0) as u64;
        let ttl = ttl.min(MAX_TOKEN_LIFETIME).as_secs();
        let claims = PaymentClaims {
            sub: session_ref.to_string(),
            report_type: report_type.to_string(),
            payment_intent: payment_intent.to_string(),
            exp: iat + ttl,
            iat,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature, expiry and lifetime, and return the claims.
    pub fn verify(&self, token: &str) -> Result<PaymentClaims, BillingError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let claims = decode::<PaymentClaims>(token, &self.decoding, &validation)?.claims;

        if claims.exp <= claims.iat {
            return Err(BillingError::InvalidToken("exp precedes iat".into()));
        }
        if claims.exp - claims.iat > MAX_TOKEN_LIFETIME.as_secs() {
            return Err(BillingError::InvalidToken(format!(
                "lifetime {}s exceeds {}s",
                claims.exp - claims.iat,
                MAX_TOKEN_LIFETIME.as_secs()
            )));
        }
        if claims.payment_intent.trim().is_empty() {
            return Err(BillingError::InvalidToken("missing payment_intent".into()));
        }
        Ok(claims)
    }
}
