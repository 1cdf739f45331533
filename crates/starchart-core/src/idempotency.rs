//! Idempotency key and report id derivation.

use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::input::NormalizedInput;
use crate::models::report_type::ReportType;

/// Session discriminator used when the request carries no session at all
/// (free reports from anonymous clients).
pub const ANONYMOUS_SESSION: &str = "anonymous";

const KEY_VERSION: u8 = 1;

#[derive(Serialize)]
struct KeyMaterial<'a> {
    v: u8,
    report_type: &'a str,
    session: &'a str,
    name: String,
    birth_date: String,
    birth_time: Option<&'a str>,
    birth_place: String,
    latitude: Option<String>,
    longitude: Option<String>,
    timezone: Option<&'a str>,
    decision_context: Option<&'a str>,
}

/// Deterministic fingerprint of (normalized input, report type, session).
///
/// Names and places are compared case-insensitively and coordinates at four
/// decimal places (~11 m), so cosmetic differences in the same request map to
/// the same key.
pub fn derive_key(input: &NormalizedInput, report_type: ReportType, session: &str) -> String {
    let material = KeyMaterial {
        v: KEY_VERSION,
        report_type: report_type.as_str(),
        session,
        name: input.name.to_lowercase(),
        birth_date: input.birth_date.to_string(),
        birth_time: input.birth_time.as_deref(),
        birth_place: input.birth_place.to_lowercase(),
        latitude: input.latitude.map(|v| format!("{v:.4}")),
        longitude: input.longitude.map(|v| format!("{v:.4}")),
        timezone: input.timezone.as_deref(),
        decision_context: input.decision_context.as_deref(),
    };

    // Serializing a plain struct of strings cannot fail.
    let canonical = serde_json::to_vec(&material).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}

/// Session discriminator for a deliberate cache bypass. The random nonce
/// guarantees a key that no earlier request can have produced.
pub fn cache_bypass_session(session: &str) -> String {
    format!("{session}#bypass-{}", Uuid::new_v4().simple())
}

/// Fingerprint an opaque credential so it can act as a session discriminator
/// without being stored verbatim.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("tok_{}", &hex::encode(digest)[..24])
}

/// New externally visible report id: `RPT-<creationEpochMs>-<random>`.
pub fn new_report_id(created_at: jiff::Timestamp) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("RPT-{}-{}", created_at.as_millisecond(), &random[..8])
}

/// Check the shape of a client-supplied report id before it reaches a store.
pub fn is_valid_report_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("RPT-") else {
        return false;
    };
    let Some((millis, random)) = rest.split_once('-') else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && random.len() == 8
        && random.bytes().all(|b| b.is_ascii_alphanumeric())
}
