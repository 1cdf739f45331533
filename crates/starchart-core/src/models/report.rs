use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::input::NormalizedInput;
use super::report_type::ReportType;

/// Lifecycle status of a report record.
///
/// `DELIVERED` is a legacy spelling of `COMPLETED`. It is still accepted when
/// reading old records but is never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Processing,
    #[serde(alias = "DELIVERED")]
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Quality {
    #[default]
    Standard,
    Low,
}

/// Where the payment attached to a record stands. Bookkeeping only; the
/// payment vendor remains the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    #[default]
    None,
    Authorized,
    CapturePending,
    Captured,
    Cancelled,
    NotCharged,
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReportSection {
    pub key: String,
    pub title: String,
    pub body: String,
}

/// The generated report payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReportContent {
    pub title: String,
    pub summary: String,
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disclaimer: Option<String>,
    /// The chart behind this content was computed from fallback data.
    #[serde(default)]
    pub degraded_source: bool,
}

impl ReportContent {
    pub fn word_count(&self) -> usize {
        count_words(&self.summary)
            + self
                .sections
                .iter()
                .map(|s| count_words(&s.body))
                .sum::<usize>()
    }

    /// Sections with a non-empty body.
    pub fn substantive_sections(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| !s.body.trim().is_empty())
            .count()
    }

    pub fn has_section(&self, key: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.key == key && !s.body.trim().is_empty())
    }

    /// All text a reader sees, for phrase scanning.
    pub fn full_text(&self) -> String {
        let mut text = String::with_capacity(self.summary.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.summary);
        for section in &self.sections {
            text.push('\n');
            text.push_str(&section.title);
            text.push('\n');
            text.push_str(&section.body);
        }
        text
    }
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// One row of the idempotency table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub idempotency_key: String,
    pub report_id: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    #[serde(default)]
    pub content: Option<ReportContent>,
    pub input: NormalizedInput,
    pub created_at: jiff::Timestamp,
    pub updated_at: jiff::Timestamp,
    #[serde(default)]
    pub payment_intent_ref: Option<String>,
    #[serde(default)]
    pub payment_state: PaymentState,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    /// Ownership counter, bumped on every reclaim.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    /// Session discriminator the idempotency key was derived from.
    #[serde(default)]
    pub session_key: String,
    /// Some owner has begun generating content. Heavy reports are created
    /// without it and wait for the worker to claim them.
    #[serde(default)]
    pub generation_started: bool,
}

fn first_attempt() -> u32 {
    1
}

impl ReportRecord {
    pub fn new_processing(
        idempotency_key: impl Into<String>,
        report_id: impl Into<String>,
        report_type: ReportType,
        input: NormalizedInput,
        payment_intent_ref: Option<String>,
        now: jiff::Timestamp,
    ) -> Self {
        let payment_state = if payment_intent_ref.is_some() {
            PaymentState::Authorized
        } else {
            PaymentState::None
        };
        Self {
            idempotency_key: idempotency_key.into(),
            report_id: report_id.into(),
            report_type,
            status: ReportStatus::Processing,
            content: None,
            input,
            created_at: now,
            updated_at: now,
            payment_intent_ref,
            payment_state,
            error_message: None,
            error_code: None,
            attempt: 1,
            session_key: String::new(),
            generation_started: !report_type.is_heavy(),
        }
    }

    pub fn with_session_key(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = session_key.into();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReportStatus::Completed
    }

    /// Time since the last heartbeat (or creation).
    pub fn idle_for(&self, now: jiff::Timestamp) -> std::time::Duration {
        let ms = now.as_millisecond() - self.updated_at.as_millisecond();
        std::time::Duration::from_millis(ms.max(0) as u64)
    }
}
