//! Quality checks for generated content.
//!
//! Checks run in a fixed order: placeholder text, section count, word count,
//! required sections. Every failing check is reported, each with a severity
//! that decides how the pipeline reacts.

use std::fmt;

use starchart_core::models::report::ReportContent;
use starchart_core::models::report_type::ReportType;

use crate::error::ErrorCode;

/// Phrases that only appear in template, test or unfinished output.
/// Matched case-insensitively.
pub const PLACEHOLDER_PHRASES: &[&str] = &[
    "lorem ipsum",
    "[placeholder]",
    "mock report",
    "mock data",
    "sample content",
    "sample report",
    "this is a test report",
    "{{",
    "[insert",
    "coming soon",
    "todo:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Fixed locally, never by calling the generator again.
    Repairable,
    /// Worth exactly one regeneration.
    Retryable,
    /// The report cannot be delivered.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PlaceholderContent { phrase: &'static str },
    TooFewSections { found: usize, required: usize },
    TooFewWords { found: usize, required: usize },
    MissingSections { keys: Vec<&'static str> },
}

impl FailureReason {
    pub fn code(&self) -> ErrorCode {
        match self {
            FailureReason::PlaceholderContent { .. } => ErrorCode::MockContentDetected,
            FailureReason::TooFewSections { .. } | FailureReason::MissingSections { .. } => {
                ErrorCode::MissingSections
            }
            FailureReason::TooFewWords { .. } => ErrorCode::ValidationFailed,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PlaceholderContent { phrase } => {
                write!(f, "contained placeholder text ({phrase:?})")
            }
            FailureReason::TooFewSections { found, required } => {
                write!(f, "had {found} sections, at least {required} required")
            }
            FailureReason::TooFewWords { found, required } => {
                write!(f, "had {found} words, at least {required} required")
            }
            FailureReason::MissingSections { keys } => {
                write!(f, "was missing sections {}", keys.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub reason: FailureReason,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn worst(&self) -> Option<Severity> {
        self.failures.iter().map(|f| f.severity).max()
    }

    pub fn placeholder(&self) -> Option<&ValidationFailure> {
        self.failures
            .iter()
            .find(|f| matches!(f.reason, FailureReason::PlaceholderContent { .. }))
    }

    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.reason.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn find_placeholder(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    PLACEHOLDER_PHRASES
        .iter()
        .copied()
        .find(|phrase| lowered.contains(phrase))
}

pub fn validate(content: &ReportContent, report_type: ReportType) -> ValidationOutcome {
    let profile = report_type.profile();
    let mut failures = Vec::new();

    if let Some(phrase) = find_placeholder(&content.full_text()) {
        // Regenerating from the same fallback data would only produce the
        // same kind of output.
        let severity = if content.degraded_source {
            Severity::Fatal
        } else {
            Severity::Retryable
        };
        failures.push(ValidationFailure {
            reason: FailureReason::PlaceholderContent { phrase },
            severity,
        });
    }

    let sections = content.substantive_sections();
    if sections < profile.min_sections {
        failures.push(ValidationFailure {
            reason: FailureReason::TooFewSections {
                found: sections,
                required: profile.min_sections,
            },
            severity: Severity::Repairable,
        });
    }

    let words = content.word_count();
    if words < profile.min_words {
        failures.push(ValidationFailure {
            reason: FailureReason::TooFewWords {
                found: words,
                required: profile.min_words,
            },
            severity: Severity::Repairable,
        });
    }

    let missing: Vec<&'static str> = profile
        .required_sections
        .iter()
        .copied()
        .filter(|key| !content.has_section(key))
        .collect();
    if !missing.is_empty() {
        failures.push(ValidationFailure {
            reason: FailureReason::MissingSections { keys: missing },
            severity: Severity::Repairable,
        });
    }

    ValidationOutcome { failures }
}
