//! Turning raw model text into `ReportContent`.

use serde::Deserialize;

use starchart_core::models::report::{Quality, ReportContent, ReportSection};
use starchart_core::models::report_type::section_title;

use crate::error::BedrockError;

#[derive(Deserialize)]
struct RawReport {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
}

/// Locate the JSON object in a model response. Models sometimes wrap it in a
/// code fence or add a sentence before it.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse model output. Section keys are normalized to lowercase kebab-case and
/// missing titles are filled from the canonical title table.
pub fn parse_report(text: &str, degraded_source: bool) -> Result<ReportContent, BedrockError> {
    let json = extract_json(text)
        .ok_or_else(|| BedrockError::ResponseParse("no JSON object in model output".into()))?;

    let raw: RawReport = serde_json::from_str(json)
        .map_err(|e| BedrockError::SchemaViolation(format!("report JSON: {e}")))?;

    if raw.sections.is_empty() && raw.summary.trim().is_empty() {
        return Err(BedrockError::SchemaViolation("report has no content".into()));
    }

    let sections = raw
        .sections
        .into_iter()
        .map(|s| {
            let key = normalize_key(if s.key.is_empty() { &s.title } else { &s.key });
            let title = if s.title.trim().is_empty() {
                section_title(&key)
            } else {
                s.title.trim().to_string()
            };
            ReportSection {
                key,
                title,
                body: s.body.trim().to_string(),
            }
        })
        .collect();

    Ok(ReportContent {
        title: raw.title.trim().to_string(),
        summary: raw.summary.trim().to_string(),
        sections,
        quality: Quality::Standard,
        disclaimer: None,
        degraded_source,
    })
}

fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut dash = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
            dash = false;
        } else if !dash && !key.is_empty() {
            key.push('-');
            dash = true;
        }
    }
    while key.ends_with('-') {
        key.pop();
    }
    key
}
