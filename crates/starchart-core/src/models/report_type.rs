use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

/// The report products the service can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum ReportType {
    LifeSummary,
    CareerMoney,
    LoveRelationships,
    YearAhead,
    DecisionGuidance,
    FullLife,
}

/// Generation and quality parameters for one report type.
#[derive(Debug, Clone, Copy)]
pub struct ReportProfile {
    pub paid: bool,
    /// Heavy reports are generated by the async worker, never inline.
    pub heavy: bool,
    pub stale_threshold: Duration,
    pub timeout_budget: Duration,
    pub min_sections: usize,
    pub min_words: usize,
    pub required_sections: &'static [&'static str],
}

const LIFE_SUMMARY: ReportProfile = ReportProfile {
    paid: false,
    heavy: false,
    stale_threshold: Duration::from_secs(90),
    timeout_budget: Duration::from_secs(55),
    min_sections: 3,
    min_words: 350,
    required_sections: &["overview", "strengths", "guidance"],
};

const CAREER_MONEY: ReportProfile = ReportProfile {
    paid: true,
    heavy: false,
    stale_threshold: Duration::from_secs(180),
    timeout_budget: Duration::from_secs(110),
    min_sections: 5,
    min_words: 900,
    required_sections: &["overview", "career", "money", "timing", "guidance"],
};

const LOVE_RELATIONSHIPS: ReportProfile = ReportProfile {
    paid: true,
    heavy: false,
    stale_threshold: Duration::from_secs(180),
    timeout_budget: Duration::from_secs(110),
    min_sections: 5,
    min_words: 900,
    required_sections: &[
        "overview",
        "attraction",
        "partnership",
        "challenges",
        "guidance",
    ],
};

const YEAR_AHEAD: ReportProfile = ReportProfile {
    paid: true,
    heavy: false,
    stale_threshold: Duration::from_secs(180),
    timeout_budget: Duration::from_secs(110),
    min_sections: 6,
    min_words: 1100,
    required_sections: &[
        "overview",
        "quarter-1",
        "quarter-2",
        "quarter-3",
        "quarter-4",
        "guidance",
    ],
};

const DECISION_GUIDANCE: ReportProfile = ReportProfile {
    paid: true,
    heavy: false,
    stale_threshold: Duration::from_secs(180),
    timeout_budget: Duration::from_secs(110),
    min_sections: 4,
    min_words: 700,
    required_sections: &["overview", "options", "timing", "recommendation"],
};

const FULL_LIFE: ReportProfile = ReportProfile {
    paid: true,
    heavy: true,
    stale_threshold: Duration::from_secs(600),
    timeout_budget: Duration::from_secs(280),
    min_sections: 8,
    min_words: 2200,
    required_sections: &[
        "overview",
        "personality",
        "career",
        "money",
        "relationships",
        "health",
        "timing",
        "guidance",
    ],
};

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::LifeSummary,
        ReportType::CareerMoney,
        ReportType::LoveRelationships,
        ReportType::YearAhead,
        ReportType::DecisionGuidance,
        ReportType::FullLife,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::LifeSummary => "life-summary",
            ReportType::CareerMoney => "career-money",
            ReportType::LoveRelationships => "love-relationships",
            ReportType::YearAhead => "year-ahead",
            ReportType::DecisionGuidance => "decision-guidance",
            ReportType::FullLife => "full-life",
        }
    }

    pub fn profile(&self) -> &'static ReportProfile {
        match self {
            ReportType::LifeSummary => &LIFE_SUMMARY,
            ReportType::CareerMoney => &CAREER_MONEY,
            ReportType::LoveRelationships => &LOVE_RELATIONSHIPS,
            ReportType::YearAhead => &YEAR_AHEAD,
            ReportType::DecisionGuidance => &DECISION_GUIDANCE,
            ReportType::FullLife => &FULL_LIFE,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.profile().paid
    }

    pub fn is_heavy(&self) -> bool {
        self.profile().heavy
    }

    pub fn requires_decision_context(&self) -> bool {
        matches!(self, ReportType::DecisionGuidance)
    }

    /// Human-readable product name, used in titles and prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            ReportType::LifeSummary => "Life Summary",
            ReportType::CareerMoney => "Career & Money",
            ReportType::LoveRelationships => "Love & Relationships",
            ReportType::YearAhead => "Year Ahead",
            ReportType::DecisionGuidance => "Decision Guidance",
            ReportType::FullLife => "Full Life Reading",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| CoreError::UnknownReportType(s.to_string()))
    }
}

/// Display title for a canonical section key.
pub fn section_title(key: &str) -> String {
    match key {
        "overview" => "Overview".to_string(),
        "strengths" => "Core Strengths".to_string(),
        "guidance" => "Guidance".to_string(),
        "career" => "Career Path".to_string(),
        "money" => "Money & Resources".to_string(),
        "timing" => "Timing & Cycles".to_string(),
        "attraction" => "Attraction & Desire".to_string(),
        "partnership" => "Partnership".to_string(),
        "challenges" => "Challenges".to_string(),
        "options" => "Your Options".to_string(),
        "recommendation" => "Recommendation".to_string(),
        "personality" => "Personality".to_string(),
        "relationships" => "Relationships".to_string(),
        "health" => "Health & Vitality".to_string(),
        other => match other.strip_prefix("quarter-") {
            Some(n) => format!("Quarter {n}"),
            None => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>().replace('-', " "),
                    None => String::new(),
                }
            }
        },
    }
}
