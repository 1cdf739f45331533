//! Prompt table, one entry per report type.
//!
//! Primary generation and placeholder regeneration go through the same
//! table; a regeneration only appends the rejection reason and a stricter
//! instruction to the user message.

use starchart_core::models::report_type::{ReportType, section_title};

use crate::generator::{Attempt, GenerationRequest};

pub struct PromptSpec {
    pub report_type: ReportType,
    /// What the reading is about, in one sentence.
    pub focus: &'static str,
    /// Extra instructions specific to this product.
    pub notes: &'static str,
}

const PROMPTS: [PromptSpec; 6] = [
    PromptSpec {
        report_type: ReportType::LifeSummary,
        focus: "a concise, warm overview of the person's natal chart",
        notes: "Keep it encouraging and accessible to someone new to astrology.",
    },
    PromptSpec {
        report_type: ReportType::CareerMoney,
        focus: "career direction, vocation, earning patterns and financial timing",
        notes: "Reference the 2nd, 6th and 10th houses and Saturn/Jupiter cycles where the chart allows.",
    },
    PromptSpec {
        report_type: ReportType::LoveRelationships,
        focus: "attraction style, partnership needs and recurring relationship themes",
        notes: "Reference Venus, Mars, the Moon and the 7th house where the chart allows.",
    },
    PromptSpec {
        report_type: ReportType::YearAhead,
        focus: "the coming twelve months, quarter by quarter",
        notes: "Each quarter section must name the dominant transits and one practical focus.",
    },
    PromptSpec {
        report_type: ReportType::DecisionGuidance,
        focus: "a specific decision the person is facing",
        notes: "Weigh each option against the chart and close with a clear recommendation.",
    },
    PromptSpec {
        report_type: ReportType::FullLife,
        focus: "a comprehensive life reading across personality, work, money, love, health and timing",
        notes: "This is the flagship product: every section should be substantial and specific.",
    },
];

pub fn prompt_spec(report_type: ReportType) -> &'static PromptSpec {
    PROMPTS
        .iter()
        .find(|p| p.report_type == report_type)
        .unwrap_or(&PROMPTS[0])
}

pub fn system_prompt(report_type: ReportType) -> String {
    let spec = prompt_spec(report_type);
    let profile = report_type.profile();

    let sections = profile
        .required_sections
        .iter()
        .map(|key| format!("- \"{key}\": {}", section_title(key)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an experienced professional astrologer writing a paid \"{name}\" report: {focus}.\n\
         {notes}\n\n\
         Respond with a single JSON object and nothing else, shaped as:\n\
         {{\"title\": string, \"summary\": string, \"sections\": [{{\"key\": string, \"title\": string, \"body\": string}}]}}\n\n\
         Include at least these sections, using exactly these keys:\n{sections}\n\n\
         Write at least {min_words} words in total across the summary and sections. \
         Never use placeholder text, sample text, lorem ipsum, template markers or notes to the editor. \
         Every sentence must be written for this specific person.",
        name = report_type.display_name(),
        focus = spec.focus,
        notes = spec.notes,
        min_words = profile.min_words,
    )
}

pub fn user_message(request: &GenerationRequest) -> String {
    let input = &request.input;
    let sign = input.sun_sign();

    let mut msg = format!(
        "Name: {}\nBirth date: {}\nBirth place: {}\nSun sign: {} ({} sign)\n",
        input.name,
        input.birth_date,
        input.birth_place,
        sign.name(),
        sign.element().name(),
    );
    match &input.birth_time {
        Some(time) => msg.push_str(&format!("Birth time: {time}\n")),
        None => msg.push_str(
            "Birth time: unknown. Use a noon chart and do not make claims about the rising sign or houses.\n",
        ),
    }
    match (input.latitude, input.longitude) {
        (Some(lat), Some(lon)) => msg.push_str(&format!("Coordinates: {lat:.4}, {lon:.4}\n")),
        _ => msg.push_str("Coordinates: unknown.\n"),
    }
    if let Some(tz) = &input.timezone {
        msg.push_str(&format!("Timezone: {tz}\n"));
    }
    if let Some(ctx) = &input.decision_context {
        msg.push_str(&format!("\nThe decision they are facing:\n{ctx}\n"));
    }

    if let Attempt::Regeneration { reason } = &request.attempt {
        msg.push_str(&format!(
            "\nA previous draft was rejected because it {reason}. \
             Rewrite the whole report from scratch with fully specific content.\n"
        ));
    }

    msg
}
