use starchart_bedrock::prompts::{prompt_spec, system_prompt, user_message};
use starchart_bedrock::{Attempt, GenerationRequest};
use starchart_core::models::input::BirthInput;
use starchart_core::models::report_type::ReportType;

fn request(report_type: ReportType, attempt: Attempt, with_time: bool) -> GenerationRequest {
    let raw = BirthInput {
        name: "Ada Lovelace".into(),
        birth_date: "1990-07-04".into(),
        birth_time: with_time.then(|| "14:30".to_string()),
        birth_place: "London, UK".into(),
        latitude: Some(51.5072),
        longitude: Some(-0.1276),
        timezone: Some("Europe/London".into()),
    };
    let decision = report_type
        .requires_decision_context()
        .then_some("Should I accept the job offer in Lisbon?");
    let input = raw
        .normalize(decision, jiff::civil::date(2026, 1, 1))
        .unwrap();
    GenerationRequest {
        report_type,
        input,
        report_id: "RPT-1-abcdefgh".into(),
        session_key: "sess".into(),
        attempt,
    }
}

#[test]
fn every_report_type_has_its_own_prompt() {
    for report_type in ReportType::ALL {
        assert_eq!(prompt_spec(report_type).report_type, report_type);
    }
}

#[test]
fn system_prompt_lists_required_sections_and_word_floor() {
    let prompt = system_prompt(ReportType::YearAhead);
    for key in ReportType::YearAhead.profile().required_sections {
        assert!(prompt.contains(&format!("\"{key}\"")), "missing {key}");
    }
    assert!(prompt.contains("1100 words"));
    assert!(prompt.contains("Never use placeholder text"));
}

#[test]
fn user_message_describes_the_person() {
    let msg = user_message(&request(ReportType::CareerMoney, Attempt::Primary, true));
    assert!(msg.contains("Name: Ada Lovelace"));
    assert!(msg.contains("Birth date: 1990-07-04"));
    assert!(msg.contains("Birth time: 14:30"));
    assert!(msg.contains("Sun sign: Cancer"));
    assert!(msg.contains("51.5072, -0.1276"));
    assert!(!msg.contains("rejected"));
}

#[test]
fn unknown_birth_time_asks_for_noon_chart() {
    let msg = user_message(&request(ReportType::LifeSummary, Attempt::Primary, false));
    assert!(msg.contains("noon chart"));
}

#[test]
fn decision_context_is_included() {
    let msg = user_message(&request(ReportType::DecisionGuidance, Attempt::Primary, true));
    assert!(msg.contains("job offer in Lisbon"));
}

#[test]
fn regeneration_feeds_back_the_reason() {
    let attempt = Attempt::Regeneration {
        reason: "contained placeholder text (\"lorem ipsum\")".into(),
    };
    let msg = user_message(&request(ReportType::FullLife, attempt, true));
    assert!(msg.contains("was rejected because it contained placeholder text"));
}
