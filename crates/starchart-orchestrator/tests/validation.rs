mod common;

use starchart_core::models::report_type::ReportType;
use starchart_orchestrator::ErrorCode;
use starchart_orchestrator::validation::{FailureReason, Severity, find_placeholder, validate};

use common::{content_with, good_content, placeholder_content};

#[test]
fn good_content_passes() {
    for report_type in ReportType::ALL {
        let outcome = validate(&good_content(report_type), report_type);
        assert!(outcome.passed(), "{report_type}: {}", outcome.summary());
    }
}

#[test]
fn placeholder_phrases_match_case_insensitively() {
    assert_eq!(find_placeholder("Hello LOREM IPSUM"), Some("lorem ipsum"));
    assert_eq!(find_placeholder("Details {{name}}"), Some("{{"));
    assert_eq!(find_placeholder("TODO: write this"), Some("todo:"));
    assert_eq!(find_placeholder("A sample of your strengths"), None);
}

#[test]
fn placeholder_severity_depends_on_source() {
    let fresh = validate(&placeholder_content(ReportType::LifeSummary, false), ReportType::LifeSummary);
    assert_eq!(fresh.worst(), Some(Severity::Retryable));

    let degraded = validate(&placeholder_content(ReportType::LifeSummary, true), ReportType::LifeSummary);
    let failure = degraded.placeholder().unwrap();
    assert_eq!(failure.severity, Severity::Fatal);
    assert_eq!(failure.reason.code(), ErrorCode::MockContentDetected);
}

#[test]
fn every_failing_check_is_reported_in_order() {
    let mut content = content_with(&["overview"], 10);
    content.summary.push_str(" Coming soon.");

    let outcome = validate(&content, ReportType::CareerMoney);
    let reasons: Vec<_> = outcome.failures.iter().map(|f| &f.reason).collect();
    assert!(matches!(reasons[0], FailureReason::PlaceholderContent { phrase: "coming soon" }));
    assert!(matches!(reasons[1], FailureReason::TooFewSections { found: 1, required: 5 }));
    assert!(matches!(reasons[2], FailureReason::TooFewWords { required: 900, .. }));
    match reasons[3] {
        FailureReason::MissingSections { keys } => {
            assert_eq!(keys, &vec!["career", "money", "timing", "guidance"]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(outcome.worst(), Some(Severity::Retryable));
}

#[test]
fn empty_sections_do_not_count() {
    let mut content = good_content(ReportType::LifeSummary);
    content.sections[1].body = "   ".into();

    let outcome = validate(&content, ReportType::LifeSummary);
    assert!(!outcome.passed());
    assert!(outcome.summary().contains("was missing sections strengths"));
    assert!(outcome.failures.iter().all(|f| f.severity == Severity::Repairable));
}
