use std::collections::HashSet;
use std::time::Duration;

use jiff::Timestamp;

use starchart_core::models::input::BirthInput;
use starchart_core::models::report::{ReportRecord, ReportStatus};
use starchart_core::models::report_type::ReportType;
use starchart_orchestrator::lock::{self, LockState};
use starchart_orchestrator::mode::ExecutionMode;
use starchart_orchestrator::{Environment, ErrorCode, ModeResolver};

fn resolver(environment: Environment) -> ModeResolver {
    ModeResolver::new(environment, HashSet::from(["qa_session".to_string()]))
}

#[test]
fn test_sessions_bypass_everywhere() {
    for env in [Environment::Production, Environment::Development, Environment::Test] {
        assert_eq!(resolver(env).resolve(Some("qa_session")), ExecutionMode::TestBypass);
    }
}

#[test]
fn demo_prefix_is_ignored_in_production() {
    assert_eq!(
        resolver(Environment::Development).resolve(Some("demo_tour")),
        ExecutionMode::Demo
    );
    assert_eq!(
        resolver(Environment::Production).resolve(Some("demo_tour")),
        ExecutionMode::Production
    );
    assert_eq!(resolver(Environment::Test).resolve(None), ExecutionMode::Production);
    assert_eq!(resolver(Environment::Test).resolve(Some("  ")), ExecutionMode::Production);
}

#[test]
fn only_test_bypass_may_skip_the_cache() {
    assert!(ExecutionMode::TestBypass.may_bypass_cache());
    assert!(!ExecutionMode::Demo.may_bypass_cache());
    assert!(ExecutionMode::Demo.bypasses_payment());
    assert!(!ExecutionMode::Production.bypasses_payment());
}

#[test]
fn environment_parses_short_names() {
    assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
    assert!("staging".parse::<Environment>().is_err());
}

#[test]
fn error_codes_round_trip_through_strings() {
    for code in [
        ErrorCode::ValidationFailed,
        ErrorCode::PaymentVerificationRequired,
        ErrorCode::MockContentDetected,
        ErrorCode::GenerationTimeout,
    ] {
        assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
    }
    assert!("NOPE".parse::<ErrorCode>().is_err());
}

fn record(report_type: ReportType, at: Timestamp) -> ReportRecord {
    let input = BirthInput {
        name: "Ada Lovelace".into(),
        birth_date: "1990-07-04".into(),
        birth_place: "London, UK".into(),
        ..Default::default()
    }
    .normalize(None, jiff::civil::date(2026, 1, 1))
    .unwrap();
    ReportRecord::new_processing("key", "RPT-1-abcdef12", report_type, input, None, at)
}

#[test]
fn lock_goes_stale_after_the_type_threshold() {
    let start = Timestamp::from_second(1_800_000_000).unwrap();
    let r = record(ReportType::LifeSummary, start);

    let soon = start.checked_add(Duration::from_secs(90)).unwrap();
    assert!(matches!(lock::assess(&r, soon), LockState::InFlight { .. }));
    let later = start.checked_add(Duration::from_secs(91)).unwrap();
    let state = lock::assess(&r, later);
    assert!(matches!(state, LockState::Stale { .. }));
    assert!(state.is_reclaimable());

    let heavy = record(ReportType::FullLife, start);
    assert!(!lock::assess(&heavy, later).is_reclaimable());
}

#[test]
fn terminal_records_are_assessed_by_status() {
    let start = Timestamp::from_second(1_800_000_000).unwrap();
    let mut r = record(ReportType::CareerMoney, start);
    r.status = ReportStatus::Failed;
    assert_eq!(lock::assess(&r, start), LockState::Failed);
    r.status = ReportStatus::Completed;
    assert_eq!(lock::assess(&r, start), LockState::Completed);
    assert!(!LockState::Completed.is_reclaimable());
}

#[test]
fn heavy_reports_poll_less_often() {
    assert_eq!(lock::retry_after(ReportType::FullLife), Duration::from_secs(15));
    assert_eq!(lock::retry_after(ReportType::YearAhead), Duration::from_secs(5));
}
