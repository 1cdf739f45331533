use std::sync::Arc;
use std::time::Duration;

use jiff::civil::date;

use starchart_core::clock::{Clock, ManualClock};
use starchart_core::idempotency::new_report_id;
use starchart_core::models::input::BirthInput;
use starchart_core::models::report::{
    PaymentState, Quality, ReportContent, ReportRecord, ReportSection, ReportStatus,
};
use starchart_core::models::report_type::ReportType;
use starchart_storage::{CreateOutcome, Lease, MemoryReportStore, ReclaimOutcome, ReportStore};

fn start() -> jiff::Timestamp {
    jiff::Timestamp::from_second(1_760_000_000).unwrap()
}

fn record(clock: &ManualClock, key: &str) -> ReportRecord {
    let input = BirthInput {
        name: "Noor".to_string(),
        birth_date: "1992-11-30".to_string(),
        birth_time: Some("06:40".to_string()),
        birth_place: "Cairo".to_string(),
        latitude: Some(30.04),
        longitude: Some(31.24),
        timezone: None,
    }
    .normalize(None, date(2026, 1, 1))
    .unwrap();
    ReportRecord::new_processing(
        key,
        new_report_id(clock.now()),
        ReportType::CareerMoney,
        input,
        Some("pi_123".to_string()),
        clock.now(),
    )
}

fn content() -> ReportContent {
    ReportContent {
        title: "Career & Money".to_string(),
        summary: "A short summary.".to_string(),
        sections: vec![ReportSection {
            key: "overview".to_string(),
            title: "Overview".to_string(),
            body: "Body text.".to_string(),
        }],
        quality: Quality::Standard,
        disclaimer: None,
        degraded_source: false,
    }
}

#[tokio::test]
async fn concurrent_inserts_have_a_single_winner() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(MemoryReportStore::with_clock(clock.clone()));

    let attempts = (0..16).map(|_| {
        let store = store.clone();
        let candidate = record(&clock, "key-1");
        tokio::spawn(async move { store.create_processing(candidate).await.unwrap() })
    });
    let outcomes = futures::future::join_all(attempts).await;

    let mut winners = Vec::new();
    let mut existing_ids = Vec::new();
    for outcome in outcomes {
        match outcome.unwrap() {
            CreateOutcome::Created(r) => winners.push(r.report_id),
            CreateOutcome::Existing(r) => existing_ids.push(r.report_id),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(existing_ids.len(), 15);
    assert!(existing_ids.iter().all(|id| *id == winners[0]));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn terminal_write_applies_once() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-2");
    store.create_processing(r.clone()).await.unwrap();
    let lease = Lease::of(&r);

    assert!(store.complete("key-2", &lease, content()).await.unwrap());
    assert!(!store
        .fail("key-2", &lease, "late".into(), "GENERATION_FAILED".into())
        .await
        .unwrap());

    let stored = store.get_by_id(&r.report_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Completed);
    assert!(stored.error_code.is_none());
}

#[tokio::test]
async fn heartbeat_refreshes_updated_at() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-3");
    store.create_processing(r.clone()).await.unwrap();

    clock.advance(Duration::from_secs(40));
    store.heartbeat("key-3", &Lease::of(&r)).await.unwrap();

    let stored = store.get_by_key("key-3").await.unwrap().unwrap();
    assert_eq!(stored.updated_at, clock.now());
    assert_eq!(stored.created_at, start());
}

#[tokio::test]
async fn reclaim_is_compare_and_swap_on_attempt() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-4");
    store.create_processing(r.clone()).await.unwrap();

    let first = store.reclaim("key-4", 1, None).await.unwrap();
    let ReclaimOutcome::Reclaimed(owned) = first else {
        panic!("first reclaim should win");
    };
    assert_eq!(owned.attempt, 2);
    assert_eq!(owned.report_id, r.report_id);
    assert_eq!(owned.payment_intent_ref.as_deref(), Some("pi_123"));

    let second = store.reclaim("key-4", 1, None).await.unwrap();
    assert!(matches!(second, ReclaimOutcome::Lost(ref cur) if cur.attempt == 2));
}

#[tokio::test]
async fn completed_records_cannot_be_reclaimed() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-5");
    store.create_processing(r.clone()).await.unwrap();
    store.complete("key-5", &Lease::of(&r), content()).await.unwrap();

    let outcome = store.reclaim("key-5", 1, None).await.unwrap();
    assert!(matches!(outcome, ReclaimOutcome::Lost(ref cur) if cur.is_completed()));
}

#[tokio::test]
async fn failed_record_reclaim_takes_new_payment() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-6");
    store.create_processing(r.clone()).await.unwrap();
    let lease = Lease::of(&r);
    store
        .fail("key-6", &lease, "boom".into(), "GENERATION_FAILED".into())
        .await
        .unwrap();
    store
        .set_payment_state("key-6", &lease, PaymentState::Cancelled)
        .await
        .unwrap();

    let outcome = store
        .reclaim("key-6", 1, Some("pi_456".to_string()))
        .await
        .unwrap();
    let ReclaimOutcome::Reclaimed(owned) = outcome else {
        panic!("failed record should be reclaimable");
    };
    assert_eq!(owned.status, ReportStatus::Processing);
    assert_eq!(owned.payment_intent_ref.as_deref(), Some("pi_456"));
    assert_eq!(owned.payment_state, PaymentState::Authorized);
    assert!(owned.error_code.is_none());
}

#[tokio::test]
async fn unknown_ids_are_none() {
    let store = MemoryReportStore::new();
    assert!(store.get_by_id("RPT-1-abcdefgh").await.unwrap().is_none());
    assert!(store.get_by_key("missing").await.unwrap().is_none());
    assert!(!store
        .complete("missing", &Lease::new("RPT-1-abcdefgh", 1), content())
        .await
        .unwrap());
}

#[tokio::test]
async fn superseded_owner_cannot_write_after_reclaim() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let r = record(&clock, "key-7");
    store.create_processing(r.clone()).await.unwrap();
    let old = Lease::of(&r);

    let ReclaimOutcome::Reclaimed(owned) = store.reclaim("key-7", 1, None).await.unwrap() else {
        panic!("reclaim should win");
    };
    let new = Lease::of(&owned);
    assert_eq!(old.report_id, new.report_id);

    assert!(!store
        .fail("key-7", &old, "late".into(), "GENERATION_FAILED".into())
        .await
        .unwrap());
    assert!(!store.attach_payment("key-7", &old, "pi_old".into()).await.unwrap());
    clock.advance(Duration::from_secs(30));
    store.heartbeat("key-7", &old).await.unwrap();
    store
        .set_payment_state("key-7", &old, PaymentState::Cancelled)
        .await
        .unwrap();

    let stored = store.get_by_key("key-7").await.unwrap().unwrap();
    assert_eq!(stored.status, ReportStatus::Processing);
    assert_eq!(stored.updated_at, start());
    assert_eq!(stored.payment_intent_ref.as_deref(), Some("pi_123"));
    assert_eq!(stored.payment_state, PaymentState::Authorized);

    assert!(store.complete("key-7", &new, content()).await.unwrap());
}

#[tokio::test]
async fn worker_claim_is_compare_and_swap() {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryReportStore::with_clock(clock.clone());
    let mut r = record(&clock, "key-8");
    r.report_type = ReportType::FullLife;
    r.generation_started = false;
    store.create_processing(r.clone()).await.unwrap();

    let ReclaimOutcome::Reclaimed(claimed) = store.claim("key-8", 1).await.unwrap() else {
        panic!("first claim should win");
    };
    assert_eq!(claimed.attempt, 2);
    assert!(claimed.generation_started);

    let again = store.claim("key-8", 1).await.unwrap();
    assert!(matches!(again, ReclaimOutcome::Lost(ref cur) if cur.attempt == 2));

    store.complete("key-8", &Lease::of(&claimed), content()).await.unwrap();
    let done = store.claim("key-8", 2).await.unwrap();
    assert!(matches!(done, ReclaimOutcome::Lost(ref cur) if cur.is_completed()));
}

#[test]
fn heavy_records_start_unclaimed() {
    let clock = ManualClock::new(start());
    let mut r = record(&clock, "key-9");
    assert!(r.generation_started);
    r = ReportRecord::new_processing(
        "key-9",
        r.report_id.clone(),
        ReportType::FullLife,
        r.input.clone(),
        None,
        clock.now(),
    )
    .with_session_key("sess_1");
    assert!(!r.generation_started);
    assert_eq!(r.session_key, "sess_1");
}
