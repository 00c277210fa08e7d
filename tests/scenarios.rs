//! End-to-end session outcomes against the scripted booking site.

mod common;

use chrono::NaiveDate;

use slotwatch::activity::ActivityLevel;
use slotwatch::baseline::BaselineStore;
use slotwatch::driver::scripted::ScriptedSite;
use slotwatch::error::SessionError;
use slotwatch::session::{CheckOutcome, SessionState};

use common::{harness, run_config};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn scenario_a_earlier_date_notifies_without_booking() {
    let h = harness(ScriptedSite::with_dates(&["2025-06-10", "2025-06-20"]));

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", false))
        .await
        .unwrap();

    assert_eq!(report.outcome, CheckOutcome::EarlierDateFound { date: d(2025, 6, 10) });
    assert_eq!(h.notifier.sent().len(), 1);
    assert!(h.notifier.sent()[0].1.contains("Tuesday, 10 June 2025"));
    assert_eq!(h.scheduler.snapshot().baseline, Some(d(2025, 6, 15)));
    assert!(!h.launcher.journal().clicks.iter().any(|c| c.starts_with("date:")));
}

#[tokio::test]
async fn scenario_b_auto_book_rebooks_and_moves_baseline() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = BaselineStore::new(dir.path().join("baseline.json"));
    let mut h = harness(ScriptedSite::with_dates(&["2025-06-10", "2025-06-20"]));
    h.scheduler = h.scheduler.clone().with_baseline_store(store.clone());

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", true))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        CheckOutcome::Rebooked {
            new_date: d(2025, 6, 10),
            slot_time: "08:57".into(),
            confirmation: "Your booking has been changed".into(),
        }
    );
    assert!(report.reached(SessionState::Booking));

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Test Successfully Rebooked!");

    assert_eq!(h.scheduler.snapshot().baseline, Some(d(2025, 6, 10)));
    assert_eq!(
        store.load().unwrap().unwrap().current_test_date,
        d(2025, 6, 10)
    );

    // The next check compares against the new appointment.
    let again = h
        .scheduler
        .run_once(run_config("2025-06-15", true))
        .await
        .unwrap();
    assert_eq!(again.baseline, d(2025, 6, 10));
    assert_eq!(again.outcome, CheckOutcome::NoEarlierDate);
}

#[tokio::test]
async fn scenario_c_no_earlier_date_is_logged_once_and_silent() {
    let h = harness(ScriptedSite::with_dates(&["2025-06-20"]));

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", false))
        .await
        .unwrap();

    assert_eq!(report.outcome, CheckOutcome::NoEarlierDate);
    assert_eq!(report.notified, None);
    assert_eq!(h.notifier.calls(), 0);

    let log = h.scheduler.snapshot().log;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].level, ActivityLevel::Info);
}

#[tokio::test]
async fn scenario_d_login_error_fails_and_releases_browser() {
    let h = harness(
        ScriptedSite::with_dates(&["2025-06-10"])
            .rejecting_login("The details you entered are not recognised"),
    );

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", false))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        CheckOutcome::Failed(SessionError::LoginFailed {
            message: "The details you entered are not recognised".into()
        })
    );
    assert_eq!(report.trace, [SessionState::Init, SessionState::LoggedOut]);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Slot Check Error");

    let journal = h.launcher.journal();
    assert_eq!(journal.launches, 1);
    assert_eq!(journal.closes, 1);
    assert_eq!(journal.live_contexts, 0);

    let log = h.scheduler.snapshot().log;
    assert_eq!(log.last().unwrap().level, ActivityLevel::Error);
}

#[tokio::test]
async fn navigation_failure_never_collects_dates() {
    let mut site = ScriptedSite::with_dates(&["2025-06-10"]);
    site.change_date_link = false;
    let h = harness(site);

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", true))
        .await
        .unwrap();

    assert_eq!(
        report.outcome,
        CheckOutcome::Failed(SessionError::NavigationFailed {
            step: "change date link"
        })
    );
    assert!(report.reached(SessionState::LoggedIn));
    assert!(!report.reached(SessionState::OnCalendar));
    assert!(!report.reached(SessionState::DatesCollected));
    assert_eq!(h.launcher.journal().live_contexts, 0);
}

#[tokio::test]
async fn empty_calendar_is_no_dates_loaded() {
    let h = harness(ScriptedSite::default());

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", false))
        .await
        .unwrap();

    assert_eq!(report.outcome, CheckOutcome::Failed(SessionError::NoDatesLoaded));
    assert!(report.reached(SessionState::OnCalendar));
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn unparseable_calendar_dates_count_as_none_earlier() {
    let h = harness(ScriptedSite::with_dates(&["soon", "15/06/2025", ""]));

    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", false))
        .await
        .unwrap();

    assert_eq!(report.outcome, CheckOutcome::NoEarlierDate);
    assert!(report.reached(SessionState::DatesCollected));
    assert!(h.notifier.sent().is_empty());
    let log = h.scheduler.snapshot().log;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].level, ActivityLevel::Info);
}

#[tokio::test]
async fn states_only_move_forward() {
    let h = harness(ScriptedSite::with_dates(&["2025-06-10"]));
    let report = h
        .scheduler
        .run_once(run_config("2025-06-15", true))
        .await
        .unwrap();

    assert!(report.trace.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(report.trace.first(), Some(&SessionState::Init));
    assert_eq!(report.trace.last(), Some(&SessionState::Booking));
}
