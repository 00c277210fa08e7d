//! Periodic loop lifecycle: exclusion, stop semantics, crash containment.

mod common;

use std::time::Duration;

use slotwatch::driver::scripted::ScriptedSite;
use slotwatch::error::SchedulerError;
use slotwatch::scheduler::RunStatus;

use common::{harness, harness_with, run_config, wait_until, RecordingNotifier};

#[tokio::test(start_paused = true)]
async fn stop_twice_yields_stopped_both_times() {
    let h = harness(ScriptedSite::with_dates(&["2025-06-20"]));
    h.scheduler.start(run_config("2025-06-15", false)).unwrap();

    assert_eq!(h.scheduler.stop().await, RunStatus::Stopped);
    assert_eq!(h.scheduler.stop().await, RunStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn loop_and_manual_check_never_overlap() {
    let mut site = ScriptedSite::with_dates(&["2025-06-20"]);
    site.open_delay = Duration::from_secs(5);
    let h = harness(site);

    h.scheduler.start(run_config("2025-06-15", false)).unwrap();
    let manual = h.scheduler.run_once(run_config("2025-06-15", false));
    let report = manual.await.unwrap();
    h.scheduler.stop().await;

    assert_eq!(report.outcome, slotwatch::session::CheckOutcome::NoEarlierDate);
    let journal = h.launcher.journal();
    assert!(journal.launches >= 2, "both sessions ran");
    assert_eq!(journal.max_live_contexts, 1);
    assert_eq!(journal.live_contexts, 0);
}

#[tokio::test(start_paused = true)]
async fn next_check_is_scheduled_after_failure() {
    let h = harness(ScriptedSite::default().rejecting_login("Access denied"));
    let config = run_config("2025-06-15", false);
    let (min, max) = (config.interval.min_secs(), config.interval.max_secs());
    h.scheduler.start(config).unwrap();

    let scheduler = h.scheduler.clone();
    wait_until(move || scheduler.snapshot().next_check.is_some()).await;

    let snap = h.scheduler.snapshot();
    assert_eq!(snap.status, RunStatus::Running);
    let gap = (snap.next_check.unwrap() - snap.last_check.unwrap()).num_seconds();
    assert!(gap >= min as i64, "gap {gap}s shorter than {min}s");
    assert!(gap <= max as i64 + 5, "gap {gap}s longer than {max}s");
    assert!(snap.log.iter().any(|e| e.message.starts_with("Next check scheduled at")));

    h.scheduler.stop().await;
    assert!(h.scheduler.snapshot().next_check.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_the_wait_promptly() {
    let h = harness(ScriptedSite::with_dates(&["2025-06-20"]));
    h.scheduler.start(run_config("2025-06-15", false)).unwrap();

    let scheduler = h.scheduler.clone();
    wait_until(move || scheduler.snapshot().next_check.is_some()).await;

    let started = tokio::time::Instant::now();
    assert_eq!(h.scheduler.stop().await, RunStatus::Stopped);
    assert!(started.elapsed() <= Duration::from_secs(1));
    assert_eq!(h.launcher.journal().launches, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_the_running_session_finish() {
    let mut site = ScriptedSite::with_dates(&["2025-06-20"]);
    site.open_delay = Duration::from_secs(30);
    let h = harness(site);
    h.scheduler.start(run_config("2025-06-15", false)).unwrap();

    let scheduler = h.scheduler.clone();
    wait_until(move || scheduler.snapshot().session_active).await;

    assert_eq!(h.scheduler.request_stop(), RunStatus::Stopping);
    assert_eq!(
        h.scheduler.start(run_config("2025-06-15", false)),
        Err(SchedulerError::AlreadyRunning)
    );
    assert_eq!(h.scheduler.stop().await, RunStatus::Stopped);

    let journal = h.launcher.journal();
    assert_eq!(journal.launches, 1);
    assert_eq!(journal.closes, 1);
    let snap = h.scheduler.snapshot();
    assert!(snap.last_check.is_some());
    assert!(!snap.session_active);
}

#[tokio::test(start_paused = true)]
async fn loop_survives_a_crash_outside_the_session() {
    let h = harness_with(
        ScriptedSite::default().rejecting_login("Access denied"),
        RecordingNotifier::panicking_once(),
    );
    h.scheduler.start(run_config("2025-06-15", false)).unwrap();

    let notifier = h.notifier.clone();
    wait_until(move || notifier.calls() >= 2).await;

    let snap = h.scheduler.snapshot();
    assert_eq!(snap.status, RunStatus::Running);
    assert!(snap
        .log
        .iter()
        .any(|e| e.message.starts_with("Unexpected error: notifier exploded")));
    assert_eq!(h.launcher.journal().launches, 2);
    assert_eq!(h.launcher.journal().live_contexts, 0);

    assert_eq!(h.scheduler.stop().await, RunStatus::Stopped);
}
