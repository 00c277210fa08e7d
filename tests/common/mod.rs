//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use slotwatch::config::{AppConfig, RunConfig, Secret};
use slotwatch::driver::scripted::{ScriptedLauncher, ScriptedSite};
use slotwatch::humanize::FixedPacing;
use slotwatch::notify::Notifier;
use slotwatch::scheduler::Scheduler;

pub fn run_config(current_test_date: &str, auto_book: bool) -> RunConfig {
    let mut cfg = AppConfig::default();
    cfg.account.licence_number = Secret::new("MORGA657054SM9IJ");
    cfg.account.reference_number = Secret::new("12345678");
    cfg.account.current_test_date = current_test_date.to_string();
    cfg.booking.auto_book = auto_book;
    cfg.run_config().unwrap()
}

/// Records every message; optionally panics on the first one.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    calls: AtomicUsize,
    panic_on_first: bool,
}

impl RecordingNotifier {
    pub fn panicking_once() -> Self {
        Self {
            panic_on_first: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> bool {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_first && call == 0 {
            panic!("notifier exploded");
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        true
    }
}

pub struct Harness {
    pub scheduler: Scheduler,
    pub launcher: ScriptedLauncher,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(site: ScriptedSite) -> Harness {
    harness_with(site, RecordingNotifier::default())
}

pub fn harness_with(site: ScriptedSite, notifier: RecordingNotifier) -> Harness {
    let launcher = ScriptedLauncher::new(site, run_config("2025-06-15", false).site);
    let notifier = Arc::new(notifier);
    let scheduler = Scheduler::new(Arc::new(launcher.clone()), notifier.clone())
        .with_pacing(Arc::new(FixedPacing::zero()));
    Harness {
        scheduler,
        launcher,
        notifier,
    }
}

/// Poll `cond` every 100ms of (usually paused) Tokio time.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached");
}
