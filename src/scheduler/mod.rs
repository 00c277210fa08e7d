//! Run lifecycle and the periodic check loop.
//!
//! [`Scheduler::start`] spawns the loop on its own task and returns at once.
//! The loop runs a session, draws a jittered wait from the configured bounds,
//! publishes the next check time and sleeps until the wait elapses or a stop
//! is requested. A stop never interrupts a session that is already running.

mod executor;
pub mod interval;
pub mod state;

pub use interval::{draw_interval, Jitter, UniformJitter};
pub use state::{RunSnapshot, RunState, RunStatus};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use self::executor::SessionExecutor;
use crate::activity::{ActivityLevel, LogSink};
use crate::baseline::BaselineStore;
use crate::config::RunConfig;
use crate::driver::DriverLauncher;
use crate::error::SchedulerError;
use crate::humanize::{FingerprintSource, Pacing};
use crate::notify::Notifier;
use crate::session::{panic_message, SessionReport};

/// A live or exiting loop. Stays in `control` until the loop has finished,
/// so a `start` issued while a stop is pending sees it.
struct LoopHandle {
    id: Uuid,
    token: CancellationToken,
    /// Cancelled once the loop has written its final state, or unwound.
    finished: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn is_alive(&self) -> bool {
        !self.finished.is_cancelled()
    }
}

/// Clears the pending-check flag when the check ends, even by panic.
struct PendingCheck(Arc<AtomicBool>);

impl Drop for PendingCheck {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the run lifecycle. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Scheduler {
    executor: SessionExecutor,
    jitter: Arc<dyn Jitter>,
    control: Arc<Mutex<Option<LoopHandle>>>,
    check_pending: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(launcher: Arc<dyn DriverLauncher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            executor: SessionExecutor::new(launcher, notifier),
            jitter: Arc::new(UniformJitter),
            control: Arc::new(Mutex::new(None)),
            check_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_pacing(mut self, pacing: Arc<dyn Pacing>) -> Self {
        self.executor.pacing = Some(pacing);
        self
    }

    pub fn with_fingerprints(mut self, fingerprints: Arc<dyn FingerprintSource>) -> Self {
        self.executor.fingerprints = Some(fingerprints);
        self
    }

    /// Persist rebooked dates to `store` and adopt any baseline it already
    /// holds.
    pub fn with_baseline_store(mut self, store: BaselineStore) -> Self {
        match store.load() {
            Ok(Some(stored)) => {
                info!(
                    path = %store.path().display(),
                    date = %stored.current_test_date,
                    "loaded persisted baseline"
                );
                self.executor.state.set_baseline(stored.current_test_date);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring unreadable baseline file"),
        }
        self.executor.store = Some(store);
        self
    }

    pub fn state(&self) -> &Arc<RunState> {
        &self.executor.state
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.executor.state.snapshot()
    }

    /// Whether the periodic loop task is alive.
    pub fn is_running(&self) -> bool {
        self.control().as_ref().is_some_and(LoopHandle::is_alive)
    }

    /// Begin the periodic loop. Must be called inside a Tokio runtime.
    ///
    /// A loop that is still winding down after a stop counts as running.
    pub fn start(&self, config: RunConfig) -> Result<(), SchedulerError> {
        let mut control = self.control();
        if control.as_ref().is_some_and(LoopHandle::is_alive) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let state = &self.executor.state;
        state.set_status(RunStatus::Running);
        state.log().record(
            &format!(
                "Slot checking started (every {}-{} minutes)",
                config.interval.min_secs() / 60,
                config.interval.max_secs() / 60
            ),
            ActivityLevel::Info,
        );

        let token = CancellationToken::new();
        let finished = CancellationToken::new();
        let task = tokio::spawn(run_loop(
            self.executor.clone(),
            self.jitter.clone(),
            Arc::new(config),
            token.clone(),
            finished.clone(),
        ));
        *control = Some(LoopHandle {
            id: Uuid::new_v4(),
            token,
            finished,
            task,
        });
        Ok(())
    }

    /// Ask the loop to stop without waiting for it.
    pub fn request_stop(&self) -> RunStatus {
        if let Some(handle) = self.control().as_ref() {
            if !handle.token.is_cancelled() {
                handle.token.cancel();
                if self
                    .executor
                    .state
                    .transition(RunStatus::Running, RunStatus::Stopping)
                {
                    debug!("stop requested");
                }
            }
        }
        self.executor.state.status()
    }

    /// Stop the loop and wait for an in-flight session to finish.
    ///
    /// Calling this when nothing runs is a no-op.
    pub async fn stop(&self) -> RunStatus {
        let (id, finished) = {
            let control = self.control();
            let Some(handle) = control.as_ref() else {
                return self.executor.state.status();
            };
            handle.token.cancel();
            (handle.id, handle.finished.clone())
        };
        self.executor
            .state
            .transition(RunStatus::Running, RunStatus::Stopping);

        finished.cancelled().await;

        // Only reap our own loop; a newer one may have been started meanwhile.
        let handle = {
            let mut control = self.control();
            match control.as_ref() {
                Some(handle) if handle.id == id => control.take(),
                _ => None,
            }
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.task.await {
                error!(error = %e, "check loop task ended abnormally");
                self.executor.state.set_next_check(None);
                self.executor.state.set_status(RunStatus::Stopped);
            }
        }
        self.executor.state.status()
    }

    /// Run a single session outside the loop.
    ///
    /// Shares the session lock with the loop, so it waits for any session in
    /// progress.
    pub fn run_once(&self, config: RunConfig) -> JoinHandle<SessionReport> {
        let executor = self.executor.clone();
        tokio::spawn(async move { executor.execute(&config).await })
    }

    /// Queue an on-demand check unless one is already queued or running.
    pub fn request_check(
        &self,
        config: RunConfig,
    ) -> Result<JoinHandle<SessionReport>, SchedulerError> {
        if self
            .check_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::CheckPending);
        }
        let pending = PendingCheck(self.check_pending.clone());
        let executor = self.executor.clone();
        Ok(tokio::spawn(async move {
            let _pending = pending;
            executor.execute(&config).await
        }))
    }

    fn control(&self) -> MutexGuard<'_, Option<LoopHandle>> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_loop(
    executor: SessionExecutor,
    jitter: Arc<dyn Jitter>,
    config: Arc<RunConfig>,
    token: CancellationToken,
    finished: CancellationToken,
) {
    let _finished = finished.drop_guard();
    let state = executor.state.clone();
    info!("check loop started");

    while !token.is_cancelled() {
        let session = {
            let executor = executor.clone();
            let config = config.clone();
            tokio::spawn(async move { executor.execute(&config).await })
        };

        let wait = match session.await {
            Ok(report) => {
                debug!(session_id = %report.session_id, outcome = report.outcome.kind(), "loop session done");
                jitter.draw(config.interval)
            }
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(&*e.into_panic())
                } else {
                    e.to_string()
                };
                error!(error = %reason, "check crashed outside the session boundary");
                state.log().record(
                    &format!(
                        "Unexpected error: {reason}. Retrying in {}s",
                        config.error_cooldown.as_secs()
                    ),
                    ActivityLevel::Error,
                );
                config.error_cooldown
            }
        };

        if token.is_cancelled() {
            break;
        }

        let next = next_check_at(Utc::now(), wait);
        state.set_next_check(Some(next));
        info!(interval_secs = wait.as_secs(), next_check = %next, "next check scheduled");
        state.log().record(
            &format!(
                "Next check scheduled at {}",
                next.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            ActivityLevel::Info,
        );

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    state.set_next_check(None);
    state.set_status(RunStatus::Stopped);
    state.log().record("Slot checking stopped", ActivityLevel::Info);
    info!("check loop exited");
}

fn next_check_at(now: DateTime<Utc>, wait: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|wait| now.checked_add_signed(wait))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Secret};
    use crate::driver::scripted::{ScriptedLauncher, ScriptedSite};
    use crate::humanize::FixedPacing;
    use crate::notify::DisabledNotifier;

    fn config() -> RunConfig {
        let mut cfg = AppConfig::default();
        cfg.account.licence_number = Secret::new("MORGA657054SM9IJ");
        cfg.account.reference_number = Secret::new("12345678");
        cfg.account.current_test_date = "2025-06-15".into();
        cfg.run_config().unwrap()
    }

    fn scheduler(site: ScriptedSite) -> (Scheduler, ScriptedLauncher) {
        let launcher = ScriptedLauncher::new(site, config().site);
        let scheduler = Scheduler::new(Arc::new(launcher.clone()), Arc::new(DisabledNotifier))
            .with_pacing(Arc::new(FixedPacing::zero()));
        (scheduler, launcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (scheduler, _) = scheduler(ScriptedSite::with_dates(&["2025-06-20"]));
        scheduler.start(config()).unwrap();
        assert_eq!(scheduler.start(config()), Err(SchedulerError::AlreadyRunning));
        assert_eq!(scheduler.stop().await, RunStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_stopped_is_noop() {
        let (scheduler, _) = scheduler(ScriptedSite::default());
        assert_eq!(scheduler.stop().await, RunStatus::Stopped);
        assert_eq!(scheduler.stop().await, RunStatus::Stopped);
        assert!(scheduler.snapshot().log.is_empty());
    }

    #[test]
    fn test_next_check_saturates() {
        let now = Utc::now();
        assert_eq!(
            next_check_at(now, std::time::Duration::from_secs(600)),
            now + chrono::Duration::seconds(600)
        );
        assert_eq!(
            next_check_at(now, std::time::Duration::MAX),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_stopping_is_rejected() {
        let site = ScriptedSite {
            open_delay: std::time::Duration::from_secs(30),
            ..ScriptedSite::with_dates(&["2025-06-20"])
        };
        let (scheduler, launcher) = scheduler(site);
        scheduler.start(config()).unwrap();
        while !scheduler.snapshot().session_active {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        let stopping = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.stop().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(scheduler.start(config()), Err(SchedulerError::AlreadyRunning));
        assert!(scheduler.is_running());

        assert_eq!(stopping.await.unwrap(), RunStatus::Stopped);
        assert!(!scheduler.is_running());
        assert_eq!(launcher.journal().launches, 1);

        scheduler.start(config()).unwrap();
        assert_eq!(scheduler.snapshot().status, RunStatus::Running);
        assert_eq!(scheduler.stop().await, RunStatus::Stopped);
        assert_eq!(scheduler.snapshot().status, RunStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_demand_checks_coalesce() {
        let site = ScriptedSite {
            open_delay: std::time::Duration::from_secs(30),
            ..ScriptedSite::with_dates(&["2025-06-20"])
        };
        let (scheduler, launcher) = scheduler(site);

        let first = scheduler.request_check(config()).unwrap();
        for _ in 0..5 {
            assert_eq!(
                scheduler.request_check(config()).unwrap_err(),
                SchedulerError::CheckPending
            );
        }
        first.await.unwrap();
        assert_eq!(launcher.journal().launches, 1);

        scheduler.request_check(config()).unwrap().await.unwrap();
        assert_eq!(launcher.journal().launches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (scheduler, launcher) = scheduler(ScriptedSite::with_dates(&["2025-06-20"]));
        scheduler.start(config()).unwrap();
        scheduler.stop().await;
        scheduler.start(config()).unwrap();
        assert!(scheduler.is_running());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert_eq!(launcher.journal().live_contexts, 0);
    }
}
