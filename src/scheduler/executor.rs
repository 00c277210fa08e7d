//! Serialized session execution.
//!
//! Every session, whether started by the loop or on demand, goes through
//! [`SessionExecutor::execute`], which holds a single session lock for the
//! whole run. At most one browser context is therefore live at a time.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::state::RunState;
use crate::activity::{ActivityLevel, LogSink};
use crate::baseline::{effective_baseline, BaselineStore};
use crate::config::RunConfig;
use crate::driver::DriverLauncher;
use crate::humanize::{FingerprintSource, Pacing, RandomFingerprint, RandomPacing};
use crate::notify::Notifier;
use crate::session::{BookingSession, SessionDeps, SessionReport};

#[derive(Clone)]
pub(crate) struct SessionExecutor {
    pub(crate) launcher: Arc<dyn DriverLauncher>,
    pub(crate) notifier: Arc<dyn Notifier>,
    /// Overrides the pacing built from the run config.
    pub(crate) pacing: Option<Arc<dyn Pacing>>,
    /// Overrides the fingerprint source built from the run config.
    pub(crate) fingerprints: Option<Arc<dyn FingerprintSource>>,
    pub(crate) store: Option<BaselineStore>,
    pub(crate) state: Arc<RunState>,
    session_lock: Arc<Mutex<()>>,
}

impl SessionExecutor {
    pub(crate) fn new(launcher: Arc<dyn DriverLauncher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            launcher,
            notifier,
            pacing: None,
            fingerprints: None,
            store: None,
            state: Arc::new(RunState::default()),
            session_lock: Arc::new(Mutex::new(())),
        }
    }

    fn deps(&self, config: &RunConfig) -> SessionDeps {
        let pacing: Arc<dyn Pacing> = match &self.pacing {
            Some(pacing) => pacing.clone(),
            None => Arc::new(RandomPacing::from_config(&config.pacing)),
        };
        let fingerprints: Arc<dyn FingerprintSource> = match &self.fingerprints {
            Some(source) => source.clone(),
            None => Arc::new(RandomFingerprint::new(&config.fingerprint)),
        };
        SessionDeps {
            launcher: self.launcher.clone(),
            notifier: self.notifier.clone(),
            sink: self.state.log().clone(),
            pacing,
            fingerprints,
        }
    }

    /// Run one session once no other session is active.
    pub(crate) async fn execute(&self, config: &RunConfig) -> SessionReport {
        let _exclusive = self.session_lock.lock().await;

        let baseline = effective_baseline(config.current_test_date, self.state.baseline());
        self.state.set_baseline(baseline);
        let _active = ActiveSession::enter(&self.state);

        let deps = self.deps(config);
        let report = BookingSession::new(config, baseline, &deps).run().await;

        self.state.record_check(&report);
        if let Some(date) = report.new_baseline() {
            self.adopt_baseline(date);
        }
        report
    }

    fn adopt_baseline(&self, date: chrono::NaiveDate) {
        self.state.set_baseline(date);
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(date) {
            warn!(error = %e, "failed to persist new baseline");
            self.state.log().record(
                &format!("Could not save the new test date: {e}"),
                ActivityLevel::Warning,
            );
        }
    }
}

/// Marks a session as active for as long as it is alive, unwinding included.
struct ActiveSession<'a>(&'a RunState);

impl<'a> ActiveSession<'a> {
    fn enter(state: &'a RunState) -> Self {
        state.set_session_active(true);
        debug!("session lock acquired");
        Self(state)
    }
}

impl Drop for ActiveSession<'_> {
    fn drop(&mut self) {
        self.0.set_session_active(false);
    }
}
