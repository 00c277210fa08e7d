//! Run lifecycle state shared between the scheduler and its observers.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::activity::{ActivityEntry, ActivityLog};
use crate::session::SessionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Stopped,
    Running,
    /// Stop requested; the in-flight session is finishing.
    Stopping,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Stopped => "stopped",
            RunStatus::Running => "running",
            RunStatus::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Read-only view handed to observers.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    /// Appointment the next session compares against.
    pub baseline: Option<NaiveDate>,
    pub session_active: bool,
    pub last_session_id: Option<Uuid>,
    pub last_outcome: Option<String>,
    pub log: Vec<ActivityEntry>,
}

#[derive(Debug)]
struct Fields {
    status: RunStatus,
    last_check: Option<DateTime<Utc>>,
    next_check: Option<DateTime<Utc>>,
    baseline: Option<NaiveDate>,
    session_active: bool,
    last_session_id: Option<Uuid>,
    last_outcome: Option<String>,
}

/// Owned by the scheduler; observers only see [`RunSnapshot`]s.
#[derive(Debug)]
pub struct RunState {
    fields: RwLock<Fields>,
    log: Arc<ActivityLog>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(Arc::new(ActivityLog::new()))
    }
}

impl RunState {
    pub fn new(log: Arc<ActivityLog>) -> Self {
        Self {
            fields: RwLock::new(Fields {
                status: RunStatus::Stopped,
                last_check: None,
                next_check: None,
                baseline: None,
                session_active: false,
                last_session_id: None,
                last_outcome: None,
            }),
            log,
        }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let fields = self.read();
        RunSnapshot {
            status: fields.status,
            last_check: fields.last_check,
            next_check: fields.next_check,
            baseline: fields.baseline,
            session_active: fields.session_active,
            last_session_id: fields.last_session_id,
            last_outcome: fields.last_outcome.clone(),
            log: self.log.entries(),
        }
    }

    pub fn status(&self) -> RunStatus {
        self.read().status
    }

    pub fn baseline(&self) -> Option<NaiveDate> {
        self.read().baseline
    }

    pub fn log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    pub(crate) fn set_status(&self, status: RunStatus) {
        self.write().status = status;
    }

    /// Move `from` to `to`; leaves any other status alone.
    pub(crate) fn transition(&self, from: RunStatus, to: RunStatus) -> bool {
        let mut fields = self.write();
        if fields.status == from {
            fields.status = to;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_next_check(&self, at: Option<DateTime<Utc>>) {
        self.write().next_check = at;
    }

    pub(crate) fn set_baseline(&self, date: NaiveDate) {
        self.write().baseline = Some(date);
    }

    pub(crate) fn set_session_active(&self, active: bool) {
        self.write().session_active = active;
    }

    pub(crate) fn record_check(&self, report: &SessionReport) {
        let mut fields = self.write();
        fields.last_check = Some(report.finished_at);
        fields.last_session_id = Some(report.session_id);
        fields.last_outcome = Some(report.outcome.to_string());
    }

    fn read(&self) -> RwLockReadGuard<'_, Fields> {
        self.fields.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fields> {
        self.fields.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityLevel, LogSink};
    use crate::session::{CheckOutcome, SessionState};
    use chrono::NaiveDate;

    #[test]
    fn test_starts_stopped_and_empty() {
        let state = RunState::default();
        let snap = state.snapshot();
        assert_eq!(snap.status, RunStatus::Stopped);
        assert!(snap.last_check.is_none());
        assert!(snap.next_check.is_none());
        assert!(!snap.session_active);
        assert!(snap.log.is_empty());
    }

    #[test]
    fn test_transition_only_from_expected_status() {
        let state = RunState::default();
        assert!(!state.transition(RunStatus::Running, RunStatus::Stopping));
        state.set_status(RunStatus::Running);
        assert!(state.transition(RunStatus::Running, RunStatus::Stopping));
        assert_eq!(state.status(), RunStatus::Stopping);
    }

    #[test]
    fn test_snapshot_includes_log_and_outcome() {
        let state = RunState::default();
        state.log().record("Started", ActivityLevel::Info);
        let report = SessionReport {
            session_id: Uuid::new_v4(),
            outcome: CheckOutcome::NoEarlierDate,
            trace: vec![SessionState::Init],
            baseline: NaiveDate::from_ymd_opt(2025, 6, 15).unwrap(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            notified: None,
        };
        state.record_check(&report);
        let snap = state.snapshot();
        assert_eq!(snap.last_session_id, Some(report.session_id));
        assert_eq!(snap.last_check, Some(report.finished_at));
        assert_eq!(snap.log.len(), 1);
        assert_eq!(snap.last_outcome.as_deref(), Some("no earlier date available"));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["log"][0]["level"], "info");
    }
}
