//! One end-to-end check against the booking site.
//!
//! A [`BookingSession`] walks a forward-only state machine
//! (`Init → LoggedOut → LoggedIn → OnCalendar → DatesCollected →
//! CandidateFound → Booking`) and ends in a [`CheckOutcome`]. Every failure,
//! including a panic inside the flow, is converted into
//! [`CheckOutcome::Failed`]; the browser context is released on every path.

mod flow;

pub use flow::{BookingSession, SessionDeps};
pub(crate) use flow::panic_message;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::driver::ElementRef;
use crate::error::SessionError;

/// Session progress, in the only order it may advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    LoggedOut,
    LoggedIn,
    OnCalendar,
    DatesCollected,
    CandidateFound,
    Booking,
}

/// A bookable calendar date and its element on the live page.
///
/// Only valid inside the session that collected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableDate {
    pub date: NaiveDate,
    pub handle: ElementRef,
}

/// Dates strictly earlier than `baseline`, earliest first.
pub fn earlier_dates(mut dates: Vec<AvailableDate>, baseline: NaiveDate) -> Vec<AvailableDate> {
    dates.retain(|d| d.date < baseline);
    dates.sort_by_key(|d| d.date);
    dates
}

/// Result of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NoEarlierDate,
    EarlierDateFound {
        date: NaiveDate,
    },
    Rebooked {
        new_date: NaiveDate,
        slot_time: String,
        /// Text of the site's confirmation marker.
        confirmation: String,
    },
    Failed(SessionError),
}

impl CheckOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            CheckOutcome::NoEarlierDate => "no_earlier_date",
            CheckOutcome::EarlierDateFound { .. } => "earlier_date_found",
            CheckOutcome::Rebooked { .. } => "rebooked",
            CheckOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::NoEarlierDate => f.write_str("no earlier date available"),
            CheckOutcome::EarlierDateFound { date } => write!(f, "earlier date found: {date}"),
            CheckOutcome::Rebooked {
                new_date,
                slot_time,
                ..
            } => write!(f, "rebooked to {new_date} at {slot_time}"),
            CheckOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Everything the caller learns from a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub outcome: CheckOutcome,
    /// States entered, in order.
    pub trace: Vec<SessionState>,
    /// The date the session compared against.
    pub baseline: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `Some(delivered)` when the outcome called for a notification.
    pub notified: Option<bool>,
}

impl SessionReport {
    /// The operator's new appointment, when this session rebooked.
    pub fn new_baseline(&self) -> Option<NaiveDate> {
        match &self.outcome {
            CheckOutcome::Rebooked { new_date, .. } => Some(*new_date),
            _ => None,
        }
    }

    pub fn reached(&self, state: SessionState) -> bool {
        self.trace.contains(&state)
    }
}
