//! Error taxonomy shared by the configuration layer, the page driver, the
//! booking session and the scheduler.

use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Configuration rejected before any session starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),

    #[error("invalid date `{value}` for `{field}`: expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, value: String },

    #[error("`{field}` is {minutes} minutes; must be at least {floor}")]
    IntervalTooShort {
        field: &'static str,
        minutes: u64,
        floor: u64,
    },

    #[error("`{field}` is {minutes} minutes; must be at most {ceiling}")]
    IntervalTooLong {
        field: &'static str,
        minutes: u64,
        ceiling: u64,
    },

    #[error("min_minutes ({min}) is greater than max_minutes ({max})")]
    IntervalInverted { min: u64, max: u64 },

    #[error("schedule.error_cooldown_secs is {secs}; must be between {min} and {max}")]
    CooldownOutOfRange { secs: u64, min: u64, max: u64 },

    #[error("range `{field}` is inverted: {min} > {max}")]
    InvalidRange {
        field: &'static str,
        min: u64,
        max: u64,
    },

    #[error("invalid URL `{value}` for `{field}`")]
    InvalidUrl { field: &'static str, value: String },
}

/// Failures reported by a [`PageDriver`](crate::driver::PageDriver).
///
/// Absence of an element is not an error: drivers return `Option` for that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("timed out after {}s waiting for {locator}", .timeout.as_secs())]
    Timeout { locator: String, timeout: Duration },

    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("webdriver error `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("webdriver transport failure: {0}")]
    Transport(String),

    #[error("element {0} is no longer attached to the page")]
    StaleElement(String),
}

/// Modeled failures of a single booking session.
///
/// Every variant ends the session cleanly; none of them stop the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("browser setup failed: {0}")]
    DriverSetupFailed(String),

    #[error("login failed: {message}")]
    LoginFailed { message: String },

    #[error("navigation failed: {step} not found")]
    NavigationFailed { step: &'static str },

    #[error("no bookable dates loaded on the calendar")]
    NoDatesLoaded,

    #[error("no time slots available for the selected date")]
    NoSlotsAvailable,

    #[error("confirmation step missing: {step} not found")]
    ConfirmationStepMissing { step: &'static str },

    #[error("could not confirm booking for {date} at {slot_time}")]
    BookingUnconfirmed { date: NaiveDate, slot_time: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl SessionError {
    /// Short machine-friendly name of the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::DriverSetupFailed(_) => "driver_setup_failed",
            SessionError::LoginFailed { .. } => "login_failed",
            SessionError::NavigationFailed { .. } => "navigation_failed",
            SessionError::NoDatesLoaded => "no_dates_loaded",
            SessionError::NoSlotsAvailable => "no_slots_available",
            SessionError::ConfirmationStepMissing { .. } => "confirmation_step_missing",
            SessionError::BookingUnconfirmed { .. } => "booking_unconfirmed",
            SessionError::Driver(_) => "driver_error",
            SessionError::Unexpected(_) => "unexpected_error",
        }
    }
}

/// Lifecycle errors surfaced by the [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("the check loop is already running")]
    AlreadyRunning,

    #[error("an on-demand check is already pending")]
    CheckPending,
}

impl SchedulerError {
    /// Stable tag used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::AlreadyRunning => "already_running",
            SchedulerError::CheckPending => "check_pending",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_locator() {
        let err = DriverError::Timeout {
            locator: "css=.BookingCalendar-date--bookable".into(),
            timeout: Duration::from_secs(15),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 15s waiting for css=.BookingCalendar-date--bookable"
        );
    }

    #[test]
    fn test_driver_error_converts_into_session_error() {
        let err: SessionError = DriverError::Transport("connection refused".into()).into();
        assert_eq!(err.kind(), "driver_error");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_unconfirmed_booking_keeps_date_and_slot() {
        let err = SessionError::BookingUnconfirmed {
            date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            slot_time: "08:57".into(),
        };
        assert_eq!(
            err.to_string(),
            "could not confirm booking for 2025-06-10 at 08:57"
        );
    }
}
