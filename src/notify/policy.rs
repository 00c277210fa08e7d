use chrono::NaiveDate;

use crate::error::SessionError;
use crate::session::CheckOutcome;

/// A message ready to hand to a [`Notifier`](super::Notifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Long human form, e.g. `Tuesday, 10 June 2025`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %d %B %Y").to_string()
}

/// The single message for a session outcome, if it calls for one.
///
/// `baseline` is the appointment the session compared against.
pub fn notification_for(outcome: &CheckOutcome, baseline: NaiveDate) -> Option<Notification> {
    let message = match outcome {
        CheckOutcome::NoEarlierDate => return None,
        CheckOutcome::EarlierDateFound { date } => Notification {
            subject: "Earlier Test Date Available!".to_string(),
            body: format!(
                "An earlier driving test date is available: {}\n\n\
                 Your current test date: {}\n\n\
                 Log in to the booking site to book it manually.",
                format_date(*date),
                format_date(baseline),
            ),
        },
        CheckOutcome::Rebooked {
            new_date,
            slot_time,
            confirmation,
        } => Notification {
            subject: "Test Successfully Rebooked!".to_string(),
            body: format!(
                "Your driving test has been rebooked.\n\n\
                 Previous date: {}\n\
                 New date: {}\n\
                 Time: {}\n\n\
                 Confirmation: {}",
                format_date(baseline),
                format_date(*new_date),
                slot_time,
                confirmation,
            ),
        },
        CheckOutcome::Failed(SessionError::BookingUnconfirmed { date, slot_time }) => {
            Notification {
                subject: "Booking Unconfirmed, Please Verify".to_string(),
                body: format!(
                    "A booking for {} at {} was submitted but no confirmation appeared.\n\n\
                     The booking may have gone through. Log in and check your appointment; \
                     your recorded test date is still {}.",
                    format_date(*date),
                    slot_time,
                    format_date(baseline),
                ),
            }
        }
        CheckOutcome::Failed(err) => Notification {
            subject: "Slot Check Error".to_string(),
            body: format!("The slot check failed: {err}\n\nThe next check is still scheduled."),
        },
    };
    Some(message)
}

/// Fixed message sent by `slotwatch test-notification`.
pub fn test_notification() -> Notification {
    Notification {
        subject: "Slotwatch Test Notification".to_string(),
        body: "This is a test notification from slotwatch. If you received it, \
               notifications are configured correctly."
            .to_string(),
    }
}
