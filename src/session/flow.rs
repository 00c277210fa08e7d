use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{earlier_dates, AvailableDate, CheckOutcome, SessionReport, SessionState};
use crate::activity::{ActivityLevel, LogSink};
use crate::config::{parse_date, RunConfig};
use crate::driver::{DriverLauncher, Locator, PageDriver};
use crate::error::{DriverError, SessionError};
use crate::humanize::{pause, type_like_human, FingerprintSource, Pacing};
use crate::notify::{format_date, notification_for, Notifier};

/// Collaborators a session drives.
#[derive(Clone)]
pub struct SessionDeps {
    pub launcher: Arc<dyn DriverLauncher>,
    pub notifier: Arc<dyn Notifier>,
    pub sink: Arc<dyn LogSink>,
    pub pacing: Arc<dyn Pacing>,
    pub fingerprints: Arc<dyn FingerprintSource>,
}

/// One login-to-outcome attempt.
pub struct BookingSession<'a> {
    id: Uuid,
    config: &'a RunConfig,
    baseline: NaiveDate,
    deps: &'a SessionDeps,
}

/// States entered so far. Only ever moves forward.
struct Trace {
    session_id: Uuid,
    states: Vec<SessionState>,
}

impl Trace {
    fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            states: vec![SessionState::Init],
        }
    }

    fn advance(&mut self, next: SessionState) {
        let current = self.states.last().copied().unwrap_or(SessionState::Init);
        if next <= current {
            warn!(session_id = %self.session_id, ?current, ?next, "ignoring backward state transition");
            return;
        }
        debug!(session_id = %self.session_id, state = ?next, "session state");
        self.states.push(next);
    }
}

impl<'a> BookingSession<'a> {
    /// `baseline` is the appointment to beat; usually
    /// `config.current_test_date` unless a rebooking moved it earlier.
    pub fn new(config: &'a RunConfig, baseline: NaiveDate, deps: &'a SessionDeps) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            baseline,
            deps,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Run to completion. Never fails: errors and panics in the flow become
    /// [`CheckOutcome::Failed`].
    pub async fn run(self) -> SessionReport {
        let started_at = Utc::now();
        info!(session_id = %self.id, baseline = %self.baseline, auto_book = self.config.auto_book, "session started");

        let mut slot: Option<Box<dyn PageDriver>> = None;
        let mut trace = Trace::new(self.id);
        let result = AssertUnwindSafe(self.drive(&mut slot, &mut trace))
            .catch_unwind()
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => CheckOutcome::Failed(err),
            Err(panic) => CheckOutcome::Failed(SessionError::Unexpected(panic_message(&*panic))),
        };

        if let Some(driver) = slot.take() {
            if let Err(e) = driver.close().await {
                warn!(session_id = %self.id, error = %e, "failed to release browser context");
            }
        }

        self.record(&outcome);
        let notified = self.notify(&outcome).await;

        let finished_at = Utc::now();
        info!(
            session_id = %self.id,
            outcome = outcome.kind(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "session finished"
        );

        SessionReport {
            session_id: self.id,
            outcome,
            trace: trace.states,
            baseline: self.baseline,
            started_at,
            finished_at,
            notified,
        }
    }

    async fn drive(
        &self,
        slot: &mut Option<Box<dyn PageDriver>>,
        trace: &mut Trace,
    ) -> Result<CheckOutcome, SessionError> {
        let site = &self.config.site;

        // Init
        let fingerprint = self.deps.fingerprints.pick();
        let options = fingerprint.launch_options(&self.config.browser);
        debug!(
            session_id = %self.id,
            user_agent = ?options.user_agent,
            viewport = ?fingerprint.viewport,
            proxied = options.proxy.is_some(),
            "acquiring browser"
        );
        let launched = self
            .deps
            .launcher
            .launch(&options)
            .await
            .map_err(|e| SessionError::DriverSetupFailed(e.to_string()))?;
        let page: &dyn PageDriver = &**slot.insert(launched);
        let (width, height) = fingerprint.viewport;
        page.set_viewport(width, height)
            .await
            .map_err(|e| SessionError::DriverSetupFailed(e.to_string()))?;
        trace.advance(SessionState::LoggedOut);

        self.login(page).await?;
        trace.advance(SessionState::LoggedIn);

        self.follow(page, &site.change_booking_link, "change booking link")
            .await?;
        self.follow(page, &site.change_date_link, "change date link")
            .await?;
        trace.advance(SessionState::OnCalendar);

        let dates = self.collect_dates(page).await?;
        info!(session_id = %self.id, count = dates.len(), "bookable dates collected");
        trace.advance(SessionState::DatesCollected);

        let Some(candidate) = earlier_dates(dates, self.baseline).into_iter().next() else {
            return Ok(CheckOutcome::NoEarlierDate);
        };
        info!(session_id = %self.id, date = %candidate.date, "earlier date found");
        trace.advance(SessionState::CandidateFound);

        if !self.config.auto_book {
            return Ok(CheckOutcome::EarlierDateFound {
                date: candidate.date,
            });
        }

        trace.advance(SessionState::Booking);
        self.book(page, candidate).await
    }

    async fn login(&self, page: &dyn PageDriver) -> Result<(), SessionError> {
        let site = &self.config.site;
        let pacing = &*self.deps.pacing;
        let credentials = &self.config.credentials;

        page.open(&site.login_url).await?;
        let licence = page.wait_for(&site.licence_input, site.form_timeout()).await?;
        pause(pacing.page_settle()).await;

        type_like_human(page, &licence, credentials.licence_number.expose(), pacing).await?;
        pause(pacing.field_pause()).await;

        let reference = page
            .wait_for(&site.reference_input, site.form_timeout())
            .await?;
        type_like_human(page, &reference, credentials.reference_number.expose(), pacing).await?;
        pause(pacing.field_pause()).await;

        let submit = page.wait_for(&site.login_submit, site.form_timeout()).await?;
        page.click(&submit).await?;
        pause(pacing.page_settle()).await;

        if let Some(indicator) = page.find_optional(&site.login_error).await? {
            let text = page.text(&indicator).await?;
            let message = match text.trim() {
                "" => "the site rejected the login".to_string(),
                t => t.to_string(),
            };
            return Err(SessionError::LoginFailed { message });
        }
        debug!(session_id = %self.id, "logged in");
        Ok(())
    }

    /// Click a navigation link that must be present.
    async fn follow(
        &self,
        page: &dyn PageDriver,
        locator: &Locator,
        step: &'static str,
    ) -> Result<(), SessionError> {
        let link = page
            .find_optional(locator)
            .await?
            .ok_or(SessionError::NavigationFailed { step })?;
        page.click(&link).await?;
        pause(self.deps.pacing.page_settle()).await;
        Ok(())
    }

    async fn collect_dates(&self, page: &dyn PageDriver) -> Result<Vec<AvailableDate>, SessionError> {
        let site = &self.config.site;
        match page.wait_for(&site.bookable_date, site.calendar_timeout()).await {
            Ok(_) => {}
            Err(DriverError::Timeout { .. }) => return Err(SessionError::NoDatesLoaded),
            Err(e) => return Err(e.into()),
        }

        let mut dates = Vec::new();
        for handle in page.find_all(&site.bookable_date).await? {
            let Some(raw) = page.attribute(&handle, &site.date_attribute).await? else {
                continue;
            };
            match parse_date(&raw) {
                Some(date) => dates.push(AvailableDate { date, handle }),
                None => warn!(session_id = %self.id, value = %raw, "skipping unparseable calendar date"),
            }
        }
        Ok(dates)
    }

    async fn book(
        &self,
        page: &dyn PageDriver,
        candidate: AvailableDate,
    ) -> Result<CheckOutcome, SessionError> {
        let site = &self.config.site;
        let pacing = &*self.deps.pacing;

        page.click(&candidate.handle).await?;
        match page.wait_for(&site.slot_list, site.slots_timeout()).await {
            Ok(_) => {}
            Err(DriverError::Timeout { .. }) => return Err(SessionError::NoSlotsAvailable),
            Err(e) => return Err(e.into()),
        }
        let slot = page
            .find_all(&site.available_slot)
            .await?
            .into_iter()
            .next()
            .ok_or(SessionError::NoSlotsAvailable)?;
        let slot_time = page.text(&slot).await?.trim().to_string();
        page.click(&slot).await?;
        pause(pacing.field_pause()).await;
        info!(session_id = %self.id, date = %candidate.date, %slot_time, "slot selected");

        let confirm = page
            .find_optional(&site.slot_confirm)
            .await?
            .ok_or(SessionError::ConfirmationStepMissing {
                step: "slot confirm button",
            })?;
        page.click(&confirm).await?;
        pause(pacing.page_settle()).await;

        let final_confirm = page
            .find_optional(&site.final_confirm)
            .await?
            .ok_or(SessionError::ConfirmationStepMissing {
                step: "final confirm button",
            })?;
        page.click(&final_confirm).await?;

        match page
            .wait_for(&site.confirmation, site.confirmation_timeout())
            .await
        {
            Ok(marker) => {
                let confirmation = page.text(&marker).await?.trim().to_string();
                Ok(CheckOutcome::Rebooked {
                    new_date: candidate.date,
                    slot_time,
                    confirmation,
                })
            }
            Err(DriverError::Timeout { .. }) => Err(SessionError::BookingUnconfirmed {
                date: candidate.date,
                slot_time,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Exactly one operator-log entry per session.
    fn record(&self, outcome: &CheckOutcome) {
        let (message, level) = match outcome {
            CheckOutcome::NoEarlierDate => (
                format!("No dates earlier than {} available", format_date(self.baseline)),
                ActivityLevel::Info,
            ),
            CheckOutcome::EarlierDateFound { date } => (
                format!("Earlier date found: {}. Book it manually.", format_date(*date)),
                ActivityLevel::Success,
            ),
            CheckOutcome::Rebooked {
                new_date,
                slot_time,
                ..
            } => (
                format!("Rebooked test to {} at {}", format_date(*new_date), slot_time),
                ActivityLevel::Success,
            ),
            CheckOutcome::Failed(err) => (format!("Check failed: {err}"), ActivityLevel::Error),
        };
        self.deps.sink.record(&message, level);
    }

    async fn notify(&self, outcome: &CheckOutcome) -> Option<bool> {
        let message = notification_for(outcome, self.baseline)?;
        let delivered = self.deps.notifier.send(&message.subject, &message.body).await;
        if !delivered {
            self.deps.sink.record(
                &format!("Failed to send notification: {}", message.subject),
                ActivityLevel::Warning,
            );
        }
        Some(delivered)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
