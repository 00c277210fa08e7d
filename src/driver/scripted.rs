//! In-memory booking site implementing [`PageDriver`] and [`DriverLauncher`].
//!
//! The scripted site walks the same pages as the real one (login, booking
//! overview, change booking, calendar, slot picker, review, confirmation) and
//! resolves locators by comparing them with a [`SiteConfig`]. Every call is
//! recorded in a shared [`Journal`], including how many browser contexts are
//! open at once. The test-suite drives sessions and the scheduler with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{DriverLauncher, ElementRef, LaunchOptions, Locator, PageDriver};
use crate::config::SiteConfig;
use crate::error::DriverError;

// ---------------------------------------------------------------------------
// Site model
// ---------------------------------------------------------------------------

/// A time slot offered for the chosen date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedSlot {
    pub time: String,
    pub available: bool,
}

impl ScriptedSlot {
    pub fn open(time: &str) -> Self {
        Self {
            time: time.to_string(),
            available: true,
        }
    }

    pub fn taken(time: &str) -> Self {
        Self {
            time: time.to_string(),
            available: false,
        }
    }
}

/// What the simulated site shows. `Default` is a site where every step
/// succeeds but no dates are offered.
#[derive(Debug, Clone)]
pub struct ScriptedSite {
    /// Fail `launch` with this message.
    pub launch_error: Option<String>,
    /// Show this error summary after the login form is submitted.
    pub login_error: Option<String>,
    pub change_booking_link: bool,
    pub change_date_link: bool,
    /// Values of the date attribute on bookable calendar cells.
    pub bookable_dates: Vec<String>,
    pub slots: Vec<ScriptedSlot>,
    pub slot_confirm: bool,
    pub final_confirm: bool,
    /// Confirmation text shown after the final confirm. `None` never renders.
    pub confirmation: Option<String>,
    /// Time spent in `open`, to keep a browser context busy.
    pub open_delay: Duration,
    /// Panic while the calendar is being read.
    pub panic_on_calendar: bool,
}

impl Default for ScriptedSite {
    fn default() -> Self {
        Self {
            launch_error: None,
            login_error: None,
            change_booking_link: true,
            change_date_link: true,
            bookable_dates: Vec::new(),
            slots: vec![ScriptedSlot::taken("08:10"), ScriptedSlot::open("08:57")],
            slot_confirm: true,
            final_confirm: true,
            confirmation: Some("Your booking has been changed".to_string()),
            open_delay: Duration::ZERO,
            panic_on_calendar: false,
        }
    }
}

impl ScriptedSite {
    /// A site offering the given `YYYY-MM-DD` dates.
    pub fn with_dates(dates: &[&str]) -> Self {
        Self {
            bookable_dates: dates.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn rejecting_login(mut self, message: &str) -> Self {
        self.login_error = Some(message.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Everything the scripted site observed.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub launches: usize,
    pub closes: usize,
    /// Browser contexts currently open.
    pub live_contexts: usize,
    /// Highest number of simultaneously open contexts.
    pub max_live_contexts: usize,
    pub launch_options: Vec<LaunchOptions>,
    pub viewports: Vec<(u32, u32)>,
    pub opened_urls: Vec<String>,
    /// Text typed per field id (`licence`, `reference`).
    pub typed: HashMap<String, String>,
    /// Number of `send_keys` calls.
    pub keystrokes: usize,
    /// Ids of clicked elements, in order.
    pub clicks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Hands out [`ScriptedPage`]s that all share one journal.
#[derive(Clone)]
pub struct ScriptedLauncher {
    site: Arc<ScriptedSite>,
    selectors: Arc<SiteConfig>,
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedLauncher {
    pub fn new(site: ScriptedSite, selectors: SiteConfig) -> Self {
        Self {
            site: Arc::new(site),
            selectors: Arc::new(selectors),
            journal: Arc::new(Mutex::new(Journal::default())),
        }
    }

    /// Snapshot of the journal.
    pub fn journal(&self) -> Journal {
        lock(&self.journal).clone()
    }
}

#[async_trait]
impl DriverLauncher for ScriptedLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn PageDriver>, DriverError> {
        if let Some(message) = &self.site.launch_error {
            return Err(DriverError::Launch(message.clone()));
        }
        {
            let mut journal = lock(&self.journal);
            journal.launches += 1;
            journal.live_contexts += 1;
            journal.max_live_contexts = journal.max_live_contexts.max(journal.live_contexts);
            journal.launch_options.push(options.clone());
        }
        Ok(Box::new(ScriptedPage {
            site: self.site.clone(),
            selectors: self.selectors.clone(),
            journal: self.journal.clone(),
            page: Mutex::new(Page::Blank),
            closed: AtomicBool::new(false),
        }))
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Blank,
    Login,
    LoginRejected,
    Overview,
    ChangeBooking,
    Calendar,
    SlotPicker { selected: Option<usize> },
    Review,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    LicenceInput,
    ReferenceInput,
    LoginSubmit,
    LoginError,
    ChangeBookingLink,
    ChangeDateLink,
    BookableDate,
    SlotList,
    AvailableSlot,
    SlotConfirm,
    FinalConfirm,
    Confirmation,
}

/// One simulated browser context.
pub struct ScriptedPage {
    site: Arc<ScriptedSite>,
    selectors: Arc<SiteConfig>,
    journal: Arc<Mutex<Journal>>,
    page: Mutex<Page>,
    closed: AtomicBool,
}

impl ScriptedPage {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Transport("browser context already closed".into()));
        }
        Ok(())
    }

    fn role_of(&self, locator: &Locator) -> Option<Role> {
        let s = &*self.selectors;
        let table = [
            (&s.licence_input, Role::LicenceInput),
            (&s.reference_input, Role::ReferenceInput),
            (&s.login_submit, Role::LoginSubmit),
            (&s.login_error, Role::LoginError),
            (&s.change_booking_link, Role::ChangeBookingLink),
            (&s.change_date_link, Role::ChangeDateLink),
            (&s.bookable_date, Role::BookableDate),
            (&s.slot_list, Role::SlotList),
            (&s.available_slot, Role::AvailableSlot),
            (&s.slot_confirm, Role::SlotConfirm),
            (&s.final_confirm, Role::FinalConfirm),
            (&s.confirmation, Role::Confirmation),
        ];
        table
            .into_iter()
            .find(|(candidate, _)| *candidate == locator)
            .map(|(_, role)| role)
    }

    fn visible(&self, locator: &Locator) -> Vec<ElementRef> {
        let Some(role) = self.role_of(locator) else {
            return Vec::new();
        };
        let page = *lock(&self.page);
        let site = &*self.site;
        let one = |id: &str| vec![ElementRef::new(id)];

        match (page, role) {
            (Page::Login | Page::LoginRejected, Role::LicenceInput) => one("licence"),
            (Page::Login | Page::LoginRejected, Role::ReferenceInput) => one("reference"),
            (Page::Login | Page::LoginRejected, Role::LoginSubmit) => one("submit"),
            (Page::LoginRejected, Role::LoginError) => one("login-error"),
            (Page::Overview, Role::ChangeBookingLink) if site.change_booking_link => {
                one("change-booking")
            }
            (Page::ChangeBooking, Role::ChangeDateLink) if site.change_date_link => {
                one("change-date")
            }
            (Page::Calendar, Role::BookableDate) => {
                if site.panic_on_calendar {
                    panic!("calendar markup changed unexpectedly");
                }
                (0..site.bookable_dates.len())
                    .map(|i| ElementRef::new(format!("date:{i}")))
                    .collect()
            }
            (Page::SlotPicker { .. }, Role::SlotList) => one("slot-list"),
            (Page::SlotPicker { .. }, Role::AvailableSlot) => site
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.available)
                .map(|(i, _)| ElementRef::new(format!("slot:{i}")))
                .collect(),
            (Page::SlotPicker { selected: Some(_) }, Role::SlotConfirm) if site.slot_confirm => {
                one("slot-confirm")
            }
            (Page::Review, Role::FinalConfirm) if site.final_confirm => one("final-confirm"),
            (Page::Confirmed, Role::Confirmation) if site.confirmation.is_some() => {
                one("confirmation")
            }
            _ => Vec::new(),
        }
    }
}

fn indexed(element: &ElementRef, prefix: &str) -> Option<usize> {
    element.id().strip_prefix(prefix)?.parse().ok()
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn open(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        if !self.site.open_delay.is_zero() {
            tokio::time::sleep(self.site.open_delay).await;
        }
        lock(&self.journal).opened_urls.push(url.to_string());
        let next = if url == self.selectors.login_url {
            Page::Login
        } else {
            Page::Blank
        };
        *lock(&self.page) = next;
        Ok(())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        self.ensure_open()?;
        self.visible(locator)
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::Timeout {
                locator: locator.to_string(),
                timeout,
            })
    }

    async fn find_optional(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError> {
        self.ensure_open()?;
        Ok(self.visible(locator).into_iter().next())
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError> {
        self.ensure_open()?;
        Ok(self.visible(locator))
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut journal = lock(&self.journal);
        journal.keystrokes += 1;
        journal
            .typed
            .entry(element.id().to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.ensure_open()?;
        lock(&self.journal).clicks.push(element.id().to_string());

        let mut page = lock(&self.page);
        let id = element.id();
        *page = match (*page, id) {
            (Page::Login | Page::LoginRejected, "submit") => {
                if self.site.login_error.is_some() {
                    Page::LoginRejected
                } else {
                    Page::Overview
                }
            }
            (Page::Overview, "change-booking") => Page::ChangeBooking,
            (Page::ChangeBooking, "change-date") => Page::Calendar,
            (Page::Calendar, _) if indexed(element, "date:").is_some() => {
                Page::SlotPicker { selected: None }
            }
            (Page::SlotPicker { .. }, _) if indexed(element, "slot:").is_some() => {
                Page::SlotPicker {
                    selected: indexed(element, "slot:"),
                }
            }
            (Page::SlotPicker { selected: Some(_) }, "slot-confirm") => Page::Review,
            (Page::Review, "final-confirm") => Page::Confirmed,
            (current, _) => {
                return Err(DriverError::StaleElement(format!(
                    "{id} (page {current:?})"
                )))
            }
        };
        Ok(())
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.ensure_open()?;
        if name != self.selectors.date_attribute {
            return Ok(None);
        }
        Ok(indexed(element, "date:").and_then(|i| self.site.bookable_dates.get(i).cloned()))
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        self.ensure_open()?;
        let site = &*self.site;
        let text = match element.id() {
            "login-error" => site.login_error.clone().unwrap_or_default(),
            "confirmation" => site.confirmation.clone().unwrap_or_default(),
            _ => indexed(element, "slot:")
                .and_then(|i| site.slots.get(i))
                .map(|slot| format!("  {}  ", slot.time))
                .unwrap_or_default(),
        };
        Ok(text)
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DriverError> {
        self.ensure_open()?;
        lock(&self.journal).viewports.push((width, height));
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Transport("browser context already closed".into()));
        }
        let mut journal = lock(&self.journal);
        journal.closes += 1;
        journal.live_contexts = journal.live_contexts.saturating_sub(1);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
