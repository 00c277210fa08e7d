//! Page-driver capability consumed by the booking session.
//!
//! The session never talks to a browser directly. It acquires a
//! [`PageDriver`] through a [`DriverLauncher`] and only uses the small set of
//! primitives below. Element absence is reported as `Option`, every wait has
//! an explicit timeout, and `close` releases the browser context.

pub mod scripted;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;

// ---------------------------------------------------------------------------
// Locator
// ---------------------------------------------------------------------------

/// How to find an element on the page.
///
/// Parsed from `css=...`, `xpath=...` or a bare CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(expr) = raw.strip_prefix("xpath=") {
            Locator::XPath(expr.to_string())
        } else if let Some(sel) = raw.strip_prefix("css=") {
            Locator::Css(sel.to_string())
        } else {
            Locator::Css(raw.to_string())
        }
    }

    /// The W3C WebDriver location strategy name.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Css(v) | Locator::XPath(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(v) => write!(f, "css={v}"),
            Locator::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

// ---------------------------------------------------------------------------
// ElementRef
// ---------------------------------------------------------------------------

/// Opaque handle to an element of the live page.
///
/// Only meaningful to the driver that produced it, and only until that
/// driver is closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// LaunchOptions
// ---------------------------------------------------------------------------

/// Settings that must be fixed before a browser context is acquired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Disable the browser sandbox and `/dev/shm` usage (containers).
    pub no_sandbox: bool,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl LaunchOptions {
    /// Chrome command-line switches for these options.
    pub fn chrome_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
            args.push("--disable-dev-shm-usage".to_string());
        }
        args.push("--disable-blink-features=AutomationControlled".to_string());
        args.push("--disable-features=IsolateOrigins,site-per-process".to_string());
        if let Some(ua) = &self.user_agent {
            args.push(format!("user-agent={ua}"));
        }
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        args
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Scripted interaction with a single browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `url`.
    async fn open(&self, url: &str) -> Result<(), DriverError>;

    /// Wait until `locator` matches, or fail with [`DriverError::Timeout`].
    async fn wait_for(&self, locator: &Locator, timeout: Duration)
        -> Result<ElementRef, DriverError>;

    /// First element matching `locator`, if any.
    async fn find_optional(&self, locator: &Locator) -> Result<Option<ElementRef>, DriverError>;

    /// Every element matching `locator`, in document order.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementRef>, DriverError>;

    /// Type `text` into `element` in one go. Humanized typing calls this once
    /// per character; see [`crate::humanize::type_like_human`].
    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError>;

    async fn attribute(&self, element: &ElementRef, name: &str)
        -> Result<Option<String>, DriverError>;

    /// Visible text of `element`.
    async fn text(&self, element: &ElementRef) -> Result<String, DriverError>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<(), DriverError>;

    /// Release the browser context. Called exactly once per acquired driver.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Acquires fresh browser contexts.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn PageDriver>, DriverError>;
}
