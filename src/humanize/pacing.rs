use std::time::Duration;

use rand::Rng;

use crate::config::PacingConfig;

/// Delay distribution used while driving the page.
pub trait Pacing: Send + Sync {
    /// Delay after each typed character.
    fn keystroke(&self) -> Duration;

    /// Pause between form fields.
    fn field_pause(&self) -> Duration;

    /// Pause after a navigation or click that loads a new page.
    fn page_settle(&self) -> Duration;
}

/// Uniform draws from the configured millisecond ranges.
#[derive(Debug, Clone)]
pub struct RandomPacing {
    keystroke_ms: [u64; 2],
    field_pause_ms: [u64; 2],
    page_settle_ms: [u64; 2],
}

impl RandomPacing {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            keystroke_ms: config.keystroke_ms,
            field_pause_ms: config.field_pause_ms,
            page_settle_ms: config.page_settle_ms,
        }
    }
}

impl Pacing for RandomPacing {
    fn keystroke(&self) -> Duration {
        draw(self.keystroke_ms)
    }

    fn field_pause(&self) -> Duration {
        draw(self.field_pause_ms)
    }

    fn page_settle(&self) -> Duration {
        draw(self.page_settle_ms)
    }
}

fn draw([lo, hi]: [u64; 2]) -> Duration {
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// Constant delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPacing {
    pub keystroke: Duration,
    pub field_pause: Duration,
    pub page_settle: Duration,
}

impl FixedPacing {
    pub fn zero() -> Self {
        Self {
            keystroke: Duration::ZERO,
            field_pause: Duration::ZERO,
            page_settle: Duration::ZERO,
        }
    }
}

impl Pacing for FixedPacing {
    fn keystroke(&self) -> Duration {
        self.keystroke
    }

    fn field_pause(&self) -> Duration {
        self.field_pause
    }

    fn page_settle(&self) -> Duration {
        self.page_settle
    }
}
