//! Humanization policies: typing pace and browser fingerprint.
//!
//! Both are traits so deterministic values can be injected; the random
//! implementations draw from the ranges in the configuration.

mod fingerprint;
mod pacing;

pub use fingerprint::{Fingerprint, FingerprintSource, FixedFingerprint, RandomFingerprint};
pub use pacing::{FixedPacing, Pacing, RandomPacing};

use std::time::Duration;

use crate::driver::{ElementRef, PageDriver};
use crate::error::DriverError;

/// Type `text` one character at a time with a keystroke delay in between.
pub async fn type_like_human(
    driver: &dyn PageDriver,
    element: &ElementRef,
    text: &str,
    pacing: &dyn Pacing,
) -> Result<(), DriverError> {
    for ch in text.chars() {
        driver.send_keys(element, &ch.to_string()).await?;
        pause(pacing.keystroke()).await;
    }
    Ok(())
}

/// Sleep for `delay`, skipping the timer entirely for zero.
pub async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
