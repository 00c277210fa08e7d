//! Opaque credential wrapper.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// A credential value that is wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw value. Only the page driver should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Masked form that keeps the last two characters, e.g. `****7Q`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 2 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("****{tail}")
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = Secret::new("MORGA657054SM9IJ");
        assert_eq!(format!("{secret:?}"), "[redacted]");
    }

    #[test]
    fn test_masked_keeps_tail() {
        assert_eq!(Secret::new("MORGA657054SM9IJ").masked(), "****IJ");
        assert_eq!(Secret::new("ab").masked(), "**");
        assert_eq!(Secret::default().masked(), "");
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(Secret::new("   ").is_empty());
        assert!(!Secret::new("x").is_empty());
    }
}
