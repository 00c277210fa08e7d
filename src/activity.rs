//! Operator-facing activity log.
//!
//! A bounded FIFO of timestamped, leveled entries. When full the oldest entry
//! is evicted. Every entry is mirrored to `tracing`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Entries kept by [`ActivityLog::new`].
pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityLevel::Info => "info",
            ActivityLevel::Warning => "warning",
            ActivityLevel::Error => "error",
            ActivityLevel::Success => "success",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub level: ActivityLevel,
    pub message: String,
}

/// Receives operator-visible events.
pub trait LogSink: Send + Sync {
    fn record(&self, message: &str, level: ActivityLevel);
}

#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Copy of the entries, oldest first.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ActivityEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LogSink for ActivityLog {
    fn record(&self, message: &str, level: ActivityLevel) {
        match level {
            ActivityLevel::Info | ActivityLevel::Success => info!(%level, "{message}"),
            ActivityLevel::Warning => warn!("{message}"),
            ActivityLevel::Error => error!("{message}"),
        }

        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            at: Utc::now(),
            level,
            message: message.to_string(),
        });
    }
}
