//! Persisted operator baseline.
//!
//! After a rebooking the new appointment date is written to a small JSON
//! file so a restarted process keeps comparing against it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBaseline {
    pub current_test_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored baseline, or `None` if nothing has been written yet.
    pub fn load(&self) -> Result<Option<PersistedBaseline>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted baseline");
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read baseline file: {}", self.path.display()))?;
        let stored = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse baseline file: {}", self.path.display()))?;
        Ok(Some(stored))
    }

    /// Write `date` as the new baseline, replacing the file atomically.
    pub fn save(&self, date: NaiveDate) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let record = PersistedBaseline {
            current_test_date: date,
            updated_at: Utc::now(),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&record)?)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(path = %self.path.display(), %date, "baseline persisted");
        Ok(())
    }
}

/// The date to compare against: the configured one, unless a persisted
/// baseline is earlier.
pub fn effective_baseline(configured: NaiveDate, persisted: Option<NaiveDate>) -> NaiveDate {
    match persisted {
        Some(stored) if stored < configured => stored,
        _ => configured,
    }
}
