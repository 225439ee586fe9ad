//! Run state: the last day an ingestion cycle completed, persisted as JSON.
//!
//! Written with tmp + rename so a crash mid-save leaves the previous record.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Latest day whose cycle finished without error (including no-data days).
    pub last_processed_date: Option<NaiveDate>,
    pub last_attempt: Option<NaiveDateTime>,
    /// Message of the most recent failure, cleared on the next success.
    pub last_error: Option<String>,
}

impl RunState {
    /// Load state from disk. Returns defaults if the file is missing or corrupt.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("ignoring corrupt run state {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save state atomically. Creates parent directories if needed.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)
    }

    /// Record a completed cycle. Never moves the processed date backwards,
    /// so a manual backfill of an old day leaves the scheduler's view intact.
    pub fn record_success(&mut self, day: NaiveDate, at: NaiveDateTime) {
        self.last_attempt = Some(at);
        self.last_error = None;
        self.last_processed_date = Some(match self.last_processed_date {
            Some(prev) if prev > day => prev,
            _ => day,
        });
    }

    pub fn record_failure(&mut self, error: impl Into<String>, at: NaiveDateTime) {
        self.last_attempt = Some(at);
        self.last_error = Some(error.into());
    }

    /// True if `day` has not been processed yet.
    pub fn needs(&self, day: NaiveDate) -> bool {
        self.last_processed_date.map_or(true, |done| done < day)
    }
}
