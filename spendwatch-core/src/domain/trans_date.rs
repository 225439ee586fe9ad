//! Transaction date as stored in the dataset.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Canonical on-disk date format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A transaction date.
///
/// Ingestion only ever produces [`TransDate::Day`]. `Unparsed` exists so a
/// dataset with a hand-edited or legacy date still loads: count-only queries
/// see the row, date-dependent aggregates skip it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransDate {
    Day(NaiveDate),
    Unparsed(String),
}

impl TransDate {
    /// Parse the date formats the spending API and older datasets use.
    pub fn parse(raw: &str) -> Self {
        match parse_day(raw) {
            Some(day) => TransDate::Day(day),
            None => TransDate::Unparsed(raw.to_string()),
        }
    }

    pub fn day(&self) -> Option<NaiveDate> {
        match self {
            TransDate::Day(day) => Some(*day),
            TransDate::Unparsed(_) => None,
        }
    }
}

impl From<NaiveDate> for TransDate {
    fn from(day: NaiveDate) -> Self {
        TransDate::Day(day)
    }
}

/// Parse a calendar day from a date or timestamp string. Time and offset are
/// dropped: the API reports the local booking day.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(day);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

impl fmt::Display for TransDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransDate::Day(day) => write!(f, "{}", day.format(DATE_FORMAT)),
            TransDate::Unparsed(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for TransDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TransDate::parse(&raw))
    }
}
