//! EDRPOU entity identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minimum width of an EDRPOU code. Shorter digit strings lost their leading
/// zeros somewhere upstream and are padded back.
pub const EDRPOU_WIDTH: usize = 8;

/// Fixed-format entity identifier (EDRPOU, or a 10-digit personal tax number).
///
/// Codes built by [`EntityCode::parse`] are ASCII digits, at least
/// [`EDRPOU_WIDTH`] characters long. A counterparty the source did not
/// identify (masked individuals arrive with an empty code) is kept as an
/// [`EntityCode::unknown`] value holding the trimmed raw text. Unknown codes
/// never equal a parsed one, so they never match an allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityCode(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityCodeError {
    #[error("entity code is empty")]
    Empty,

    #[error("entity code '{0}' contains non-digit characters")]
    NonDigit(String),
}

impl EntityCode {
    /// Parse and normalize a code: trims whitespace and left-pads with zeros.
    pub fn parse(raw: &str) -> Result<Self, EntityCodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EntityCodeError::Empty);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(EntityCodeError::NonDigit(trimmed.to_string()));
        }
        Ok(Self(format!("{trimmed:0>width$}", width = EDRPOU_WIDTH)))
    }

    /// Build a code from a numeric JSON value (the API sometimes drops the quotes).
    pub fn from_number(n: u64) -> Self {
        Self(format!("{n:0>width$}", width = EDRPOU_WIDTH))
    }

    /// Keep a code that failed [`EntityCode::parse`] as its trimmed raw text.
    pub fn unknown(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    /// Whether this is a well-formed code rather than an [`EntityCode::unknown`] one.
    pub fn is_known(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityCode {
    type Err = EntityCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for EntityCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for EntityCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Dataset rows may carry an unknown counterparty code; it loads back as one.
impl<'de> Deserialize<'de> for EntityCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw).unwrap_or_else(|_| Self::unknown(&raw)))
    }
}
