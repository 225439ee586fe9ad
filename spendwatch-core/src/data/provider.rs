//! Transaction source trait and fetch error types.
//!
//! The `TransactionSource` trait abstracts over where a day of raw records
//! comes from (the spending API, a recorded fixture) so the ingestion cycle
//! can be exercised without the network.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::RawTransaction;

/// Result of a successful fetch for one day.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Records(Vec<RawTransaction>),
    /// The API answered but reported nothing for the day. Expected, not an error.
    NoData,
}

impl FetchOutcome {
    pub fn len(&self) -> usize {
        match self {
            FetchOutcome::Records(records) => records.len(),
            FetchOutcome::NoData => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetch failures. None of these are retried by the fetcher; the day is
/// picked up again only by the next firing or a manual run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP {status} from spending API")]
    HttpStatus { status: u16 },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// A source of raw daily transaction records.
pub trait TransactionSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch all records booked on `day`.
    fn fetch(&self, day: NaiveDate) -> Result<FetchOutcome, FetchError>;
}
