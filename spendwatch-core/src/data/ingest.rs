//! One ingestion cycle: fetch a day → project/filter → merge into the store.

use chrono::NaiveDate;
use thiserror::Error;

use super::projection;
use super::provider::{FetchError, FetchOutcome, TransactionSource};
use super::store::{CsvStore, MergeReport, PersistError};
use crate::allowlist::Allowlist;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed for {day}: {source}")]
    Fetch {
        day: NaiveDate,
        #[source]
        source: FetchError,
    },

    #[error("persist failed for {day}: {source}")]
    Persist {
        day: NaiveDate,
        #[source]
        source: PersistError,
    },
}

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The API had nothing for the day; the store was not touched.
    NoData,
    Ingested(IngestSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: usize,
    pub kept: usize,
    pub rejected: usize,
    pub filtered_out: usize,
    pub merge: MergeReport,
}

/// Run fetch → process → merge for `day`.
///
/// Failures are logged here and returned; the caller decides whether the
/// day is retried (the scheduler never does).
pub fn ingest_day(
    source: &dyn TransactionSource,
    allowlist: &Allowlist,
    store: &CsvStore,
    day: NaiveDate,
) -> Result<IngestOutcome, IngestError> {
    log::info!("ingesting {day} from {}", source.name());

    let raw = match source.fetch(day) {
        Ok(FetchOutcome::Records(raw)) => raw,
        Ok(FetchOutcome::NoData) => {
            log::info!("no data for {day}");
            return Ok(IngestOutcome::NoData);
        }
        Err(e) => {
            log::error!("fetch for {day} failed: {e}");
            return Err(IngestError::Fetch { day, source: e });
        }
    };

    let processed = projection::process(&raw, allowlist);
    log::info!(
        "{day}: fetched {}, kept {}, filtered out {}, rejected {}",
        raw.len(),
        processed.transactions.len(),
        processed.filtered_out,
        processed.rejected
    );

    let merge = if processed.transactions.is_empty() {
        MergeReport::default()
    } else {
        store.merge(&processed.transactions).map_err(|e| {
            log::error!("saving {day} to {} failed: {e}", store.path().display());
            IngestError::Persist { day, source: e }
        })?
    };

    Ok(IngestOutcome::Ingested(IngestSummary {
        fetched: raw.len(),
        kept: processed.transactions.len(),
        rejected: processed.rejected,
        filtered_out: processed.filtered_out,
        merge,
    }))
}
