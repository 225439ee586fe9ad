//! Data layer: fetching, projection, persistence

pub mod ingest;
pub mod projection;
pub mod provider;
pub mod spending_api;
pub mod store;

pub use ingest::{ingest_day, IngestError, IngestOutcome, IngestSummary};
pub use projection::{process, project, Processed, ProjectionError, DROPPED_COLUMNS};
pub use provider::{FetchError, FetchOutcome, TransactionSource};
pub use spending_api::SpendingApi;
pub use store::{CsvStore, DatasetMeta, MergePolicy, MergeReport, PersistError};
