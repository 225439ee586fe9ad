//! CSV dataset store with atomic publish.
//!
//! Layout: one CSV file at the canonical dataset path plus a
//! `{dataset}.meta.json` sidecar.
//!
//! - Merges never edit the file in place. The merged file is written to
//!   `{dataset}.tmp` in the same directory, synced, then renamed over the
//!   canonical path, so a reader sees either the old or the new dataset.
//! - Existing bytes are carried over verbatim; malformed legacy rows survive a merge.
//! - Loading skips malformed rows (logged) instead of failing the whole read.
//! - One writer is assumed; `RunLock` in the runner serializes ingestion cycles.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{Transaction, TransactionKey, PROJECTED_COLUMNS};

/// What to do with batch rows that are already in the dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Append every row. Re-ingesting a day duplicates its rows.
    #[default]
    Append,
    /// Skip rows whose [`TransactionKey`] is already present.
    SkipDuplicates,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset header {found:?} does not match the projected columns")]
    HeaderMismatch { found: Vec<String> },

    #[error("metadata error: {0}")]
    Meta(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Metadata sidecar describing the last published dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub row_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub data_hash: String,
    pub published_at: chrono::NaiveDateTime,
}

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Whether a new dataset version was published.
    pub written: bool,
    /// Whether this merge created the dataset.
    pub created: bool,
    pub appended: usize,
    pub skipped_duplicates: usize,
    /// Rows in the published dataset, `None` when nothing was written.
    pub total_rows: Option<usize>,
}

/// Rows read from a dataset file.
#[derive(Debug, Clone, Default)]
pub struct LoadedRows {
    pub transactions: Vec<Transaction>,
    pub malformed: usize,
}

/// The accumulating transaction dataset.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    policy: MergePolicy,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, policy: MergePolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    /// Canonical dataset path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("dataset.csv"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.sibling(".meta.json")
    }

    /// Append `batch` to the dataset and publish the result atomically.
    ///
    /// An empty batch is a no-op: no file is created and an existing one is
    /// not rewritten.
    pub fn merge(&self, batch: &[Transaction]) -> Result<MergeReport, PersistError> {
        if batch.is_empty() {
            return Ok(MergeReport::default());
        }

        // A zero-byte or blank file holds no header; start it over.
        let existing = if self.exists() {
            let bytes = fs::read(&self.path).map_err(io_err(&self.path))?;
            (!is_blank(&bytes)).then_some(bytes)
        } else {
            None
        };

        let previous = match &existing {
            Some(bytes) => {
                check_header_exact(bytes)?;
                read_rows(&bytes[..])?
            }
            None => LoadedRows::default(),
        };

        let (to_append, skipped_duplicates) = match self.policy {
            MergePolicy::Append => (batch.iter().collect::<Vec<_>>(), 0),
            MergePolicy::SkipDuplicates => {
                let mut seen: HashSet<TransactionKey> =
                    previous.transactions.iter().map(Transaction::key).collect();
                let fresh: Vec<&Transaction> =
                    batch.iter().filter(|t| seen.insert(t.key())).collect();
                let skipped = batch.len() - fresh.len();
                (fresh, skipped)
            }
        };

        if to_append.is_empty() {
            log::info!(
                "all {skipped_duplicates} rows already in {}, dataset unchanged",
                self.path.display()
            );
            return Ok(MergeReport {
                skipped_duplicates,
                ..MergeReport::default()
            });
        }

        let new_rows = encode_rows(&to_append, existing.is_none())?;

        let mut hasher = blake3::Hasher::new();
        let tmp = self.tmp_path();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let mut write_tmp = || -> Result<(), PersistError> {
            let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
            if let Some(bytes) = &existing {
                file.write_all(bytes).map_err(io_err(&tmp))?;
                hasher.update(bytes);
                if !bytes.is_empty() && !bytes.ends_with(b"\n") {
                    file.write_all(b"\n").map_err(io_err(&tmp))?;
                    hasher.update(b"\n");
                }
            }
            file.write_all(&new_rows).map_err(io_err(&tmp))?;
            hasher.update(&new_rows);
            file.sync_all().map_err(io_err(&tmp))?;
            Ok(())
        };

        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            PersistError::Io {
                path: self.path.clone(),
                source,
            }
        })?;

        let total_rows = previous.transactions.len() + previous.malformed + to_append.len();
        let (first_date, last_date) = date_span(
            previous
                .transactions
                .iter()
                .chain(to_append.iter().copied()),
        );
        let meta = DatasetMeta {
            row_count: total_rows,
            first_date,
            last_date,
            data_hash: hasher.finalize().to_hex().to_string(),
            published_at: chrono::Local::now().naive_local(),
        };
        // The dataset is already live; the sidecar is informational.
        if let Err(e) = self.write_meta(&meta) {
            log::warn!("dataset published but metadata not updated: {e}");
        }

        log::info!(
            "published {} ({} rows, +{})",
            self.path.display(),
            total_rows,
            to_append.len()
        );

        Ok(MergeReport {
            written: true,
            created: existing.is_none(),
            appended: to_append.len(),
            skipped_duplicates,
            total_rows: Some(total_rows),
        })
    }

    /// Read the whole dataset. `Ok(None)` when no dataset has been published yet.
    pub fn load_all(&self) -> Result<Option<Vec<Transaction>>, PersistError> {
        if !self.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path).map_err(io_err(&self.path))?;
        if is_blank(&bytes) {
            return Ok(Some(Vec::new()));
        }
        let rows = read_rows(&bytes[..])?;
        if rows.malformed > 0 {
            log::warn!(
                "skipped {} malformed rows in {}",
                rows.malformed,
                self.path.display()
            );
        }
        Ok(Some(rows.transactions))
    }

    /// Metadata of the last publish, if the sidecar exists and parses.
    pub fn meta(&self) -> Option<DatasetMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_meta(&self, meta: &DatasetMeta) -> Result<(), PersistError> {
        let json =
            serde_json::to_string_pretty(meta).map_err(|e| PersistError::Meta(e.to_string()))?;
        let path = self.meta_path();
        let tmp = self.sibling(".meta.json.tmp");
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            PersistError::Io { path, source }
        })
    }
}

/// Parse CSV rows, counting rows that fail to deserialize instead of aborting.
pub fn read_rows<R: std::io::Read>(reader: R) -> Result<LoadedRows, PersistError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = rdr.headers()?.clone();
    let missing: Vec<&str> = ["trans_date", "payer_edrpou", "recipt_edrpou", "amount"]
        .into_iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(PersistError::HeaderMismatch {
            found: headers.iter().map(String::from).collect(),
        });
    }

    let mut rows = LoadedRows::default();
    for (i, result) in rdr.deserialize::<Transaction>().enumerate() {
        match result {
            Ok(t) => rows.transactions.push(t),
            Err(e) => {
                rows.malformed += 1;
                log::debug!("malformed dataset row {}: {e}", i + 2);
            }
        }
    }
    Ok(rows)
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Appending requires the existing header to be exactly the projected columns.
fn check_header_exact(bytes: &[u8]) -> Result<(), PersistError> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let headers = rdr.headers()?;
    if headers.iter().ne(PROJECTED_COLUMNS.iter().copied()) {
        return Err(PersistError::HeaderMismatch {
            found: headers.iter().map(String::from).collect(),
        });
    }
    Ok(())
}

fn encode_rows(rows: &[&Transaction], with_header: bool) -> Result<Vec<u8>, PersistError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.into_inner()
        .map_err(|e| PersistError::Meta(format!("flush CSV buffer: {e}")))
}

fn date_span<'a>(
    rows: impl Iterator<Item = &'a Transaction>,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    rows.filter_map(|t| t.trans_date.day())
        .fold((None, None), |(lo, hi), d| {
            (
                Some(lo.map_or(d, |lo: NaiveDate| lo.min(d))),
                Some(hi.map_or(d, |hi: NaiveDate| hi.max(d))),
            )
        })
}
