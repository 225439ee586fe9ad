//! The ingestion job: one locked fetch → filter → merge cycle plus its
//! run-state bookkeeping. Both the scheduler and the one-shot CLI command
//! go through here.

use chrono::NaiveDate;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use spendwatch_core::allowlist::Allowlist;
use spendwatch_core::config::{AppConfig, ConfigError};
use spendwatch_core::data::{ingest_day, CsvStore, IngestError, IngestOutcome, TransactionSource};

use crate::scheduler::{LockError, RunLock, RunState};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("save run state {path}: {source}")]
    State {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub struct IngestionJob {
    source: Box<dyn TransactionSource>,
    allowlist: Allowlist,
    store: CsvStore,
    state_path: PathBuf,
    stale_lock_age: Duration,
}

impl IngestionJob {
    pub fn new(
        source: Box<dyn TransactionSource>,
        allowlist: Allowlist,
        store: CsvStore,
        state_path: impl Into<PathBuf>,
        stale_lock_age: Duration,
    ) -> Self {
        Self {
            source,
            allowlist,
            store,
            state_path: state_path.into(),
            stale_lock_age,
        }
    }

    /// Build from config with the given source (the live API in production).
    pub fn from_config(
        config: &AppConfig,
        source: Box<dyn TransactionSource>,
    ) -> Result<Self, ConfigError> {
        let allowlist = config.load_allowlist()?;
        let store = CsvStore::new(&config.store.dataset_path, config.store.merge_policy);
        Ok(Self::new(
            source,
            allowlist,
            store,
            &config.store.state_path,
            config.schedule.stale_lock_age(),
        ))
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn run_state(&self) -> RunState {
        RunState::load(&self.state_path)
    }

    /// Ingest `day` while holding the dataset lock.
    ///
    /// A no-data day counts as processed. A failed cycle is recorded in the
    /// run state but leaves the processed date alone.
    pub fn run_for(&self, day: NaiveDate) -> Result<IngestOutcome, CycleError> {
        let _lock = RunLock::acquire(RunLock::path_for(self.store.path()), self.stale_lock_age)?;
        let mut state = RunState::load(&self.state_path);
        let now = chrono::Local::now().naive_local();

        match ingest_day(self.source.as_ref(), &self.allowlist, &self.store, day) {
            Ok(outcome) => {
                state.record_success(day, now);
                self.save_state(&state)?;
                Ok(outcome)
            }
            Err(e) => {
                state.record_failure(e.to_string(), now);
                if let Err(save_err) = self.save_state(&state) {
                    log::warn!("{save_err}");
                }
                Err(e.into())
            }
        }
    }

    fn save_state(&self, state: &RunState) -> Result<(), CycleError> {
        state.save(&self.state_path).map_err(|source| CycleError::State {
            path: self.state_path.clone(),
            source,
        })
    }
}
