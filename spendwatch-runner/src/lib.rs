//! SpendWatch Runner — scheduling, the ingestion job, and aggregate reports.
//!
//! This crate builds on `spendwatch-core` to provide:
//! - A daily scheduler with catch-up of a missed firing
//! - The locked ingestion job that records the last processed day
//! - Read-only aggregate queries over the dataset

pub mod aggregator;
pub mod cycle;
pub mod scheduler;

pub use aggregator::{weekday_name, Aggregator, NamedTotal};
pub use cycle::{CycleError, IngestionJob};
pub use scheduler::{
    target_day, Clock, DailyTrigger, FireReport, LockError, RunLock, RunState, Scheduler,
    SchedulerState, SystemClock, Trigger,
};
