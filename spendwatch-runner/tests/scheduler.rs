//! Scheduler + ingestion job, end to end against a scripted source and a
//! manual clock.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spendwatch_core::allowlist::Allowlist;
use spendwatch_core::data::{
    CsvStore, FetchError, FetchOutcome, IngestError, IngestOutcome, MergePolicy, TransactionSource,
};
use spendwatch_core::domain::RawTransaction;
use spendwatch_runner::{
    Clock, CycleError, DailyTrigger, IngestionJob, LockError, RunLock, RunState, Scheduler,
};

const HOUR: Duration = Duration::from_secs(3600);

#[derive(Default, Clone)]
struct ScriptedSource {
    responses: Arc<Mutex<HashMap<NaiveDate, Result<FetchOutcome, FetchError>>>>,
    calls: Arc<Mutex<Vec<NaiveDate>>>,
}

impl ScriptedSource {
    fn respond(&self, day: NaiveDate, response: Result<FetchOutcome, FetchError>) {
        self.responses.lock().unwrap().insert(day, response);
    }

    fn calls(&self) -> Vec<NaiveDate> {
        self.calls.lock().unwrap().clone()
    }
}

impl TransactionSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn fetch(&self, day: NaiveDate) -> Result<FetchOutcome, FetchError> {
        self.calls.lock().unwrap().push(day);
        self.responses
            .lock()
            .unwrap()
            .remove(&day)
            .unwrap_or(Ok(FetchOutcome::NoData))
    }
}

struct ManualClock {
    now: Cell<NaiveDateTime>,
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now
            .set(self.now.get() + ChronoDuration::from_std(duration).unwrap());
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn record(day: NaiveDate, payer: &str, amount: &str) -> RawTransaction {
    match json!({
        "trans_date": day.format("%Y-%m-%dT00:00:00").to_string(),
        "payer_edrpou": payer,
        "payer_name": "Payer",
        "recipt_edrpou": "99999999",
        "recipt_name": "Recipient",
        "amount": amount,
        "payment_details": "details",
        "payer_account": "UA00",
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn job(dir: &std::path::Path, source: &ScriptedSource) -> IngestionJob {
    IngestionJob::new(
        Box::new(source.clone()),
        Allowlist::from_codes(["04358000"]).unwrap(),
        CsvStore::new(dir.join("transactiondata_full.csv"), MergePolicy::Append),
        dir.join("run_state.json"),
        HOUR,
    )
}

#[test]
fn successful_cycle_records_processed_day() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    source.respond(
        d(4),
        Ok(FetchOutcome::Records(vec![record(d(4), "04358000", "12.50")])),
    );
    let job = job(dir.path(), &source);

    let outcome = job.run_for(d(4)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Ingested(ref s) if s.kept == 1));

    let state = RunState::load(job.state_path());
    assert_eq!(state.last_processed_date, Some(d(4)));
    assert_eq!(state.last_error, None);
    // Lock is released once the cycle ends
    assert!(!RunLock::path_for(job.store().path()).exists());
}

#[test]
fn no_data_day_counts_as_processed() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let job = job(dir.path(), &source);

    assert_eq!(job.run_for(d(4)).unwrap(), IngestOutcome::NoData);
    assert_eq!(job.run_state().last_processed_date, Some(d(4)));
    assert!(!job.store().exists());
}

#[test]
fn failed_cycle_keeps_previous_processed_day() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let job = job(dir.path(), &source);
    job.run_for(d(3)).unwrap();

    source.respond(d(4), Err(FetchError::Timeout { secs: 60 }));
    let err = job.run_for(d(4)).unwrap_err();
    assert!(matches!(err, CycleError::Ingest(IngestError::Fetch { .. })));

    let state = job.run_state();
    assert_eq!(state.last_processed_date, Some(d(3)));
    assert!(state.last_error.unwrap().contains("timed out"));
}

#[test]
fn held_lock_refuses_cycle_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let job = job(dir.path(), &source);

    let _other = RunLock::acquire(RunLock::path_for(job.store().path()), HOUR).unwrap();
    let err = job.run_for(d(4)).unwrap_err();

    assert!(matches!(err, CycleError::Lock(LockError::Held { .. })));
    assert!(source.calls().is_empty());
    assert_eq!(job.run_state(), RunState::default());
}

#[test]
fn scheduler_drives_daily_cycles_and_skips_failed_day() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    source.respond(
        d(10),
        Ok(FetchOutcome::Records(vec![record(d(10), "04358000", "1")])),
    );
    source.respond(d(11), Err(FetchError::HttpStatus { status: 502 }));
    source.respond(
        d(12),
        Ok(FetchOutcome::Records(vec![
            record(d(12), "04358000", "2"),
            record(d(12), "12345678", "3"),
        ])),
    );
    let job = job(dir.path(), &source);
    let store_path = job.store().path().to_path_buf();
    let state_path = job.state_path().to_path_buf();

    let start = d(11).and_hms_opt(6, 0, 0).unwrap();
    let mut scheduler = Scheduler::new(
        DailyTrigger::new(NaiveTime::from_hms_opt(20, 0, 0).unwrap()),
        ManualClock {
            now: Cell::new(start),
        },
        Duration::from_secs(300),
    );
    scheduler.on_fire(move |day| {
        job.run_for(day)?;
        Ok(())
    });

    assert_eq!(scheduler.run(Some(3)), 3);
    assert_eq!(source.calls(), vec![d(10), d(11), d(12)]);

    let store = CsvStore::new(&store_path, MergePolicy::Append);
    let rows = store.load_all().unwrap().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(RunState::load(&state_path).last_processed_date, Some(d(12)));
}

#[test]
fn startup_catch_up_uses_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource::default();
    let job = job(dir.path(), &source);

    let mut stale = RunState::default();
    stale.record_success(d(7), d(8).and_hms_opt(20, 0, 0).unwrap());
    stale.save(job.state_path()).unwrap();
    let state = job.run_state();

    // Restarted at 21:00 on the 10th: the 20:00 firing for the 9th was missed
    let mut scheduler = Scheduler::new(
        DailyTrigger::new(NaiveTime::from_hms_opt(20, 0, 0).unwrap()),
        ManualClock {
            now: Cell::new(d(10).and_hms_opt(21, 0, 0).unwrap()),
        },
        Duration::from_secs(60),
    );
    scheduler.on_fire(move |day| {
        job.run_for(day)?;
        Ok(())
    });

    let report = scheduler.catch_up(&state).unwrap();
    assert_eq!(report.target, d(9));
    assert!(report.succeeded());
    assert_eq!(source.calls(), vec![d(9)]);
}
