//! Daily scheduler — fires a job once per day for the previous calendar day.
//!
//! The loop polls a [`Clock`] every `poll_interval` and asks the [`Trigger`]
//! whether a fire instant was crossed since the last check. A firing hands
//! the job the day before the fire instant. Failures are logged and the day
//! is not retried; the next firing is the next scheduled instant.
//!
//! State machine: `Idle → Due → Running → Idle`, and `Stopped` once the stop
//! handle is raised or the firing budget is spent.

pub mod lock;
pub mod state;
pub mod trigger;

pub use lock::{LockError, RunLock};
pub use state::RunState;
pub use trigger::{Clock, DailyTrigger, SystemClock, Trigger};

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Due,
    Running,
    Stopped,
}

/// Work run on each firing, given the day to process.
pub type Job = Box<dyn FnMut(NaiveDate) -> anyhow::Result<()> + Send>;

/// Record of one firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireReport {
    /// The scheduled instant this firing stands for.
    pub fire_time: NaiveDateTime,
    pub target: NaiveDate,
    pub error: Option<String>,
}

impl FireReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Day processed by a firing at `fire_time`: the previous calendar day.
pub fn target_day(fire_time: NaiveDateTime) -> NaiveDate {
    fire_time.date() - ChronoDuration::days(1)
}

pub struct Scheduler<T: Trigger, C: Clock> {
    trigger: T,
    clock: C,
    poll_interval: Duration,
    job: Option<Job>,
    state: SchedulerState,
    last_check: NaiveDateTime,
    stop: Arc<AtomicBool>,
    firings: usize,
}

impl<T: Trigger, C: Clock> Scheduler<T, C> {
    /// Build an idle scheduler. Fire instants at or before the clock's current
    /// time are not due; use [`Scheduler::catch_up`] for those.
    pub fn new(trigger: T, clock: C, poll_interval: Duration) -> Self {
        let last_check = clock.now();
        Self {
            trigger,
            clock,
            poll_interval,
            job: None,
            state: SchedulerState::Idle,
            last_check,
            stop: Arc::new(AtomicBool::new(false)),
            firings: 0,
        }
    }

    /// Register the job run on each firing, replacing any previous one.
    pub fn on_fire<F>(&mut self, job: F)
    where
        F: FnMut(NaiveDate) -> anyhow::Result<()> + Send + 'static,
    {
        self.job = Some(Box::new(job));
    }

    /// Flag that ends [`Scheduler::run`] at the next poll.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn firings(&self) -> usize {
        self.firings
    }

    pub fn next_fire_time(&self) -> NaiveDateTime {
        self.trigger.next_fire_time(self.last_check)
    }

    /// Check the clock once and fire if a fire instant was crossed.
    ///
    /// When several instants were crossed (the host slept through days), only
    /// the latest one fires.
    pub fn tick(&mut self) -> Option<FireReport> {
        if self.state == SchedulerState::Stopped {
            return None;
        }
        let now = self.clock.now();
        log::debug!("poll at {now}");
        let due = if self.trigger.is_due(self.last_check, now) {
            self.latest_fire_in(self.last_check, now)
        } else {
            None
        };
        // Wall clock can step backwards (DST); never re-open a checked window
        self.last_check = self.last_check.max(now);
        let fire_time = due?;
        self.state = SchedulerState::Due;
        Some(self.fire(fire_time))
    }

    /// Run the most recent missed firing, if `state` has not processed its day
    /// yet. Meant to be called once on startup.
    pub fn catch_up(&mut self, state: &RunState) -> Option<FireReport> {
        if self.state == SchedulerState::Stopped {
            return None;
        }
        let now = self.clock.now();
        let fire_time = self.latest_fire_in(now - ChronoDuration::days(1), now)?;
        let target = target_day(fire_time);
        if !state.needs(target) {
            return None;
        }
        log::warn!("catching up missed firing of {fire_time} for {target}");
        self.last_check = self.last_check.max(now);
        self.state = SchedulerState::Due;
        Some(self.fire(fire_time))
    }

    /// Poll until stopped or until `max_firings` firings have happened.
    /// Returns the total number of firings.
    pub fn run(&mut self, max_firings: Option<usize>) -> usize {
        log::info!("scheduler running; next firing at {}", self.next_fire_time());
        loop {
            if self.should_stop(max_firings) {
                break;
            }
            if let Some(report) = self.tick() {
                log::info!(
                    "fired for {} ({}); next firing at {}",
                    report.target,
                    if report.succeeded() { "ok" } else { "failed" },
                    self.next_fire_time()
                );
                if self.should_stop(max_firings) {
                    break;
                }
            }
            self.clock.sleep(self.poll_interval);
        }
        self.state = SchedulerState::Stopped;
        log::info!("scheduler stopped after {} firing(s)", self.firings);
        self.firings
    }

    fn should_stop(&self, max_firings: Option<usize>) -> bool {
        self.stop.load(Ordering::SeqCst) || max_firings.is_some_and(|max| self.firings >= max)
    }

    fn latest_fire_in(&self, after: NaiveDateTime, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut fire_time = self.trigger.next_fire_time(after);
        if fire_time > now {
            return None;
        }
        loop {
            let next = self.trigger.next_fire_time(fire_time);
            if next > now {
                return Some(fire_time);
            }
            fire_time = next;
        }
    }

    fn fire(&mut self, fire_time: NaiveDateTime) -> FireReport {
        let target = target_day(fire_time);
        self.state = SchedulerState::Running;
        self.firings += 1;

        let error = match self.job.as_mut() {
            Some(job) => match job(target) {
                Ok(()) => None,
                Err(e) => {
                    log::error!("job for {target} failed: {e:#}");
                    Some(format!("{e:#}"))
                }
            },
            None => {
                log::warn!("firing for {target} with no job registered");
                None
            }
        };

        self.state = SchedulerState::Idle;
        FireReport {
            fire_time,
            target,
            error,
        }
    }
}
