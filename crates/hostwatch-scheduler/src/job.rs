use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    error::JobError,
    schedule::{advance, PAUSED_UNTIL},
    types::{JobSnapshot, JobStatus},
};

/// The unit of work a job executes.
///
/// Implemented for every `Fn() -> anyhow::Result<()>` closure, so callers
/// normally pass a closure that captures whatever arguments it needs.
/// The same callable may run on two threads at once when a manual
/// [`crate::Scheduler::run_job_now`] overlaps an automatic dispatch, so any
/// captured state must be thread-safe.
pub trait Work: Send + Sync {
    fn call(&self) -> anyhow::Result<()>;
}

impl<F> Work for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync,
{
    fn call(&self) -> anyhow::Result<()> {
        self()
    }
}

/// Mutable part of a job. Always read and written as a whole under one lock
/// so status queries never observe a half-applied run.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    next_run: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
    run_count: u64,
    error_count: u64,
    last_error: Option<String>,
    /// Executions currently in flight. Normally 0 or 1; can reach 2 when a
    /// manual run overlaps an automatic one.
    active_runs: u32,
    paused: bool,
    cancelled: bool,
}

/// A named, schedulable unit of work with its run history.
pub struct Job {
    name: String,
    work: Box<dyn Work>,
    interval: Option<Duration>,
    state: Mutex<JobState>,
}

impl Job {
    /// Create a job. `next_run` starts at `run_at`, or now when absent.
    pub fn new(
        name: impl Into<String>,
        work: impl Work + 'static,
        interval: Option<Duration>,
        run_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            work: Box::new(work),
            interval,
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                next_run: run_at.unwrap_or_else(Utc::now),
                last_run: None,
                run_count: 0,
                error_count: 0,
                last_error: None,
                active_runs: 0,
                paused: false,
                cancelled: false,
            }),
        }
    }

    // A panicking callable never holds this lock, but recover anyway rather
    // than wedge the job forever.
    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when the job is eligible for automatic dispatch right now.
    pub fn should_run(&self) -> bool {
        self.is_due(Utc::now())
    }

    /// Eligibility check against an explicit clock reading.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let state = self.state();
        !state.cancelled && state.active_runs == 0 && now >= state.next_run
    }

    /// Execute the work callable and record the outcome.
    ///
    /// Does not consult `should_run`: callers that need the automatic-path
    /// guard check it first. Errors and panics from the callable are recorded
    /// on the job, logged, and returned.
    pub fn run(&self) -> Result<(), JobError> {
        {
            let mut state = self.state();
            if state.cancelled {
                debug!(job = %self.name, "skipping cancelled job");
                return Err(JobError::Cancelled);
            }
            state.active_runs += 1;
            state.status = JobStatus::Running;
        }
        self.execute_claimed()
    }

    /// Atomically check `is_due(now)` and mark the job running.
    ///
    /// Used by the poll loop so the job counts as running from the moment it
    /// is picked, before its execution thread exists. A successful claim must
    /// be followed by exactly one `execute_claimed` or `release_claim`.
    pub(crate) fn try_claim(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state();
        if state.cancelled || state.active_runs > 0 || now < state.next_run {
            return false;
        }
        state.active_runs += 1;
        state.status = JobStatus::Running;
        true
    }

    /// Give back a claim whose execution never started.
    pub(crate) fn release_claim(&self) {
        let mut state = self.state();
        state.active_runs = state.active_runs.saturating_sub(1);
        if state.active_runs == 0 && state.status == JobStatus::Running {
            state.status = JobStatus::Pending;
        }
    }

    /// Run the callable for an execution slot already counted in `active_runs`.
    pub(crate) fn execute_claimed(&self) -> Result<(), JobError> {
        let _running = RunningGuard { job: self };
        if self.state().cancelled {
            debug!(job = %self.name, "job cancelled before execution");
            return Err(JobError::Cancelled);
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.work.call())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(JobError::Failed(format!("{e:#}"))),
            Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
        };

        let now = Utc::now();
        let mut state = self.state();
        match &outcome {
            Ok(()) => {
                state.last_run = Some(now);
                state.run_count += 1;
                if !state.paused {
                    state.next_run = match self.interval {
                        Some(interval) => advance(now, interval),
                        // One-shot: park it so it does not fire again.
                        None => PAUSED_UNTIL,
                    };
                }
                if !state.cancelled {
                    state.status = JobStatus::Completed;
                }
            }
            Err(e) => {
                state.error_count += 1;
                state.last_error = Some(e.to_string());
                if !state.cancelled {
                    state.status = JobStatus::Failed;
                }
                warn!(
                    job = %self.name,
                    error = %e,
                    error_count = state.error_count,
                    "job execution failed"
                );
            }
        }
        outcome
    }

    /// Permanently exclude the job from scheduling. Idempotent.
    ///
    /// An execution already in flight is not interrupted.
    pub fn cancel(&self) {
        let mut state = self.state();
        state.cancelled = true;
        state.status = JobStatus::Cancelled;
    }

    /// Park the job until [`Job::resume`]. Interval and cancellation are untouched.
    pub fn pause(&self) {
        let mut state = self.state();
        state.paused = true;
        state.next_run = PAUSED_UNTIL;
    }

    /// Make a recurring job due immediately. One-shot jobs cannot be resumed.
    pub fn resume(&self) -> bool {
        if self.interval.is_none() {
            return false;
        }
        let mut state = self.state();
        state.paused = false;
        state.next_run = Utc::now();
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        self.state().next_run
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.state().last_run
    }

    pub fn run_count(&self) -> u64 {
        self.state().run_count
    }

    pub fn error_count(&self) -> u64 {
        self.state().error_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state().active_runs > 0
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    /// Consistent copy of every field, taken under a single lock.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state();
        JobSnapshot {
            name: self.name.clone(),
            status: state.status,
            last_run: state.last_run,
            next_run: state.next_run,
            run_count: state.run_count,
            error_count: state.error_count,
            last_error: state.last_error.clone(),
            interval_ms: self.interval.map(|i| i.as_millis() as u64),
            paused: state.paused,
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        write!(
            f,
            "Job({}, status={}, next_run={}, run_count={})",
            self.name,
            state.status,
            state.next_run.to_rfc3339(),
            state.run_count
        )
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

/// Drops the in-flight count on every exit path, panics included.
struct RunningGuard<'a> {
    job: &'a Job,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.job.state();
        state.active_runs = state.active_runs.saturating_sub(1);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
