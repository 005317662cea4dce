use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use hostwatch_core::config::SchedulerConfig;
use tracing::{debug, error, info, warn};

use crate::{
    error::{JobError, Result},
    job::{Job, Work},
    schedule::{next_daily_run, DAILY},
    types::SchedulerStatus,
};

type Registry = Arc<DashMap<String, Arc<Job>>>;

/// In-memory job registry plus a background poller that dispatches due jobs.
///
/// Every method takes `&self`, so one instance can be shared as
/// `Arc<Scheduler>` between the orchestrator and whatever needs to control
/// jobs. Each due job runs on its own short-lived thread; the poller never
/// waits for job execution.
pub struct Scheduler {
    jobs: Registry,
    running: AtomicBool,
    poller: Mutex<Option<Poller>>,
    config: SchedulerConfig,
}

/// Handle to the live poll loop.
struct Poller {
    handle: JoinHandle<()>,
    /// Per-poller flag so a poller detached by a timed-out `stop()` can never
    /// be revived by a later `start()`.
    stop: Arc<AtomicBool>,
    wake_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        debug!(tick_ms = config.tick_ms, "scheduler initialised");
        Self {
            jobs: Arc::new(DashMap::new()),
            running: AtomicBool::new(false),
            poller: Mutex::new(None),
            config,
        }
    }

    // --- registration ------------------------------------------------------

    /// Register a job, replacing (and cancelling) any job with the same name.
    ///
    /// `next_run` is `run_at` when given, otherwise now. Jobs with an
    /// `interval` recur; jobs without one fire once.
    pub fn add_job(
        &self,
        name: impl Into<String>,
        work: impl Work + 'static,
        interval: Option<Duration>,
        run_at: Option<DateTime<Utc>>,
    ) -> Arc<Job> {
        let name = name.into();
        let job = Arc::new(Job::new(name.clone(), work, interval, run_at));

        match self.jobs.entry(name.clone()) {
            Entry::Occupied(mut entry) => {
                warn!(job = %name, "job already registered; replacing it");
                entry.get().cancel();
                entry.insert(Arc::clone(&job));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&job));
            }
        }

        match interval {
            Some(every) => {
                info!(job = %name, interval_ms = every.as_millis() as u64, "job added")
            }
            None => info!(job = %name, next_run = %job.next_run(), "one-shot job added"),
        }
        job
    }

    /// Register a job that fires on the next tick and then every `interval`.
    pub fn add_interval_job(
        &self,
        name: impl Into<String>,
        work: impl Work + 'static,
        interval: Duration,
    ) -> Arc<Job> {
        self.add_job(name, work, Some(interval), None)
    }

    /// Register a job that fires daily at `hour:minute` local time.
    ///
    /// Only the first fire time is anchored to the wall clock. After each run
    /// the next one is completion + 24h, so the job drifts by its own runtime
    /// every day and does not follow DST changes.
    pub fn add_cron_job(
        &self,
        name: impl Into<String>,
        work: impl Work + 'static,
        hour: u32,
        minute: u32,
    ) -> Result<Arc<Job>> {
        let first = next_daily_run(&Local::now(), hour, minute)?;
        let job = self.add_job(name, work, Some(DAILY), Some(first.with_timezone(&Utc)));
        info!(
            job = %job.name(),
            at = %format!("{hour:02}:{minute:02}"),
            next_run = %first,
            "daily job added"
        );
        Ok(job)
    }

    // --- control -----------------------------------------------------------

    /// Cancel and unregister a job. Returns false if no such job exists.
    pub fn remove_job(&self, name: &str) -> bool {
        match self.jobs.remove(name) {
            Some((_, job)) => {
                job.cancel();
                info!(job = %name, "job removed");
                true
            }
            None => {
                warn!(job = %name, "job not found");
                false
            }
        }
    }

    /// Defer a job indefinitely. It stays registered and visible in status.
    pub fn pause_job(&self, name: &str) -> bool {
        let Some(job) = self.get_job(name) else {
            warn!(job = %name, "cannot pause: job not found");
            return false;
        };
        job.pause();
        info!(job = %name, "job paused");
        true
    }

    /// Make a paused recurring job due immediately.
    ///
    /// Returns false for unknown jobs and for one-shot jobs, which have no
    /// schedule to return to.
    pub fn resume_job(&self, name: &str) -> bool {
        let Some(job) = self.get_job(name) else {
            warn!(job = %name, "cannot resume: job not found");
            return false;
        };
        if !job.resume() {
            warn!(job = %name, "cannot resume a one-shot job");
            return false;
        }
        info!(job = %name, "job resumed");
        true
    }

    /// Run a job right away on a new thread, ignoring its schedule.
    ///
    /// This does not consult the job's running state: if the poller
    /// dispatches the same job at the same moment, the callable runs twice
    /// concurrently.
    pub fn run_job_now(&self, name: &str) -> bool {
        let Some(job) = self.get_job(name) else {
            warn!(job = %name, "cannot run: job not found");
            return false;
        };
        info!(job = %name, "running job manually");
        match dispatch(job, Trigger::Manual) {
            Ok(()) => true,
            Err(e) => {
                error!(job = %name, error = %e, "failed to spawn job thread");
                false
            }
        }
    }

    // --- lifecycle ---------------------------------------------------------

    /// Spawn the poll loop. Logs and does nothing if already running.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if self.running.load(Ordering::SeqCst) {
            warn!("scheduler already running");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let jobs = Arc::clone(&self.jobs);
        let config = self.config.clone();
        let loop_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("scheduler-poll".to_string())
            .spawn(move || {
                poll_loop(&jobs, &loop_stop, &wake_rx, &config);
                let _ = done_tx.send(());
            })?;

        *slot = Some(Poller {
            handle,
            stop,
            wake_tx,
            done_rx,
        });
        self.running.store(true, Ordering::SeqCst);
        info!(jobs = self.jobs.len(), "scheduler started");
        Ok(())
    }

    /// Stop the poll loop, waiting at most `stop_timeout` for it to exit.
    ///
    /// Jobs already executing keep running on their own threads; this
    /// returns without waiting for them.
    pub fn stop(&self) {
        let poller = {
            let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.running.swap(false, Ordering::SeqCst) {
                warn!("scheduler not running");
                return;
            }
            slot.take()
        };
        let Some(poller) = poller else {
            return;
        };

        poller.stop.store(true, Ordering::SeqCst);
        let _ = poller.wake_tx.send(());

        let timeout = self.config.stop_timeout();
        match poller.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "poll loop did not exit in time; detaching it"
                );
            }
            // Disconnected means the loop thread died without signalling.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if poller.handle.join().is_err() {
                    error!("scheduler poll loop panicked");
                }
            }
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // --- queries -----------------------------------------------------------

    pub fn get_job(&self, name: &str) -> Option<Arc<Job>> {
        self.jobs.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered job, in no particular order.
    pub fn get_all_jobs(&self) -> Vec<Arc<Job>> {
        snapshot(&self.jobs)
    }

    /// Running flag, job counts and a per-job snapshot sorted by name.
    pub fn get_status(&self) -> SchedulerStatus {
        let mut jobs: Vec<_> = snapshot(&self.jobs).iter().map(|j| j.snapshot()).collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        SchedulerStatus {
            running: self.is_running(),
            total_jobs: jobs.len(),
            active_jobs: jobs
                .iter()
                .filter(|j| j.status != crate::types::JobStatus::Cancelled)
                .count(),
            jobs,
        }
    }

    /// Cancel and unregister every job.
    pub fn clear_all_jobs(&self) {
        let names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.remove_job(&name);
        }
        info!("all jobs cleared");
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

impl std::fmt::Display for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scheduler(running={}, jobs={})",
            self.is_running(),
            self.jobs.len()
        )
    }
}

// --- private helpers -------------------------------------------------------

/// Clone the registry's job handles so a scan never holds a shard lock while
/// callers add or remove jobs.
fn snapshot(jobs: &DashMap<String, Arc<Job>>) -> Vec<Arc<Job>> {
    jobs.iter().map(|entry| Arc::clone(entry.value())).collect()
}

fn poll_loop(
    jobs: &DashMap<String, Arc<Job>>,
    stop: &AtomicBool,
    wake_rx: &mpsc::Receiver<()>,
    config: &SchedulerConfig,
) {
    debug!("scheduler poll loop started");
    loop {
        let mut spawn_failed = false;
        for job in snapshot(jobs) {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if !job.try_claim(Utc::now()) {
                continue;
            }
            if let Err(e) = dispatch(Arc::clone(&job), Trigger::Scheduled) {
                error!(job = %job.name(), error = %e, "failed to spawn job thread");
                job.release_claim();
                spawn_failed = true;
            }
        }

        let wait = if spawn_failed {
            config.tick() + config.error_backoff()
        } else {
            config.tick()
        };
        match wake_rx.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) if !stop.load(Ordering::SeqCst) => {}
            _ => break,
        }
    }
    debug!("scheduler poll loop finished");
}

/// Why a job is being executed.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// Picked by the poll loop; the job was claimed before dispatch.
    Scheduled,
    /// `run_job_now`; bypasses the running guard.
    Manual,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Execute `job` on a dedicated thread. Outcomes are logged here in addition
/// to the failure record `Job::run` keeps for itself.
fn dispatch(job: Arc<Job>, trigger: Trigger) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("job-{}", job.name()))
        .spawn(move || {
            debug!(job = %job.name(), %trigger, "executing job");
            let started = Instant::now();
            let outcome = match trigger {
                Trigger::Scheduled => job.execute_claimed(),
                Trigger::Manual => job.run(),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => info!(
                    job = %job.name(),
                    %trigger,
                    elapsed_ms,
                    run_count = job.run_count(),
                    "job completed"
                ),
                Err(JobError::Cancelled) => {
                    debug!(job = %job.name(), %trigger, "job cancelled before it ran")
                }
                Err(e) => error!(
                    job = %job.name(),
                    %trigger,
                    elapsed_ms,
                    error = %e,
                    "job failed"
                ),
            }
        })?;
    Ok(())
}
