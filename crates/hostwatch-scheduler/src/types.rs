use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered, waiting for its next_run time.
    Pending,
    /// Callable is currently executing.
    Running,
    /// Last execution returned normally.
    Completed,
    /// Last execution returned an error or panicked.
    Failed,
    /// Removed or superseded. Terminal.
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of one job, taken under the job's lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub name: String,
    pub status: JobStatus,
    /// Completion time of the most recent successful run.
    pub last_run: Option<DateTime<Utc>>,
    /// Next eligible fire time. Far future while paused.
    pub next_run: DateTime<Utc>,
    pub run_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    /// Recurrence period in milliseconds; `None` for one-shot jobs.
    pub interval_ms: Option<u64>,
    pub paused: bool,
}

/// Aggregate view returned by [`crate::Scheduler::get_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub total_jobs: usize,
    /// Jobs not cancelled. Can differ from `total_jobs` only briefly, while a
    /// replacement or removal is in progress.
    pub active_jobs: usize,
    pub jobs: Vec<JobSnapshot>,
}
