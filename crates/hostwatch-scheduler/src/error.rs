use thiserror::Error;

/// Errors returned by the scheduler API itself.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The provided schedule definition is invalid (e.g. hour 25).
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The OS refused to spawn a poller or execution thread.
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Outcome of a single failed job execution.
///
/// Recorded on the job (`last_error`) and handed back to whoever called
/// [`crate::Job::run`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The work callable returned an error.
    #[error("{0}")]
    Failed(String),

    /// The work callable panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The job was cancelled before execution began; work was not invoked.
    #[error("job cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
