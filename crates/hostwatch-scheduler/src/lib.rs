//! `hostwatch-scheduler`: in-memory job scheduler driving the agent's
//! recurring work (report cycles, health and update checks, log cleanup).
//!
//! # Overview
//!
//! Jobs live in a concurrent registry owned by a [`Scheduler`]. A single
//! background thread polls the registry once per tick and hands every due
//! job to its own execution thread, then computes the next fire time when
//! the job finishes.
//!
//! # Job kinds
//!
//! | Constructor        | Fires                                                   |
//! |--------------------|---------------------------------------------------------|
//! | `add_interval_job` | On the next tick, then every interval after completion  |
//! | `add_cron_job`     | At HH:MM local time, then every 24h after completion    |
//! | `add_job`          | At `run_at` (or now); recurs only if an interval is set |
//!
//! Nothing is persisted: the registry disappears with the process.

pub mod engine;
pub mod error;
pub mod job;
pub mod schedule;
pub mod types;

pub use engine::Scheduler;
pub use error::{JobError, Result, SchedulerError};
pub use job::{Job, Work};
pub use types::{JobSnapshot, JobStatus, SchedulerStatus};
