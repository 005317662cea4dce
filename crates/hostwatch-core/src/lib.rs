//! `hostwatch-core`: configuration, shared errors, the stored agent
//! registration and update-check helpers used by the scheduler and the agent
//! binary.

pub mod config;
pub mod error;
pub mod registration;
pub mod update;

pub use config::HostwatchConfig;
pub use error::{HostwatchError, Result};
pub use registration::Registration;
