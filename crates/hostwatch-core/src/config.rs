use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_UPDATE_CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_TICK_MS: u64 = 1_000; // poll cadence
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 5;
pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 30;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Top-level config (hostwatch.toml + HOSTWATCH_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostwatchConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Inventory server the agent reports to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL without trailing slash, e.g. "https://inventory.example.com".
    #[serde(default)]
    pub url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_update_check_interval")]
    pub update_check_interval_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            update_check_interval_secs: DEFAULT_UPDATE_CHECK_INTERVAL_SECS,
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset (e.g. "info", "debug").
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory swept by the daily log-cleanup job.
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
    #[serde(default)]
    pub cleanup_minute: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
            cleanup_hour: default_cleanup_hour(),
            cleanup_minute: 0,
        }
    }
}

/// Poller tuning for the job scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between registry scans.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Upper bound on how long `stop()` waits for the poller thread.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// Extra sleep after a tick in which a dispatch could not be spawned.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
        }
    }
}

impl LoggingConfig {
    /// Age after which log files are deleted. `None` when `retention_days`
    /// does not fit in a `Duration` of seconds.
    pub fn retention(&self) -> Option<Duration> {
        self.retention_days
            .checked_mul(SECS_PER_DAY)
            .map(Duration::from_secs)
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

fn default_api_timeout() -> u64 {
    30
}
fn default_report_interval() -> u64 {
    DEFAULT_REPORT_INTERVAL_SECS
}
fn default_heartbeat_interval() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}
fn default_update_check_interval() -> u64 {
    DEFAULT_UPDATE_CHECK_INTERVAL_SECS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_retention_days() -> u64 {
    DEFAULT_LOG_RETENTION_DAYS
}
fn default_cleanup_hour() -> u32 {
    3
}
fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}
fn default_stop_timeout() -> u64 {
    DEFAULT_STOP_TIMEOUT_SECS
}
fn default_error_backoff() -> u64 {
    DEFAULT_ERROR_BACKOFF_SECS
}
fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
fn default_data_dir() -> String {
    format!("{}/.hostwatch", home_dir())
}
fn default_log_dir() -> String {
    format!("{}/.hostwatch/logs", home_dir())
}

impl HostwatchConfig {
    /// Load config from a TOML file with HOSTWATCH_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. HOSTWATCH_CONFIG env var
    ///   3. ~/.hostwatch/hostwatch.toml
    ///
    /// Nested env keys use a double underscore, e.g.
    /// `HOSTWATCH_AGENT__REPORT_INTERVAL_SECS=60`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("HOSTWATCH_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::HostwatchError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(HostwatchConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HOSTWATCH_").split("__"))
    }

    /// Check the values the agent cannot run without.
    ///
    /// Returns one human-readable line per problem; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.api.url.trim().is_empty() {
            problems.push("missing [api] url".to_string());
        } else if !self.api.url.starts_with("http://") && !self.api.url.starts_with("https://") {
            problems.push(format!("[api] url must be http(s): {}", self.api.url));
        }
        if self.api.token.trim().is_empty() {
            problems.push("missing [api] token".to_string());
        }
        for (key, secs) in [
            ("report_interval_secs", self.agent.report_interval_secs),
            ("heartbeat_interval_secs", self.agent.heartbeat_interval_secs),
            ("update_check_interval_secs", self.agent.update_check_interval_secs),
        ] {
            if secs == 0 {
                problems.push(format!("[agent] {key} must be greater than 0"));
            }
        }
        if self.logging.retention().is_none() {
            problems.push(format!(
                "[logging] retention_days {} is too large",
                self.logging.retention_days
            ));
        }
        if self.logging.cleanup_hour > 23 || self.logging.cleanup_minute > 59 {
            problems.push(format!(
                "[logging] cleanup time {:02}:{:02} is not a valid time of day",
                self.logging.cleanup_hour, self.logging.cleanup_minute
            ));
        }
        problems
    }
}

fn default_config_path() -> String {
    format!("{}/hostwatch.toml", default_data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_when_file_missing() {
        Jail::expect_with(|_jail| {
            let config = HostwatchConfig::load(Some("does-not-exist.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.agent.report_interval_secs, DEFAULT_REPORT_INTERVAL_SECS);
            assert_eq!(config.scheduler.tick(), Duration::from_secs(1));
            assert_eq!(config.scheduler.stop_timeout(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn file_and_env_are_merged() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hostwatch.toml",
                r#"
                [api]
                url = "https://inventory.example.com"
                token = "secret"

                [agent]
                report_interval_secs = 120
                "#,
            )?;
            jail.set_env("HOSTWATCH_LOGGING__CLEANUP_HOUR", "4");

            let config = HostwatchConfig::load(Some("hostwatch.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.api.url, "https://inventory.example.com");
            assert_eq!(config.agent.report_interval_secs, 120);
            assert_eq!(config.logging.cleanup_hour, 4);
            assert!(config.validate().is_empty());
            Ok(())
        });
    }

    #[test]
    fn validate_reports_missing_values() {
        let mut config = HostwatchConfig::default();
        config.agent.report_interval_secs = 0;
        config.logging.cleanup_hour = 25;

        let problems = config.validate();
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("[api] url")));
        assert!(problems.iter().any(|p| p.contains("token")));
    }

    #[test]
    fn validate_rejects_zero_job_intervals() {
        let mut config = HostwatchConfig::default();
        config.api.url = "https://inventory".to_string();
        config.api.token = "t".to_string();
        config.agent.heartbeat_interval_secs = 0;
        config.agent.update_check_interval_secs = 0;

        let problems = config.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("heartbeat_interval_secs")));
        assert!(problems.iter().any(|p| p.contains("update_check_interval_secs")));
    }

    #[test]
    fn oversized_retention_is_rejected_without_overflow() {
        let mut config = HostwatchConfig::default();
        config.api.url = "https://inventory".to_string();
        config.api.token = "t".to_string();
        config.logging.retention_days = u64::MAX;

        assert!(config.logging.retention().is_none());
        let problems = config.validate();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("retention_days"));

        config.logging.retention_days = 30;
        assert_eq!(
            config.logging.retention(),
            Some(Duration::from_secs(30 * SECS_PER_DAY))
        );
    }

    #[test]
    fn validate_rejects_non_http_url() {
        let mut config = HostwatchConfig::default();
        config.api.url = "ftp://inventory".to_string();
        config.api.token = "t".to_string();
        assert_eq!(config.validate().len(), 1);
    }
}
