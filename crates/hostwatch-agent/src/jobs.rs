//! The agent's standard recurring jobs and the callables behind them.
//!
//! Job callables run on scheduler threads, outside the Tokio runtime, so
//! HTTP calls are driven with `Handle::block_on`.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hostwatch_core::{
    update::{UpdateCheckState, UpdateVerdict},
    HostwatchConfig,
};
use hostwatch_scheduler::Scheduler;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{api::ApiClient, inventory};

pub const REPORT_JOB: &str = "report";
pub const HEARTBEAT_JOB: &str = "heartbeat";
pub const UPDATE_CHECK_JOB: &str = "update-check";
pub const LOG_CLEANUP_JOB: &str = "log-cleanup";

/// Everything the standard jobs capture. `api` must carry the agent id.
#[derive(Clone)]
pub struct JobContext {
    pub api: ApiClient,
    pub runtime: Handle,
    pub config: HostwatchConfig,
}

/// Register report, heartbeat, update-check and log-cleanup jobs.
pub fn register_standard_jobs(
    scheduler: &Scheduler,
    ctx: &JobContext,
) -> hostwatch_scheduler::Result<()> {
    let agent = &ctx.config.agent;
    let logging = &ctx.config.logging;

    scheduler.add_interval_job(
        REPORT_JOB,
        report_cycle(ctx.api.clone(), ctx.runtime.clone()),
        Duration::from_secs(agent.report_interval_secs),
    );
    scheduler.add_interval_job(
        HEARTBEAT_JOB,
        heartbeat(ctx.api.clone(), ctx.runtime.clone()),
        Duration::from_secs(agent.heartbeat_interval_secs),
    );
    scheduler.add_interval_job(
        UPDATE_CHECK_JOB,
        update_check(
            ctx.api.clone(),
            ctx.runtime.clone(),
            PathBuf::from(&agent.data_dir),
        ),
        Duration::from_secs(agent.update_check_interval_secs),
    );
    scheduler.add_cron_job(
        LOG_CLEANUP_JOB,
        log_cleanup(
            PathBuf::from(&logging.dir),
            // an unrepresentable retention keeps every file
            logging.retention().unwrap_or(Duration::MAX),
        ),
        logging.cleanup_hour,
        logging.cleanup_minute,
    )?;
    Ok(())
}

/// Collect an inventory snapshot and push it to the server.
pub fn report_cycle(
    api: ApiClient,
    runtime: Handle,
) -> impl Fn() -> anyhow::Result<()> + Send + Sync {
    move || {
        let snapshot = inventory::collect();
        runtime.block_on(api.send_report(&snapshot))?;
        info!(hostname = %snapshot.hostname, "inventory report sent");
        Ok(())
    }
}

pub fn heartbeat(
    api: ApiClient,
    runtime: Handle,
) -> impl Fn() -> anyhow::Result<()> + Send + Sync {
    move || {
        runtime.block_on(api.heartbeat())?;
        debug!("heartbeat sent");
        Ok(())
    }
}

/// Ask the server for the latest agent release and log each new one once.
pub fn update_check(
    api: ApiClient,
    runtime: Handle,
    data_dir: PathBuf,
) -> impl Fn() -> anyhow::Result<()> + Send + Sync {
    move || {
        let release = runtime.block_on(api.latest_release())?;
        let verdict = release.verdict(env!("CARGO_PKG_VERSION"));
        let mut state = UpdateCheckState::load(&data_dir);
        let announce = state.record(
            &release.version,
            matches!(verdict, UpdateVerdict::Available { .. }),
        );
        state.save(&data_dir)?;

        match verdict {
            UpdateVerdict::Available { current, latest } if announce => warn!(
                %current,
                %latest,
                download_url = ?release.download_url,
                "agent update available"
            ),
            UpdateVerdict::Available { latest, .. } => {
                debug!(%latest, "update already announced")
            }
            UpdateVerdict::UpToDate => debug!(latest = %release.version, "agent is up to date"),
        }
        Ok(())
    }
}

pub fn log_cleanup(dir: PathBuf, max_age: Duration) -> impl Fn() -> anyhow::Result<()> + Send + Sync {
    move || {
        let removed = cleanup_logs(&dir, max_age)?;
        info!(dir = %dir.display(), removed, "log cleanup finished");
        Ok(())
    }
}

/// True for `agent.log` and rotated names such as `agent.log.1` or
/// `agent.log.2024-01-01`.
fn is_log_file(name: &str) -> bool {
    name.ends_with(".log") || name.contains(".log.")
}

/// Delete log files in `dir` last modified more than `max_age` ago.
///
/// A missing directory counts as nothing to clean. Returns the number of
/// files removed.
pub fn cleanup_logs(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() || !is_log_file(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if meta.modified()? < cutoff {
            std::fs::remove_file(entry.path())?;
            debug!(file = %entry.path().display(), "removed old log file");
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use hostwatch_core::config::ApiConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::LATEST_VERSION_PATH;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn touch(dir: &Path, name: &str, age: Duration) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    fn api_for(server: &MockServer) -> ApiClient {
        ApiClient::new(&ApiConfig {
            url: server.uri(),
            token: "t".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
        .with_agent_id("42")
    }

    #[test]
    fn cleanup_removes_only_old_log_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "agent.log", Duration::ZERO);
        touch(dir.path(), "agent.log.1", 40 * DAY);
        touch(dir.path(), "agent.log.2", 31 * DAY);
        touch(dir.path(), "inventory.json", 90 * DAY);

        let removed = cleanup_logs(dir.path(), 30 * DAY).unwrap();

        assert_eq!(removed, 2);
        assert!(dir.path().join("agent.log").exists());
        assert!(dir.path().join("inventory.json").exists());
        assert!(!dir.path().join("agent.log.1").exists());
    }

    #[test]
    fn cleanup_ignores_names_that_only_contain_log() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x.logo.png", 90 * DAY);
        touch(dir.path(), "catalog.json", 90 * DAY);
        touch(dir.path(), "service.log.2024-01-01", 90 * DAY);

        let removed = cleanup_logs(dir.path(), 30 * DAY).unwrap();

        assert_eq!(removed, 1);
        assert!(dir.path().join("x.logo.png").exists());
        assert!(dir.path().join("catalog.json").exists());
    }

    #[test]
    fn maximal_retention_keeps_every_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "agent.log.9", 365 * DAY);
        assert_eq!(cleanup_logs(dir.path(), Duration::MAX).unwrap(), 0);
        assert!(dir.path().join("agent.log.9").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn huge_retention_days_registers_without_overflow() {
        let server = MockServer::start().await;
        let mut config = HostwatchConfig::default();
        config.logging.retention_days = u64::MAX;
        let ctx = JobContext {
            api: api_for(&server),
            runtime: Handle::current(),
            config,
        };
        let scheduler = Scheduler::new();

        register_standard_jobs(&scheduler, &ctx).unwrap();
        assert!(scheduler.get_job(LOG_CLEANUP_JOB).is_some());
    }

    #[test]
    fn log_name_matching() {
        assert!(is_log_file("agent.log"));
        assert!(is_log_file("agent.log.3"));
        assert!(!is_log_file("x.logo.png"));
        assert!(!is_log_file("changelog"));
        assert!(!is_log_file("agent.log-old"));
    }

    #[test]
    fn cleanup_of_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(cleanup_logs(&missing, DAY).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn report_cycle_sends_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/42/inventory"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let job = report_cycle(api_for(&server), Handle::current());
        tokio::task::spawn_blocking(move || job())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_fails_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/42/heartbeat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let job = heartbeat(api_for(&server), Handle::current());
        let outcome = tokio::task::spawn_blocking(move || job()).await.unwrap();
        assert!(outcome.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_check_records_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LATEST_VERSION_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "999.0.0"})),
            )
            .mount(&server)
            .await;
        let data_dir = tempfile::tempdir().unwrap();

        let job = update_check(api_for(&server), Handle::current(), data_dir.path().to_path_buf());
        tokio::task::spawn_blocking(move || job())
            .await
            .unwrap()
            .unwrap();

        let state = UpdateCheckState::load(data_dir.path());
        assert_eq!(state.latest_version.as_deref(), Some("999.0.0"));
        assert!(state.notified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn standard_jobs_are_registered() {
        let server = MockServer::start().await;
        let ctx = JobContext {
            api: api_for(&server),
            runtime: Handle::current(),
            config: HostwatchConfig::default(),
        };
        let scheduler = Scheduler::new();

        register_standard_jobs(&scheduler, &ctx).unwrap();

        let status = scheduler.get_status();
        let names: Vec<_> = status.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(
            names,
            [HEARTBEAT_JOB, LOG_CLEANUP_JOB, REPORT_JOB, UPDATE_CHECK_JOB]
        );
        let cleanup = scheduler.get_job(LOG_CLEANUP_JOB).unwrap();
        assert_eq!(cleanup.interval(), Some(DAY));
        assert!(!scheduler.is_running());
    }
}
