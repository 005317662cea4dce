//! Agent run modes.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use hostwatch_core::{HostwatchConfig, Registration};
use hostwatch_scheduler::Scheduler;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use crate::{
    api::{ApiClient, RegistrationRequest},
    inventory,
    jobs::{self, JobContext},
};

fn ensure_valid(config: &HostwatchConfig) -> anyhow::Result<()> {
    let problems = config.validate();
    for problem in &problems {
        error!(%problem, "invalid configuration");
    }
    if !problems.is_empty() {
        bail!("configuration has {} problem(s)", problems.len());
    }
    Ok(())
}

/// API client addressed to the stored agent id.
fn registered_client(config: &HostwatchConfig) -> anyhow::Result<ApiClient> {
    let Some(registration) = Registration::load(Path::new(&config.agent.data_dir)) else {
        bail!("agent is not registered; run `hostwatch-agent register` first");
    };
    Ok(ApiClient::new(&config.api)?.with_agent_id(registration.agent_id))
}

/// Register with the inventory server and store the assigned id.
///
/// An existing registration is kept unless `force` is set.
pub async fn register(config: HostwatchConfig, force: bool) -> anyhow::Result<()> {
    ensure_valid(&config)?;
    let data_dir = Path::new(&config.agent.data_dir);

    if let Some(existing) = Registration::load(data_dir) {
        if !force {
            info!(agent_id = %existing.agent_id, "agent already registered");
            println!("already registered as {}", existing.agent_id);
            return Ok(());
        }
        warn!(agent_id = %existing.agent_id, "replacing existing registration");
    }

    let api = ApiClient::new(&config.api)?;
    let snapshot = tokio::task::spawn_blocking(inventory::collect).await?;
    let agent_id = api
        .register(&RegistrationRequest::from_snapshot(&snapshot))
        .await?;
    Registration::new(agent_id.clone())
        .save(data_dir)
        .with_context(|| format!("failed to store registration in {}", data_dir.display()))?;

    info!(%agent_id, "agent registered");
    println!("registered as {agent_id}");
    Ok(())
}

/// Start the scheduler with the standard jobs and block until Ctrl-C.
pub async fn run(config: HostwatchConfig) -> anyhow::Result<()> {
    ensure_valid(&config)?;

    let scheduler = Arc::new(Scheduler::with_config(config.scheduler.clone()));
    let ctx = JobContext {
        api: registered_client(&config)?,
        runtime: Handle::current(),
        config,
    };
    jobs::register_standard_jobs(&scheduler, &ctx)?;
    scheduler.start()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        jobs = scheduler.len(),
        server = %ctx.config.api.url,
        "hostwatch agent running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    // stop() blocks for up to the configured stop timeout
    let stopping = Arc::clone(&scheduler);
    tokio::task::spawn_blocking(move || stopping.stop()).await?;

    let status = scheduler.get_status();
    info!(status = %serde_json::to_string(&status)?, "final scheduler status");
    Ok(())
}

/// Collect and send one report.
pub async fn once(config: HostwatchConfig) -> anyhow::Result<()> {
    ensure_valid(&config)?;
    let api = registered_client(&config)?;
    let snapshot = tokio::task::spawn_blocking(inventory::collect).await?;
    api.send_report(&snapshot).await?;
    info!(hostname = %snapshot.hostname, "report sent");
    Ok(())
}

pub fn validate(config: &HostwatchConfig) -> anyhow::Result<()> {
    ensure_valid(config)?;
    println!("configuration OK");
    Ok(())
}

pub fn collect(output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&inventory::collect())?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "snapshot written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
