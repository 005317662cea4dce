mod agent;
mod api;
mod cli;
mod inventory;
mod jobs;

use clap::Parser;
use hostwatch_core::HostwatchConfig;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // load config: --config > HOSTWATCH_CONFIG env > ~/.hostwatch/hostwatch.toml
    let loaded = HostwatchConfig::load(cli.config.as_deref());

    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("hostwatch_agent={level},hostwatch_scheduler={level}").into()
            }),
        )
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        HostwatchConfig::default()
    });

    cli::run(cli.command, config).await
}
