//! Command-line surface of the agent.
//!
//! - `register`: register with the inventory server and store the agent id
//! - `run`: start the scheduler and block until Ctrl-C (default)
//! - `once`: collect and send a single report, then exit
//! - `validate`: check the configuration and exit
//! - `collect`: print an inventory snapshot without sending it

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hostwatch_core::HostwatchConfig;

use crate::agent;

/// Host inventory agent
#[derive(Parser, Debug)]
#[command(name = "hostwatch-agent")]
#[command(about = "Collects host inventory and reports it to the inventory server")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register with the inventory server
    Register {
        /// Replace an existing registration
        #[arg(long)]
        force: bool,
    },
    /// Run the scheduler until interrupted (default)
    Run,
    /// Send a single inventory report and exit
    Once,
    /// Validate the configuration and exit
    Validate,
    /// Print an inventory snapshot as JSON
    Collect {
        /// Write the snapshot to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the CLI command
pub async fn run(command: Option<Commands>, config: HostwatchConfig) -> anyhow::Result<()> {
    match command.unwrap_or(Commands::Run) {
        Commands::Register { force } => agent::register(config, force).await,
        Commands::Run => agent::run(config).await,
        Commands::Once => agent::once(config).await,
        Commands::Validate => agent::validate(&config),
        Commands::Collect { output } => agent::collect(output.as_deref()),
    }
}
