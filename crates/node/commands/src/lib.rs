//! CLI commands for the Wayfare node runner.
//!
//! This crate provides the command-line interface:
//! - [`Cli`] - Top-level CLI parser
//! - [`Commands`] - Available subcommands
//! - [`NodeArgs`] - Combined arguments for the node command
//!
//! Configuration is loaded using Figment with the following priority
//! (highest wins):
//!
//! 1. CLI arguments (including their plain env fallbacks such as `BACKEND_URL`)
//! 2. Config file (`<datadir>/config.toml` or `--config`)
//! 3. Environment variables (`WAYFARE_` prefix, `__` between sections)
//! 4. Defaults

mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, NodeArgs};
pub use config::NodeConfig;

use clap::Parser;
use color_eyre::eyre;
use tracing::info;
use wayfare_node_core::{logging, version};

/// Run the Wayfare node runner with the process arguments.
///
/// This is the main entry point that should be called from the binary.
pub async fn run() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.logs)?;

    info!("Starting Wayfare {}", version::VERSION);

    match cli.command {
        Commands::Node(args) => commands::node::run(*args).await?,
    }

    Ok(())
}
