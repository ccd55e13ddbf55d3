//! CLI argument assembly and top-level parser.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub use wayfare_node_core::args::{ApiArgs, DataDirArgs, LogArgs, MetricsArgs};
pub use wayfare_peers::PeerArgs;
pub use wayfare_tunnel::TunnelArgs;
pub use wayfare_usage::{BackendArgs, ProviderArgs, UsageArgs};

/// Wayfare - decentralized VPN node runner
#[derive(Debug, Parser)]
#[command(author, version, long_version = wayfare_node_core::version::LONG_VERSION.as_str(), about, long_about = None)]
pub struct Cli {
    /// Logging configuration.
    #[command(flatten)]
    pub logs: LogArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Node runner commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the VPN node: tunnel, peer API, usage metering and heartbeat.
    Node(Box<NodeArgs>),
}

/// Arguments for the 'node' command.
#[derive(Debug, Args)]
pub struct NodeArgs {
    /// Path to a TOML config file. Defaults to `<datadir>/config.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Data directory configuration.
    #[command(flatten)]
    pub datadir: DataDirArgs,

    /// Local peer API configuration.
    #[command(flatten)]
    pub api: ApiArgs,

    /// Metrics configuration.
    #[command(flatten)]
    pub metrics: MetricsArgs,

    /// Tunnel interface configuration.
    #[command(flatten)]
    pub tunnel: TunnelArgs,

    /// Peer registry configuration.
    #[command(flatten)]
    pub peers: PeerArgs,

    /// Registration backend configuration.
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Provider advertisement.
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Usage metering configuration.
    #[command(flatten)]
    pub usage: UsageArgs,
}
