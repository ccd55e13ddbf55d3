//! CLI argument structs for node infrastructure configuration.
//!
//! These args serve dual purposes:
//! - CLI parsing via clap (`#[derive(Args)]`)
//! - Configuration serialization via serde (`#[derive(Serialize, Deserialize)]`)
//!
//! Component args (tunnel, peers, backend, provider, usage) live in the
//! crates that consume them.

mod api;
mod datadir;
mod log;
mod metrics;

pub use api::ApiArgs;
pub use datadir::DataDirArgs;
pub use log::LogArgs;
pub use metrics::MetricsArgs;
