//! Constants used throughout the Wayfare node runner.
//!
//! Defaults tightly coupled to one component live next to that component
//! (`wayfare_tunnel`, `wayfare_peers`, `wayfare_usage`).

// =============================================================================
// Local Services
// =============================================================================

/// Default port for the local peer management API.
pub const DEFAULT_API_PORT: u16 = 4000;

/// Default port for the Prometheus exporter.
pub const DEFAULT_METRICS_PORT: u16 = 9464;

/// Default bind address for local-only services (API, metrics).
pub const DEFAULT_LOCALHOST_ADDR: &str = "127.0.0.1";

// =============================================================================
// Shutdown
// =============================================================================

/// How long tracked tasks get to finish after shutdown is requested, in seconds.
pub const DEFAULT_TASK_SHUTDOWN_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// File System
// =============================================================================

/// Default data directory name.
pub const DEFAULT_DATA_DIR_NAME: &str = "wayfare";

/// Prefix for configuration environment variables (`WAYFARE_TUNNEL__INTERFACE=wg1`).
pub const ENV_PREFIX: &str = "WAYFARE_";
