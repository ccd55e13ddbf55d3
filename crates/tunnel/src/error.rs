use std::time::Duration;

/// Errors from driving the live tunnel interface.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// A `wg`/`wg-quick` invocation exited unsuccessfully.
    #[error("`{command}` failed: {reason}")]
    Interface { command: String, reason: String },

    /// The interface is not up, so there is nothing to read or modify.
    #[error("interface {interface} unavailable: {reason}")]
    InterfaceUnavailable { interface: String, reason: String },

    /// The command did not complete within the configured timeout.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The command could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command succeeded but printed something we could not interpret.
    #[error("unexpected output from `{command}`: {reason}")]
    Output { command: String, reason: String },
}

impl TunnelError {
    /// Whether the failure means the interface is down rather than broken.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::InterfaceUnavailable { .. })
    }
}

/// Errors generating tunnel key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The OS random source could not be read.
    #[error("secure random source unavailable: {0}")]
    CryptoUnavailable(String),
}
