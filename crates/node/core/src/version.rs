//! Version information for the Wayfare node runner.

/// The version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The short version information for Wayfare.
pub const SHORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The git commit SHA, if provided at build time.
pub const GIT_SHA: &str = {
    match option_env!("WAYFARE_GIT_SHA") {
        Some(sha) => sha,
        None => "unknown",
    }
};

/// The long version information for Wayfare.
pub static LONG_VERSION: once_cell::sync::Lazy<String> =
    once_cell::sync::Lazy::new(|| format!("Version: {}\nCommit SHA: {}", VERSION, GIT_SHA));
