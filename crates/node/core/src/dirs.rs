//! Directory management for the Wayfare node runner.

use crate::args::DataDirArgs;
use crate::constants::DEFAULT_DATA_DIR_NAME;
use directories::ProjectDirs;
use eyre::{Result, eyre};
use std::{fs, path::PathBuf};

/// Returns the default project directories for Wayfare.
pub fn default_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "wayfare", DEFAULT_DATA_DIR_NAME)
}

/// Returns the default data directory path.
pub fn default_data_dir() -> Option<PathBuf> {
    default_project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Resolved data directory layout.
#[derive(Debug, Clone)]
pub struct DataDirs {
    /// Root data directory
    pub root: PathBuf,
}

impl DataDirs {
    /// Resolve the data directory from command line args and make sure it exists.
    pub fn new(args: &DataDirArgs) -> Result<Self> {
        let root = args
            .datadir
            .clone()
            .unwrap_or_else(|| default_data_dir().unwrap_or_else(|| PathBuf::from(".wayfare")));

        let dirs = Self { root };
        let state = dirs.state_dir();
        fs::create_dir_all(&state)
            .map_err(|e| eyre!("Failed to create directory {}: {}", state.display(), e))?;

        Ok(dirs)
    }

    /// Returns the path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Returns the path to the state directory for persistent node state.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Returns the path to the peer store.
    pub fn peers_file(&self) -> PathBuf {
        self.state_dir().join("peers.json")
    }
}
