//! Configuration and on-disk layout of the updater.
//!
//! Everything the updater persists lives in one application data directory:
//!
//! ```text
//! <data dir>/
//! ├── update-config.json     # UpdateConfig (see crate::upgrade::config)
//! ├── database.db            # owned by the desktop app, backed up before installs
//! ├── api-config.json        # owned by the desktop app, backed up before installs
//! ├── backups/backup-*/      # snapshots taken by BackupManager
//! └── updates/<artifact>     # artifacts staged by the native installer
//! ```
//!
//! The data directory defaults to `dirs::data_local_dir()/taskquest` and can
//! be overridden with `--data-dir` or the `TASKQUEST_DATA_DIR` environment
//! variable.

mod store;

pub use store::ConfigStore;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::constants::{BACKUPS_DIR, UPDATE_CONFIG_FILE, UPDATES_DIR};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TASKQUEST_DATA_DIR";

/// Resolved locations of every file the updater touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Use an explicit data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the data directory from an override, the environment, or the
    /// platform default, in that order.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = explicit {
            return Ok(Self::new(dir));
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(Self::new(dir));
            }
        }
        Self::default_location()
    }

    /// Platform default location.
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?;
        Ok(Self::new(base.join("taskquest")))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join(UPDATE_CONFIG_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUPS_DIR)
    }

    pub fn updates_dir(&self) -> PathBuf {
        self.data_dir.join(UPDATES_DIR)
    }
}
