pub mod clock;
pub mod constants;
pub mod daemon;
pub mod db;
pub mod error;
pub mod focus;
pub mod models;
pub mod platform;
pub mod reminders;
pub mod settings;
pub mod stats;
pub mod tracker;

#[cfg(test)]
mod test_utils;

pub use error::{AppError, Result};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "DWELL_DATA_DIR";

/// Files the daemon and CLI share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub dir: PathBuf,
    pub database: PathBuf,
    pub pid_file: PathBuf,
    pub status_file: PathBuf,
    pub log_file: PathBuf,
}

impl DataPaths {
    pub fn resolve() -> Result<Self> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::in_dir(PathBuf::from(dir)));
        }
        let dirs = ProjectDirs::from("org", "dwell", "dwell").ok_or(AppError::NotFound {
            entity: "Home directory",
        })?;
        Ok(Self::in_dir(dirs.data_dir().to_path_buf()))
    }

    pub fn in_dir(dir: PathBuf) -> Self {
        Self {
            database: dir.join("dwell.db"),
            pid_file: dir.join("dwell.pid"),
            status_file: dir.join("status.json"),
            log_file: dir.join("dwell.log"),
            dir,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}
