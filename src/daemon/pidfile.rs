//! Single-instance guard and process control for the daemon.

use crate::error::{AppError, Result};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

/// Holds the pid file for as long as the daemon runs. Removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Claim `path` for this process. Fails with [`AppError::AlreadyRunning`] when a
    /// live process owns it; a stale file is replaced.
    pub fn acquire(path: &Path) -> Result<Self> {
        Self::acquire_as(path, std::process::id())
    }

    fn acquire_as(path: &Path, pid: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    writeln!(file, "{pid}")?;
                    info!("Pid file {} written", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(owner) = running_pid(path)? {
                        return Err(AppError::AlreadyRunning { pid: owner });
                    }
                    warn!("Removing stale pid file {}", path.display());
                    fs::remove_file(path)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::InvalidInput {
            field: "pid_file",
            reason: format!("could not claim {}", path.display()),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // another instance may have replaced a file we thought was ours
        if read_pid(&self.path).ok().flatten() == Some(self.pid) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove pid file: {e}");
            }
        }
    }
}

/// Pid recorded in `path`, if any. Unparsable contents count as absent.
pub fn read_pid(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.trim().parse().ok()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Pid recorded in `path` if that process is still alive.
pub fn running_pid(path: &Path) -> Result<Option<u32>> {
    Ok(read_pid(path)?.filter(|pid| is_alive(*pid)))
}

pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system.process(pid).is_some()
}

/// Ask `pid` to terminate. Returns false if it is gone or could not be signalled.
pub fn terminate(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system
        .process(pid)
        .is_some_and(|process| process.kill_with(Signal::Term).unwrap_or_else(|| process.kill()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_and_drop_removes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dwell.pid");

        let guard = PidFile::acquire(&path).unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(std::process::id()));
        assert_eq!(guard.pid(), std::process::id());

        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_live_owner_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dwell.pid");
        let _ours = PidFile::acquire(&path).unwrap();

        let err = PidFile::acquire_as(&path, 1).unwrap_err();
        assert!(matches!(err, AppError::AlreadyRunning { pid } if pid == std::process::id()));
    }

    #[test]
    fn test_stale_pid_file_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dwell.pid");
        // pid_max on Linux is at most 2^22, so this pid cannot exist
        fs::write(&path, "99999999\n").unwrap();

        let guard = PidFile::acquire(&path).unwrap();
        assert_eq!(read_pid(&path).unwrap(), Some(guard.pid()));
    }

    #[test]
    fn test_garbage_pid_file_reads_as_absent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dwell.pid");
        fs::write(&path, "not a pid").unwrap();
        assert_eq!(read_pid(&path).unwrap(), None);
        assert_eq!(running_pid(&dir.path().join("missing.pid")).unwrap(), None);
    }
}
