//! Single-instance lock file (`<data_dir>/core.pid`), written and removed
//! only by the Scheduler. Liveness of a recorded PID is checked with
//! `sysinfo`, generalized here from performance sampling to a plain
//! liveness probe.

use std::fs;
use std::path::PathBuf;

use sysinfo::{Pid, System};
use tracing::{info, warn};

use crate::error::CoreError;

pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Aborts with `ErrAlreadyRunning` if the lock names a live process,
    /// unless `force` is set. A stale (dead-owner) lock is removed and
    /// replaced transparently.
    pub fn acquire(&self, force: bool) -> Result<(), CoreError> {
        if let Some(existing_pid) = self.read_owner() {
            if !force && Self::is_alive(existing_pid) {
                return Err(CoreError::AlreadyRunning(existing_pid));
            }
            if Self::is_alive(existing_pid) {
                warn!(pid = existing_pid, "force-starting over a live lock owner");
            } else {
                info!(pid = existing_pid, "removing stale lock file from a dead process");
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, std::process::id().to_string())?;
        Ok(())
    }

    pub fn release(&self) {
        if let Ok(recorded) = fs::read_to_string(&self.path) {
            if recorded.trim().parse::<u32>().ok() == Some(std::process::id()) {
                let _ = fs::remove_file(&self.path);
            }
        }
    }

    fn read_owner(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    fn is_alive(pid: u32) -> bool {
        let mut system = System::new();
        system.refresh_processes();
        system.process(Pid::from_u32(pid)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquiring_a_fresh_path_succeeds_and_writes_our_pid() {
        let dir = tempdir().unwrap();
        let lock = InstanceLock::new(dir.path().join("core.pid"));
        lock.acquire(false).unwrap();
        let recorded: u32 = fs::read_to_string(dir.path().join("core.pid")).unwrap().trim().parse().unwrap();
        assert_eq!(recorded, std::process::id());
    }

    #[test]
    fn a_stale_pid_is_replaced_without_force() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.pid");
        fs::write(&path, "999999999").unwrap();
        let lock = InstanceLock::new(path.clone());
        lock.acquire(false).unwrap();
        let recorded: u32 = fs::read_to_string(&path).unwrap().trim().parse().unwrap();
        assert_eq!(recorded, std::process::id());
    }

    #[test]
    fn release_only_removes_a_lock_we_own() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("core.pid");
        let lock = InstanceLock::new(path.clone());
        lock.acquire(false).unwrap();
        lock.release();
        assert!(!path.exists());
    }
}
