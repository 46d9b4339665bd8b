//! Instance naming, locking and stale-lock cleanup.
//!
//! Every supervised service runs under a deterministic instance name derived
//! from its service name. A lock file holding the owner's PID guards the
//! name, so a second concurrent run against the same service fails instead
//! of fighting over the same container and manifest.
//!
//! If a run is killed with SIGKILL its lock survives. Such a lock is stale
//! once its PID is gone: acquisition reclaims it, and
//! [`cleanup_stale_locks`] sweeps them at startup.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::error::SupervisorError;

/// Prefix of every instance name and lock file.
pub const INSTANCE_PREFIX: &str = "routescout-discover-";

const LOCK_EXTENSION: &str = "lock";

/// Deterministic instance name for a service.
///
/// Characters outside `[a-z0-9_.-]` become `-`.
pub fn instance_name(service: &str) -> String {
    let sanitized: String = service
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '-' || c == '.');
    if sanitized.is_empty() {
        format!("{INSTANCE_PREFIX}service")
    } else {
        format!("{INSTANCE_PREFIX}{sanitized}")
    }
}

/// Exclusive ownership of an instance name, released on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    name: String,
}

impl InstanceLock {
    /// Lock `instance` in the system temp directory.
    pub fn acquire(instance: &str) -> Result<Self, SupervisorError> {
        Self::acquire_in(&std::env::temp_dir(), instance)
    }

    /// Lock `instance` in `dir`.
    ///
    /// The PID is written to a temporary file which is then linked into
    /// place without clobbering, so a lock file never exists without its
    /// owner.
    pub fn acquire_in(dir: &Path, instance: &str) -> Result<Self, SupervisorError> {
        let path = lock_path(dir, instance);
        let lock_err = |source: std::io::Error| SupervisorError::Lock {
            path: path.clone(),
            source,
        };

        // Two attempts: the second follows removal of a stale lock.
        for _ in 0..2 {
            let mut pending = tempfile::Builder::new()
                .prefix(&format!(".{instance}."))
                .suffix(".tmp")
                .tempfile_in(dir)
                .map_err(lock_err)?;
            writeln!(pending, "{}", std::process::id()).map_err(lock_err)?;
            pending.as_file().sync_all().map_err(lock_err)?;

            let error = match pending.persist_noclobber(&path) {
                Ok(_) => {
                    debug!("Acquired instance lock {:?}", path);
                    return Ok(Self {
                        path: path.clone(),
                        name: instance.to_string(),
                    });
                }
                Err(e) => e.error,
            };
            if error.kind() != ErrorKind::AlreadyExists {
                return Err(lock_err(error));
            }

            match lock_owner(&path) {
                LockOwner::Vanished => continue,
                LockOwner::Alive(pid) => {
                    return Err(SupervisorError::NameInUse {
                        name: instance.to_string(),
                        pid: Some(pid),
                    });
                }
                LockOwner::Unknown => {
                    return Err(SupervisorError::NameInUse {
                        name: instance.to_string(),
                        pid: None,
                    });
                }
                LockOwner::Dead(pid) => {
                    info!("Reclaiming stale lock {:?} (owner {} is gone)", path, pid);
                    remove_lock_file(&path).map_err(lock_err)?;
                }
            }
        }

        Err(lock_err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "lock was re-created concurrently",
        )))
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locked instance name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = remove_lock_file(&self.path) {
            warn!("Failed to remove instance lock {:?}: {}", self.path, e);
        }
    }
}

fn lock_path(dir: &Path, instance: &str) -> PathBuf {
    dir.join(format!("{instance}.{LOCK_EXTENSION}"))
}

fn remove_lock_file(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// State of an existing lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockOwner {
    /// The recorded process is running.
    Alive(u32),
    /// The recorded process is gone.
    Dead(u32),
    /// No readable PID; treated as held.
    Unknown,
    /// The file disappeared while being inspected.
    Vanished,
}

fn lock_owner(path: &Path) -> LockOwner {
    match fs::read_to_string(path) {
        Ok(text) => match text.trim().parse::<u32>() {
            Ok(pid) if process_exists(pid) => LockOwner::Alive(pid),
            Ok(pid) => LockOwner::Dead(pid),
            Err(_) => LockOwner::Unknown,
        },
        Err(e) if e.kind() == ErrorKind::NotFound => LockOwner::Vanished,
        Err(_) => LockOwner::Unknown,
    }
}

/// Check if a process with the given PID exists.
pub fn process_exists(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Lock files in `dir` whose recorded owner no longer exists.
///
/// A lock without a readable PID is never considered stale.
pub fn list_stale_locks_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut stale: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(INSTANCE_PREFIX))
                && path.extension().is_some_and(|ext| ext == LOCK_EXTENSION)
        })
        .filter(|path| matches!(lock_owner(path), LockOwner::Dead(_)))
        .collect();
    stale.sort();
    stale
}

/// Remove stale lock files from `dir`, returning how many were removed.
pub fn cleanup_stale_locks_in(dir: &Path) -> usize {
    let mut removed = 0;
    for path in list_stale_locks_in(dir) {
        match remove_lock_file(&path) {
            Ok(()) => {
                info!("Removed stale instance lock {:?}", path);
                removed += 1;
            }
            Err(e) => warn!("Failed to remove stale lock {:?}: {}", path, e),
        }
    }
    removed
}

/// Remove stale lock files from the system temp directory.
pub fn cleanup_stale_locks() -> usize {
    debug!("Checking for stale instance locks from crashed runs");
    cleanup_stale_locks_in(&std::env::temp_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_instance_name_sanitizes() {
        assert_eq!(instance_name("imggen"), "routescout-discover-imggen");
        assert_eq!(instance_name("My Chute/v2"), "routescout-discover-my-chute-v2");
        assert_eq!(instance_name("  "), "routescout-discover-service");
        assert_eq!(instance_name("-weird-"), "routescout-discover-weird");
    }

    #[test]
    fn test_process_exists() {
        assert!(process_exists(std::process::id()));
        assert!(!process_exists(0));
        assert!(!process_exists(u32::MAX));
    }

    #[test]
    fn test_second_lock_fails_with_name_in_use() {
        let dir = tempdir().unwrap();
        let first = InstanceLock::acquire_in(dir.path(), "routescout-discover-a").unwrap();

        let err = InstanceLock::acquire_in(dir.path(), "routescout-discover-a").unwrap_err();
        match err {
            SupervisorError::NameInUse { name, pid } => {
                assert_eq!(name, "routescout-discover-a");
                assert_eq!(pid, Some(std::process::id()));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(first.path().exists());
        drop(first);
        assert!(!dir.path().join("routescout-discover-a.lock").exists());
        InstanceLock::acquire_in(dir.path(), "routescout-discover-a").unwrap();
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routescout-discover-b.lock");
        fs::write(&path, format!("{}\n", u32::MAX)).unwrap();

        let lock = InstanceLock::acquire_in(dir.path(), "routescout-discover-b").unwrap();
        let owner = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_cleanup_removes_only_stale_locks() {
        let dir = tempdir().unwrap();
        let _live = InstanceLock::acquire_in(dir.path(), "routescout-discover-live").unwrap();
        fs::write(dir.path().join("routescout-discover-dead.lock"), format!("{}\n", u32::MAX)).unwrap();
        fs::write(dir.path().join("routescout-discover-unowned.lock"), "garbage").unwrap();
        fs::write(dir.path().join("unrelated.lock"), "garbage").unwrap();

        assert_eq!(
            list_stale_locks_in(dir.path()),
            vec![dir.path().join("routescout-discover-dead.lock")]
        );
        assert_eq!(cleanup_stale_locks_in(dir.path()), 1);
        assert!(dir.path().join("routescout-discover-live.lock").exists());
        assert!(dir.path().join("routescout-discover-unowned.lock").exists());
        assert!(dir.path().join("unrelated.lock").exists());
        assert!(list_stale_locks_in(dir.path()).is_empty());
    }

    #[test]
    fn test_lock_without_owner_is_held() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("routescout-discover-race.lock");
        fs::write(&path, "").unwrap();

        assert!(list_stale_locks_in(dir.path()).is_empty());
        assert_eq!(cleanup_stale_locks_in(dir.path()), 0);

        let err = InstanceLock::acquire_in(dir.path(), "routescout-discover-race").unwrap_err();
        assert!(matches!(err, SupervisorError::NameInUse { pid: None, .. }));
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_acquired_lock_always_carries_pid_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let lock = InstanceLock::acquire_in(dir.path(), "routescout-discover-c").unwrap();

        let owner = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("routescout-discover-c.lock")]);
    }
}
