//! Error types for service supervision.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from launching, watching and stopping a target service.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The container runtime binary is not on `PATH`.
    #[error("Container runtime '{runtime}' not found in PATH")]
    RuntimeNotFound {
        /// Runtime that was looked up.
        runtime: String,
    },

    /// Spawning the service (or runtime) process failed.
    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        /// Program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another live run owns this instance name.
    #[error("Instance name '{name}' is already in use{}", format_owner(.pid))]
    NameInUse {
        /// Instance name.
        name: String,
        /// PID recorded in the lock file, if one could be read.
        pid: Option<u32>,
    },

    /// The instance lock file could not be created or read.
    #[error("Failed to lock {path}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the service process failed.
    #[error("Failed to wait for service process: {0}")]
    WaitFailed(#[source] std::io::Error),

    /// Delivering a signal to the process group failed.
    #[error("Failed to signal service process group: {0}")]
    SignalFailed(#[source] nix::Error),

    /// Graceful stop did not complete.
    #[error("Failed to stop service: {0}")]
    StopFailed(String),

    /// No free host port could be reserved.
    #[error("Failed to allocate a host port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// The launch request is unusable.
    #[error("Invalid launch request: {0}")]
    InvalidSpec(String),
}

fn format_owner(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" by process {pid}"),
        None => " (lock has no readable owner; remove it if no run is active)".to_string(),
    }
}
