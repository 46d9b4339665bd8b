//! Top-level error for a discovery run.

use std::process::ExitStatus;

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::portwait::WaitError;
use crate::service::ServiceSpecError;
use crate::supervisor::SupervisorError;

/// Lines of captured output included in a crash message.
const CRASH_LOG_LINES: usize = 20;

/// Fatal errors that abort a discovery run.
///
/// A missing schema is deliberately absent: the run falls back to static
/// routes instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// One or more ports never accepted a connection.
    #[error("Service never became reachable: {0}")]
    Reachability(#[from] WaitError),

    /// The service exited before all ports were reachable.
    #[error("Service exited before becoming reachable ({status}){}", format_logs(logs))]
    ServiceCrashed {
        /// Exit status of the service (or runtime client).
        status: ExitStatus,
        /// Captured output, oldest first.
        logs: Vec<String>,
    },

    /// Starting or stopping the service failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    /// Writing or loading the manifest failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The service specification is unusable.
    #[error(transparent)]
    Spec(#[from] ServiceSpecError),

    /// A service address given on the command line is unusable.
    #[error("Invalid service address: {0}")]
    InvalidTarget(String),

    /// The run was interrupted (Ctrl-C).
    #[error("Discovery interrupted")]
    Interrupted,
}

fn format_logs(logs: &[String]) -> String {
    if logs.is_empty() {
        return "; no output captured".to_string();
    }
    let skip = logs.len().saturating_sub(CRASH_LOG_LINES);
    let mut out = format!("; last {} line(s) of output:", logs.len() - skip);
    for line in &logs[skip..] {
        out.push_str("\n  ");
        out.push_str(line);
    }
    out
}
