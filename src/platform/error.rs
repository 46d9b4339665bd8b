//! Platform client error types.

use thiserror::Error;

/// Errors from the platform CLI.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform binary could not be found on PATH.
    #[error("Platform CLI '{binary}' not found on PATH")]
    BinaryNotFound {
        /// Binary name.
        binary: String,
    },

    /// The platform binary could not be started.
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("'{command}' failed ({status}): {stderr}")]
    CommandFailed {
        /// Command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The command's JSON output could not be parsed.
    #[error("Unexpected output from '{command}': {source}")]
    InvalidOutput {
        /// Command line.
        command: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// No deployment with that name exists.
    #[error("Deployment '{0}' not found")]
    NotFound(String),
}
