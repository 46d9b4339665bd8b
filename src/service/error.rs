//! Service specification errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::routes::RouteError;

/// Errors from loading or validating a service specification.
#[derive(Debug, Error)]
pub enum ServiceSpecError {
    /// The spec file could not be read.
    #[error("Failed to read service spec {path}: {source}")]
    Read {
        /// Spec path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The spec file is not valid TOML for this schema.
    #[error("Failed to parse service spec {path}: {source}")]
    Parse {
        /// Spec path.
        path: PathBuf,
        /// The underlying TOML error.
        source: toml::de::Error,
    },

    /// The spec parsed but is unusable.
    #[error("Invalid service spec {path}: {message}")]
    Invalid {
        /// Spec path.
        path: PathBuf,
        /// What is wrong.
        message: String,
    },

    /// A port list could not be parsed.
    #[error("Invalid port list '{0}': expected comma-separated ports in 1-65535")]
    InvalidPorts(String),

    /// An environment override is not `KEY=VALUE`.
    #[error("Invalid environment override '{0}': expected KEY=VALUE")]
    InvalidEnv(String),

    /// A static route is invalid.
    #[error("Invalid static route in {path}: {source}")]
    Route {
        /// Spec path.
        path: PathBuf,
        /// The route error.
        #[source]
        source: RouteError,
    },
}
