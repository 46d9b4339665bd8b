//! Manifest error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::routes::RouteError;

/// Errors from writing or loading route manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest could not be serialized.
    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Writing the manifest failed; any previous file is untouched.
    #[error("Failed to write manifest {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a manifest file failed.
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON.
    #[error("Invalid route manifest JSON in {origin}: {source}")]
    Parse {
        /// Where the manifest came from.
        origin: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The manifest JSON has the wrong shape.
    #[error("Invalid route manifest in {origin}: {message}")]
    Format {
        /// Where the manifest came from.
        origin: String,
        /// What is wrong.
        message: String,
    },

    /// A route entry is invalid.
    #[error("Invalid route in {origin}: {source}")]
    Route {
        /// Where the manifest came from.
        origin: String,
        /// The route error.
        #[source]
        source: RouteError,
    },

    /// No manifest was found and there are no static routes to fall back on.
    #[error("Route manifest not found (searched: {}). Run `routescout discover` first or set ROUTESCOUT_ROUTE_MANIFEST_JSON", format_paths(searched))]
    NotFound {
        /// Paths that were tried.
        searched: Vec<PathBuf>,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_searched_paths() {
        let err = ManifestError::NotFound {
            searched: vec![PathBuf::from("/a/svc.routes.json"), PathBuf::from("svc.routes.json")],
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/svc.routes.json, svc.routes.json"));
        assert!(msg.contains("ROUTESCOUT_ROUTE_MANIFEST_JSON"));
    }

    #[test]
    fn test_write_error_display() {
        let err = ManifestError::Write {
            path: PathBuf::from("/ro/svc.routes.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(err.to_string().contains("/ro/svc.routes.json"));
    }
}
