//! Error types for a single probe request.
//!
//! None of these abort discovery. The prober logs them and moves on to the
//! next candidate.

use std::time::Duration;
use thiserror::Error;

/// Why a single candidate request did not yield a schema.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The endpoint and path did not form a valid URI.
    #[error("Invalid probe URL {url}: {message}")]
    InvalidUri {
        /// The URL that failed to parse.
        url: String,
        /// Parser message.
        message: String,
    },

    /// The request could not be sent or the connection failed.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Requested URL.
        url: String,
        /// Client error message.
        message: String,
    },

    /// No complete response within the per-request timeout.
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Requested URL.
        url: String,
        /// The per-request timeout.
        timeout: Duration,
    },

    /// Non-success HTTP status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// The body could not be read (or exceeded the size limit).
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// The body is not JSON.
    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document has no object-valued `paths` key.
    #[error("Document has no 'paths' mapping")]
    MissingPaths,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = ProbeError::Status {
            url: "http://127.0.0.1:8080/openapi.json".to_string(),
            status: 404,
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("/openapi.json"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = ProbeError::Timeout {
            url: "http://127.0.0.1:1/docs.json".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }
}
