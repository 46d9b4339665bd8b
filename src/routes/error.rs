//! Route validation errors.

use thiserror::Error;

/// Errors raised while building or validating a [`Route`](super::Route).
#[derive(Debug, Error)]
pub enum RouteError {
    /// Verb outside the supported set.
    #[error("Unsupported HTTP method '{0}' (expected GET, POST, PUT, PATCH or DELETE)")]
    InvalidMethod(String),

    /// Path does not start with `/`.
    #[error("Invalid route path '{path}': must start with '/'")]
    InvalidPath {
        /// The offending path.
        path: String,
    },

    /// Port is zero.
    #[error("Route '{path}' has an invalid port (must be 1-65535)")]
    InvalidPort {
        /// Path of the route.
        path: String,
    },

    /// No port given and no default available.
    #[error("Route '{path}' has no port and no default port is known")]
    MissingPort {
        /// Path of the route.
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_display() {
        let err = RouteError::MissingPort {
            path: "/predict".to_string(),
        };
        assert!(err.to_string().contains("/predict"));

        let err = RouteError::InvalidMethod("TRACE".to_string());
        assert!(err.to_string().contains("TRACE"));
    }
}
