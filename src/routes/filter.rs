//! Platform validity rules for discovered routes.
//!
//! The downstream proxy cannot serve path parameters, file-like paths or the
//! root path, and UI frameworks expose a lot of internal routes that should
//! never become public endpoints. Routes matching any of these are dropped
//! before merging.

use std::fmt;

use tracing::{debug, info};

use super::model::Route;

/// Internal/UI route prefixes rejected by default.
pub const DEFAULT_DENIED_PREFIXES: &[&str] = &[
    "/static",
    "/assets",
    "/svelte",
    "/login",
    "/logout",
    "/gradio_api",
    "/theme",
    "/__",
];

/// Why a route was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Path contains a `{param}` segment.
    PathParameter,
    /// Final path segment looks like a file name.
    FileExtension,
    /// Path is `/` or empty.
    Root,
    /// Path starts with a denylisted prefix.
    Internal,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::PathParameter => "path parameter",
            RejectReason::FileExtension => "file extension in path",
            RejectReason::Root => "root/empty path",
            RejectReason::Internal => "internal/UI route",
        };
        f.write_str(reason)
    }
}

/// Route filter built from the configured prefix denylist.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    denied_prefixes: Vec<String>,
}

impl RouteFilter {
    /// Create a filter with the given denylist.
    pub fn new<I, S>(denied_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied_prefixes: denied_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Return the reason `path` must be skipped, or `None` if it is acceptable.
    pub fn reject_reason(&self, path: &str) -> Option<RejectReason> {
        if path.contains('{') || path.contains('}') {
            return Some(RejectReason::PathParameter);
        }
        if path.is_empty() || path == "/" {
            return Some(RejectReason::Root);
        }
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        if last_segment.contains('.') {
            return Some(RejectReason::FileExtension);
        }
        let trimmed = path.trim_end_matches('/');
        if self
            .denied_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()) || trimmed.starts_with(prefix.as_str()))
        {
            return Some(RejectReason::Internal);
        }
        None
    }

    /// Whether the route may be published.
    pub fn is_valid(&self, route: &Route) -> bool {
        self.reject_reason(&route.path).is_none()
    }

    /// Keep only valid routes, logging every rejection.
    pub fn apply(&self, routes: Vec<Route>) -> Vec<Route> {
        let total = routes.len();
        let kept: Vec<Route> = routes
            .into_iter()
            .filter(|route| match self.reject_reason(&route.path) {
                Some(reason) => {
                    debug!("Skipping route {} {}: {}", route.method, route.path, reason);
                    false
                }
                None => true,
            })
            .collect();

        if kept.len() < total {
            info!(
                "Filtered out {} of {} discovered routes",
                total - kept.len(),
                total
            );
        }
        kept
    }

    /// The configured denylist.
    pub fn denied_prefixes(&self) -> &[String] {
        &self.denied_prefixes
    }
}

impl Default for RouteFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DENIED_PREFIXES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Method;

    fn route(path: &str) -> Route {
        Route::new(path, Method::Get, 8080, path)
    }

    #[test]
    fn test_rejects_path_parameters() {
        let filter = RouteFilter::default();
        for path in ["/items/{id}", "/{name}", "/a/{b}/c", "/broken}"] {
            assert!(!filter.is_valid(&route(path)), "{path} should be rejected");
        }
        assert_eq!(
            filter.reject_reason("/items/{id}"),
            Some(RejectReason::PathParameter)
        );
    }

    #[test]
    fn test_rejects_root_and_empty() {
        let filter = RouteFilter::default();
        assert_eq!(filter.reject_reason("/"), Some(RejectReason::Root));
        assert_eq!(filter.reject_reason(""), Some(RejectReason::Root));
    }

    #[test]
    fn test_rejects_file_extensions_in_last_segment() {
        let filter = RouteFilter::default();
        for path in ["/favicon.ico", "/robots.txt", "/app/main.js", "/openapi.json"] {
            assert_eq!(
                filter.reject_reason(path),
                Some(RejectReason::FileExtension),
                "{path}"
            );
        }
        // A dot in an earlier segment is fine.
        assert!(filter.is_valid(&route("/v1.2/predict")));
    }

    #[test]
    fn test_rejects_denylisted_prefixes() {
        let filter = RouteFilter::default();
        for path in [
            "/static/app",
            "/assets",
            "/login",
            "/logout/",
            "/gradio_api/queue/join",
            "/theme",
            "/__internal",
            "/svelte/route",
        ] {
            assert_eq!(filter.reject_reason(path), Some(RejectReason::Internal), "{path}");
        }
    }

    #[test]
    fn test_accepts_regular_api_routes() {
        let filter = RouteFilter::default();
        for path in ["/predict", "/v1/chat/completions", "/health", "/generate/"] {
            assert!(filter.is_valid(&route(path)), "{path} should be accepted");
        }
    }

    #[test]
    fn test_custom_denylist() {
        let filter = RouteFilter::new(["/internal"]);
        assert!(!filter.is_valid(&route("/internal/metrics")));
        assert!(filter.is_valid(&route("/static/app")));
        assert_eq!(filter.denied_prefixes(), ["/internal".to_string()]);
    }

    #[test]
    fn test_apply_preserves_order() {
        let filter = RouteFilter::default();
        let kept = filter.apply(vec![
            route("/b"),
            route("/"),
            route("/a"),
            route("/items/{id}"),
            route("/c"),
        ]);
        let paths: Vec<&str> = kept.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/b", "/a", "/c"]);
    }
}
