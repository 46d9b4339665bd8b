//! Route and manifest data types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RouteError;
use super::merge::merge;

/// HTTP verbs a passthrough route may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// All recognized verbs, in canonical order.
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RouteError::InvalidMethod(s.to_string()))
    }
}

impl TryFrom<String> for Method {
    type Error = RouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Method> for &'static str {
    fn from(method: Method) -> Self {
        method.as_str()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a route within a manifest.
pub type RouteKey = (String, Method);

/// A public path + method mapped to an internal service port and path.
///
/// Field order here is the serialized field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Public-facing path.
    pub path: String,
    /// HTTP verb.
    pub method: Method,
    /// Internal service port the path is proxied to.
    pub port: u16,
    /// Path on the internal service.
    pub target_path: String,
    /// Forward responses as a stream instead of buffering them.
    #[serde(default)]
    pub stream: bool,
}

impl Route {
    /// Create a non-streaming route.
    pub fn new(
        path: impl Into<String>,
        method: Method,
        port: u16,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            port,
            target_path: target_path.into(),
            stream: false,
        }
    }

    /// Set the stream flag.
    #[must_use]
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// The `(path, method)` identity key.
    pub fn key(&self) -> RouteKey {
        (self.path.clone(), self.method)
    }

    /// Check the structural invariants of a route.
    pub fn validate(&self) -> Result<(), RouteError> {
        if !self.path.starts_with('/') {
            return Err(RouteError::InvalidPath {
                path: self.path.clone(),
            });
        }
        if !self.target_path.starts_with('/') {
            return Err(RouteError::InvalidPath {
                path: self.target_path.clone(),
            });
        }
        if self.port == 0 {
            return Err(RouteError::InvalidPort {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// A route as written by an operator or read back from a manifest.
///
/// Everything but the path is optional, and the field names used by
/// older manifests are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    /// Public path.
    #[serde(alias = "public_api_path")]
    pub path: String,
    /// Verb, `GET` when absent.
    #[serde(default)]
    pub method: Option<String>,
    /// Internal port, the caller's default when absent.
    #[serde(default, alias = "passthrough_port")]
    pub port: Option<u16>,
    /// Internal path, same as `path` when absent.
    #[serde(default, alias = "passthrough_path")]
    pub target_path: Option<String>,
    /// Stream flag.
    #[serde(default)]
    pub stream: bool,
}

impl RouteEntry {
    /// Fill in defaults and validate.
    pub fn resolve(self, default_port: Option<u16>) -> Result<Route, RouteError> {
        let method = match self.method.as_deref() {
            Some(m) => m.parse()?,
            None => Method::Get,
        };
        let port = self
            .port
            .or(default_port)
            .ok_or_else(|| RouteError::MissingPort {
                path: self.path.clone(),
            })?;
        let target_path = self.target_path.unwrap_or_else(|| self.path.clone());

        let route = Route {
            path: self.path,
            method,
            port,
            target_path,
            stream: self.stream,
        };
        route.validate()?;
        Ok(route)
    }
}

/// The persisted, deduplicated set of routes for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Manifest {
    routes: Vec<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

impl Manifest {
    /// Build a manifest, collapsing duplicate keys (later definitions win).
    pub fn new(routes: Vec<Route>, source: Option<String>) -> Self {
        Self {
            routes: merge(routes, Vec::new()),
            source,
        }
    }

    /// Routes in manifest order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Identifier of the service the routes came from.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Look up a route by its identity key.
    pub fn get(&self, path: &str, method: Method) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.path == path && r.method == method)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the manifest has no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Consume the manifest, returning its routes.
    pub fn into_routes(self) -> Vec<Route> {
        self.routes
    }
}
