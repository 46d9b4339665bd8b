//! Reading manifests back the way a deployment consumer does.
//!
//! Resolution order: inline JSON, explicit file path, the conventional
//! `<stem>.routes.json` next to the spec and then in the working directory,
//! and finally the static routes alone.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::ManifestError;
use crate::routes::{Route, RouteEntry, merge};
use crate::service::MANIFEST_SUFFIX;

/// Env var holding an inline manifest.
pub const ROUTESCOUT_ROUTE_MANIFEST_JSON: &str = "ROUTESCOUT_ROUTE_MANIFEST_JSON";
/// Env var holding an explicit manifest path.
pub const ROUTESCOUT_ROUTE_MANIFEST: &str = "ROUTESCOUT_ROUTE_MANIFEST";
/// Env var that disables route registration when set to a non-empty value.
pub const ROUTESCOUT_SKIP_ROUTE_REGISTRATION: &str = "ROUTESCOUT_SKIP_ROUTE_REGISTRATION";

/// Caller-supplied overrides, usually taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSources {
    /// Inline manifest JSON.
    pub inline_json: Option<String>,
    /// Explicit manifest file.
    pub path: Option<PathBuf>,
    /// Register no routes at all.
    pub skip_registration: bool,
}

impl ManifestSources {
    /// Read the overrides from the process environment.
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            inline_json: non_empty(ROUTESCOUT_ROUTE_MANIFEST_JSON),
            path: non_empty(ROUTESCOUT_ROUTE_MANIFEST).map(PathBuf::from),
            skip_registration: non_empty(ROUTESCOUT_SKIP_ROUTE_REGISTRATION).is_some(),
        }
    }
}

/// Where the loaded routes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestOrigin {
    /// Inline JSON override.
    Inline,
    /// A manifest file.
    File(PathBuf),
    /// No manifest; static routes only.
    StaticOnly,
    /// Registration disabled.
    Skipped,
}

impl std::fmt::Display for ManifestOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestOrigin::Inline => write!(f, "${ROUTESCOUT_ROUTE_MANIFEST_JSON}"),
            ManifestOrigin::File(path) => write!(f, "{}", path.display()),
            ManifestOrigin::StaticOnly => f.write_str("static routes"),
            ManifestOrigin::Skipped => f.write_str("registration skipped"),
        }
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedRoutes {
    /// Routes, manifest first, static routes merged in.
    pub routes: Vec<Route>,
    /// Where the manifest came from.
    pub origin: ManifestOrigin,
}

/// Resolves the manifest for one service.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
    sources: ManifestSources,
    search_paths: Vec<PathBuf>,
    default_port: Option<u16>,
    static_routes: Vec<Route>,
}

impl ManifestLoader {
    /// Create a loader with the given overrides and no search paths.
    pub fn new(sources: ManifestSources) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Search for `<stem>.routes.json` next to `spec_path`, then in the
    /// working directory.
    #[must_use]
    pub fn for_spec(mut self, spec_path: &Path) -> Self {
        let file_name = match spec_path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if !stem.is_empty() => format!("{stem}{MANIFEST_SUFFIX}"),
            _ => return self,
        };
        self = self.search_path(spec_path.with_file_name(&file_name));
        self.search_path(PathBuf::from(file_name))
    }

    /// Add a candidate manifest file.
    #[must_use]
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
        self
    }

    /// Port used for entries that do not name one.
    #[must_use]
    pub fn default_port(mut self, port: Option<u16>) -> Self {
        self.default_port = port;
        self
    }

    /// Routes that are always published.
    #[must_use]
    pub fn static_routes(mut self, routes: Vec<Route>) -> Self {
        self.static_routes = routes;
        self
    }

    /// Candidate manifest files, in search order.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Resolve the routes.
    pub fn load(&self) -> Result<LoadedRoutes, ManifestError> {
        if self.sources.skip_registration {
            info!("Route registration disabled via {}", ROUTESCOUT_SKIP_ROUTE_REGISTRATION);
            return Ok(LoadedRoutes {
                routes: Vec::new(),
                origin: ManifestOrigin::Skipped,
            });
        }

        if let Some(raw) = &self.sources.inline_json {
            let routes = parse_routes(raw, self.default_port, ROUTESCOUT_ROUTE_MANIFEST_JSON)?;
            return Ok(self.finish(routes, ManifestOrigin::Inline));
        }

        let mut searched = Vec::new();
        let candidates: Vec<&PathBuf> = match &self.sources.path {
            Some(explicit) => vec![explicit],
            None => self.search_paths.iter().collect(),
        };

        for path in candidates {
            if !path.is_file() {
                debug!("No manifest at {:?}", path);
                searched.push(path.clone());
                continue;
            }
            let raw = fs::read_to_string(path).map_err(|e| ManifestError::Read {
                path: path.clone(),
                source: e,
            })?;
            let routes = parse_routes(&raw, self.default_port, &path.display().to_string())?;
            return Ok(self.finish(routes, ManifestOrigin::File(path.clone())));
        }

        if self.static_routes.is_empty() {
            return Err(ManifestError::NotFound { searched });
        }
        warn!(
            "Route manifest not found; using {} static routes",
            self.static_routes.len()
        );
        Ok(LoadedRoutes {
            routes: merge(Vec::new(), self.static_routes.clone()),
            origin: ManifestOrigin::StaticOnly,
        })
    }

    fn finish(&self, routes: Vec<Route>, origin: ManifestOrigin) -> LoadedRoutes {
        info!("Loaded {} routes from {}", routes.len(), origin);
        LoadedRoutes {
            routes: merge(routes, self.static_routes.clone()),
            origin,
        }
    }
}

/// Parse manifest text: `{"routes": [...]}` or a bare `[...]`.
///
/// `origin` names the source in error messages.
pub fn parse_routes(
    raw: &str,
    default_port: Option<u16>,
    origin: &str,
) -> Result<Vec<Route>, ManifestError> {
    let document: Value = serde_json::from_str(raw).map_err(|e| ManifestError::Parse {
        origin: origin.to_string(),
        source: e,
    })?;

    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut map) => match map.remove("routes") {
            Some(Value::Array(entries)) => entries,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(ManifestError::Format {
                    origin: origin.to_string(),
                    message: "'routes' must be a list".to_string(),
                });
            }
        },
        _ => {
            return Err(ManifestError::Format {
                origin: origin.to_string(),
                message: "expected an object with 'routes' or a list of routes".to_string(),
            });
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            let entry: RouteEntry = serde_json::from_value(entry).map_err(|e| ManifestError::Parse {
                origin: origin.to_string(),
                source: e,
            })?;
            entry.resolve(default_port).map_err(|e| ManifestError::Route {
                origin: origin.to_string(),
                source: e,
            })
        })
        .collect()
}
