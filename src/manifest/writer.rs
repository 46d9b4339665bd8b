//! Building and persisting manifests.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::ManifestError;
use crate::probe::DiscoveredSchema;
use crate::routes::{Manifest, PathRewrite, Route, RouteFilter, merge, normalize};

/// Where a manifest is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Standard output.
    Stdout,
    /// A file, replaced atomically.
    File(PathBuf),
}

impl OutputTarget {
    /// `-` means stdout; anything else is a path.
    pub fn parse(value: &str) -> Self {
        if value == "-" {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(value))
        }
    }
}

impl std::fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("<stdout>"),
            OutputTarget::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Build a manifest from an optional schema and the static routes.
///
/// Discovered routes are normalized with the serving endpoint's internal
/// port, filtered, then merged with `static_routes` (static wins).
pub fn build(
    schema: Option<&DiscoveredSchema>,
    static_routes: Vec<Route>,
    filter: &RouteFilter,
    rewrite: &PathRewrite,
    source: Option<String>,
) -> Manifest {
    let discovered = match schema {
        Some(schema) => {
            let normalized = normalize(schema.paths(), schema.endpoint().service_port, rewrite);
            if !normalized.malformed.is_empty() {
                warn!(
                    "Skipped {} malformed schema entr{}",
                    normalized.malformed.len(),
                    if normalized.malformed.len() == 1 { "y" } else { "ies" }
                );
            }
            let total = normalized.routes.len();
            let kept = filter.apply(normalized.routes);
            info!("Discovered {} routes ({} published)", total, kept.len());
            kept
        }
        None => Vec::new(),
    };

    Manifest::new(merge(discovered, static_routes), source)
}

/// Deterministic JSON text: pretty-printed with a trailing newline.
pub fn to_json(manifest: &Manifest) -> Result<String, ManifestError> {
    let mut text = serde_json::to_string_pretty(manifest).map_err(ManifestError::Serialize)?;
    text.push('\n');
    Ok(text)
}

/// Write `manifest` to `dest` atomically.
///
/// The JSON goes to a temporary file in the destination directory which is
/// then renamed over `dest`. On failure the previous file is left as is.
pub fn write(manifest: &Manifest, dest: &Path) -> Result<(), ManifestError> {
    let text = to_json(manifest)?;
    let write_err = |source: std::io::Error| ManifestError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".routescout-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(text.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(0o644))
        .map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;

    debug!("Wrote {} routes to {:?}", manifest.len(), dest);
    Ok(())
}

/// Write `manifest` to `target`.
pub fn write_to(manifest: &Manifest, target: &OutputTarget) -> Result<(), ManifestError> {
    match target {
        OutputTarget::File(path) => write(manifest, path),
        OutputTarget::Stdout => {
            let text = to_json(manifest)?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(|e| ManifestError::Write {
                    path: PathBuf::from("-"),
                    source: e,
                })
        }
    }
}
