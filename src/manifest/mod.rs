//! Manifest building, atomic writing and loading.

mod error;
mod loader;
mod writer;

pub use error::ManifestError;
pub use loader::{
    LoadedRoutes, ManifestLoader, ManifestOrigin, ManifestSources, ROUTESCOUT_ROUTE_MANIFEST,
    ROUTESCOUT_ROUTE_MANIFEST_JSON, ROUTESCOUT_SKIP_ROUTE_REGISTRATION, parse_routes,
};
pub use writer::{OutputTarget, build, to_json, write, write_to};
