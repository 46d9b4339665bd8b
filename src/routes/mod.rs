//! Route model: the route and manifest types plus the pure rules applied to
//! them (normalization, filtering, merging).

mod error;
mod filter;
mod merge;
mod model;
mod normalize;

pub use error::RouteError;
pub use filter::{DEFAULT_DENIED_PREFIXES, RejectReason, RouteFilter};
pub use merge::merge;
pub use model::{Manifest, Method, Route, RouteEntry, RouteKey};
pub use normalize::{MalformedSchemaEntry, Normalized, PathRewrite, normalize};
