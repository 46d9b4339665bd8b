//! API description probing.
//!
//! Services describe themselves (if at all) through an OpenAPI/Swagger style
//! document served from one of a handful of well-known paths. The prober
//! walks those paths on each endpoint and accepts the first document that
//! carries a `paths` mapping.

pub mod error;
pub mod prober;

pub use error::ProbeError;
pub use prober::{DEFAULT_CANDIDATE_PATHS, DiscoveredSchema, SchemaProber, ServiceEndpoint};
