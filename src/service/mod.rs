//! Target service specifications.

mod error;
mod spec;

pub use error::ServiceSpecError;
pub use spec::{
    MANIFEST_SUFFIX, ServiceSource, ServiceSpec, manifest_path_for, parse_env_override,
    parse_service_ports,
};
