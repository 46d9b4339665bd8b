//! Hosting platform CLI client.

mod client;
mod error;

pub use client::{
    CommandOutput, CommandPlatformClient, DEFAULT_PLATFORM_BINARY, DeploymentSummary,
    PlatformClient, parse_deployments,
};
pub use error::PlatformError;
