//! Process and container supervision for the service under discovery.
//!
//! The supervisor starts the target service, captures its output into a
//! bounded buffer, notices when it exits on its own, and guarantees
//! teardown. It never inspects output to decide readiness.

pub mod builder;
pub mod cleanup;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod logs;

pub use builder::ContainerRunBuilder;
pub use cleanup::{
    INSTANCE_PREFIX, InstanceLock, cleanup_stale_locks, cleanup_stale_locks_in, instance_name,
    list_stale_locks_in, process_exists,
};
pub use error::SupervisorError;
pub use handle::ServiceHandle;
pub use launcher::{LaunchMode, LaunchSpec, ServiceLauncher, pick_host_port, runtime_available};
pub use logs::LogBuffer;
