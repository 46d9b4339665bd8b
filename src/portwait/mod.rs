//! Port reachability waiting.
//!
//! A service is considered reachable once every declared port has accepted a
//! TCP connection at least once. Nothing stronger is assumed: many services
//! bind their port long before they report readiness, and some never do.

pub mod error;
pub mod waiter;

pub use error::WaitError;
pub use waiter::{PortWaiter, wait_for_ports};
