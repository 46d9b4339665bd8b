//! Configuration system for routescout.
//!
//! Engine settings (probe candidates, timeouts, the route denylist, the
//! container runtime) live in layered TOML files instead of constants, so
//! operators and tests can change them without touching process state.
//!
//! # Configuration Hierarchy
//!
//! 1. Embedded defaults
//! 2. System config: `/etc/routescout/config.toml`
//! 3. User config: `~/.config/routescout/config.toml`
//! 4. Additional config file (via `--config` flag)
//! 5. CLI flags (highest priority)
//!
//! # Merge Behavior
//!
//! - **Lists** (candidate paths, denied prefixes) are **merged** (appended)
//! - **Scalars** (timeouts, runtime, host) are **overridden**
//!
//! The merged [`Config`] resolves into an [`EngineConfig`] with typed
//! durations, which is what the engine components take.

mod engine;
mod error;
mod loader;
mod schema;

pub use engine::{ConfigOverrides, EngineConfig};
pub use error::ConfigError;
pub use loader::{ConfigLoader, SYSTEM_CONFIG_PATH};
pub use schema::{Config, FilterConfig, ProbeConfig, RuntimeConfig, WaitConfig};
