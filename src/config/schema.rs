//! Configuration schema definitions.
//!
//! This module defines the structure of the routescout configuration files.
//! Every section is optional; a missing key keeps the value from the layer
//! below it.
//!
//! ```toml
//! [probe]
//! candidate_paths = ["/api/openapi.json"]
//! timeout_secs = 120
//!
//! [wait]
//! timeout_secs = 600
//! poll_interval_ms = 500
//!
//! [filter]
//! denied_prefixes = ["/internal"]
//!
//! [runtime]
//! container = "podman"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::probe::DEFAULT_CANDIDATE_PATHS;
use crate::routes::DEFAULT_DENIED_PREFIXES;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Schema probing settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Reachability waiting settings.
    #[serde(default)]
    pub wait: WaitConfig,

    /// Route filter settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Service runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// The built-in defaults every load starts from.
    pub fn defaults() -> Self {
        Self {
            probe: ProbeConfig {
                candidate_paths: DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
                timeout_secs: 60,
                request_timeout_secs: 5,
                retry_interval_secs: 5,
            },
            wait: WaitConfig {
                timeout_secs: 300,
                poll_interval_ms: 1000,
                startup_delay_secs: 10,
            },
            filter: FilterConfig {
                denied_prefixes: DEFAULT_DENIED_PREFIXES.iter().map(|p| p.to_string()).collect(),
            },
            runtime: RuntimeConfig {
                container: "docker".to_string(),
                host: "127.0.0.1".to_string(),
                stop_timeout_secs: 10,
                log_lines: 200,
                lock_dir: None,
            },
        }
    }

    /// Merge another config into this one.
    ///
    /// Lists are appended without duplicates. Scalars are overridden when
    /// the other value is set (non-zero, non-empty).
    pub fn merge(&mut self, other: Config) {
        self.probe.merge(other.probe);
        self.wait.merge(other.wait);
        self.filter.merge(other.filter);
        self.runtime.merge(other.runtime);
    }
}

/// Append `other` to `list`, skipping entries already present.
fn merge_list(list: &mut Vec<String>, other: Vec<String>) {
    for item in other {
        if !list.contains(&item) {
            list.push(item);
        }
    }
}

fn merge_scalar<T: PartialEq + Default>(value: &mut T, other: T) {
    if other != T::default() {
        *value = other;
    }
}

/// Schema probing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Paths tried, in order, on every endpoint.
    #[serde(default)]
    pub candidate_paths: Vec<String>,

    /// Overall probing timeout in seconds.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default)]
    pub request_timeout_secs: u64,

    /// Pause between probe rounds in seconds.
    #[serde(default)]
    pub retry_interval_secs: u64,
}

impl ProbeConfig {
    fn merge(&mut self, other: ProbeConfig) {
        merge_list(&mut self.candidate_paths, other.candidate_paths);
        merge_scalar(&mut self.timeout_secs, other.timeout_secs);
        merge_scalar(&mut self.request_timeout_secs, other.request_timeout_secs);
        merge_scalar(&mut self.retry_interval_secs, other.retry_interval_secs);
    }
}

/// Reachability waiting settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaitConfig {
    /// Deadline for all ports to accept a connection, in seconds.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Pause between connection rounds in milliseconds.
    #[serde(default)]
    pub poll_interval_ms: u64,

    /// Grace period after launch before polling starts, in seconds.
    #[serde(default)]
    pub startup_delay_secs: u64,
}

impl WaitConfig {
    fn merge(&mut self, other: WaitConfig) {
        merge_scalar(&mut self.timeout_secs, other.timeout_secs);
        merge_scalar(&mut self.poll_interval_ms, other.poll_interval_ms);
        merge_scalar(&mut self.startup_delay_secs, other.startup_delay_secs);
    }
}

/// Route filter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Internal/UI path prefixes that are never published.
    #[serde(default)]
    pub denied_prefixes: Vec<String>,
}

impl FilterConfig {
    fn merge(&mut self, other: FilterConfig) {
        merge_list(&mut self.denied_prefixes, other.denied_prefixes);
    }
}

/// Service runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Container runtime binary (looked up on `PATH`).
    #[serde(default)]
    pub container: String,

    /// Host the service is reached on and ports are published to.
    #[serde(default)]
    pub host: String,

    /// Grace period for a stopping service, in seconds.
    #[serde(default)]
    pub stop_timeout_secs: u64,

    /// Output lines kept per service.
    #[serde(default)]
    pub log_lines: usize,

    /// Directory for instance lock files (system temp dir when unset).
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

impl RuntimeConfig {
    fn merge(&mut self, other: RuntimeConfig) {
        merge_scalar(&mut self.container, other.container);
        merge_scalar(&mut self.host, other.host);
        merge_scalar(&mut self.stop_timeout_secs, other.stop_timeout_secs);
        merge_scalar(&mut self.log_lines, other.log_lines);
        if other.lock_dir.is_some() {
            self.lock_dir = other.lock_dir;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.probe.candidate_paths.is_empty());
        assert_eq!(config.wait.timeout_secs, 0);
        assert!(config.runtime.container.is_empty());
    }

    #[test]
    fn test_builtin_defaults() {
        let config = Config::defaults();
        assert_eq!(config.probe.candidate_paths[0], "/openapi.json");
        assert_eq!(config.probe.timeout_secs, 60);
        assert_eq!(config.wait.startup_delay_secs, 10);
        assert!(config.filter.denied_prefixes.contains(&"/gradio_api".to_string()));
        assert_eq!(config.runtime.container, "docker");
        assert_eq!(config.runtime.log_lines, 200);
    }

    #[test]
    fn test_config_merge_scalars() {
        let mut base = Config::defaults();
        let other = Config {
            wait: WaitConfig {
                timeout_secs: 900,
                ..Default::default()
            },
            runtime: RuntimeConfig {
                container: "podman".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        base.merge(other);

        assert_eq!(base.wait.timeout_secs, 900);
        // Zero values do not override.
        assert_eq!(base.wait.poll_interval_ms, 1000);
        assert_eq!(base.runtime.container, "podman");
        assert_eq!(base.runtime.host, "127.0.0.1");
    }

    #[test]
    fn test_config_merge_lists_dedup() {
        let mut base = Config::defaults();
        let other = Config {
            probe: ProbeConfig {
                candidate_paths: vec!["/openapi.json".to_string(), "/api/spec".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        base.merge(other);

        assert_eq!(base.probe.candidate_paths.len(), DEFAULT_CANDIDATE_PATHS.len() + 1);
        assert_eq!(base.probe.candidate_paths.last().unwrap(), "/api/spec");
    }

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
            [probe]
            candidate_paths = ["/spec.json"]
            timeout_secs = 30

            [filter]
            denied_prefixes = ["/internal"]

            [runtime]
            lock_dir = "/run/routescout"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.probe.candidate_paths, vec!["/spec.json"]);
        assert_eq!(config.probe.timeout_secs, 30);
        assert_eq!(config.filter.denied_prefixes, vec!["/internal"]);
        assert_eq!(config.runtime.lock_dir, Some(PathBuf::from("/run/routescout")));
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let result: Result<Config, _> = toml::from_str("[probe]\ntimeout = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_serialize_roundtrips_defaults() {
        let config = Config::defaults();
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
