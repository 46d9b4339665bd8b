//! Resolved, typed engine settings.

use std::path::PathBuf;
use std::time::Duration;

use super::error::ConfigError;
use super::schema::Config;
use crate::routes::RouteFilter;

/// Settings every component receives explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Schema locations tried on each endpoint, in order.
    pub candidate_paths: Vec<String>,
    /// Overall probing timeout.
    pub probe_timeout: Duration,
    /// Per-request probe timeout.
    pub request_timeout: Duration,
    /// Pause between probe rounds.
    pub probe_retry_interval: Duration,
    /// Reachability deadline.
    pub wait_timeout: Duration,
    /// Pause between reachability rounds.
    pub poll_interval: Duration,
    /// Grace period after launch.
    pub startup_delay: Duration,
    /// Prefixes the route filter rejects.
    pub denied_prefixes: Vec<String>,
    /// Container runtime binary.
    pub container_runtime: String,
    /// Host used to reach the service.
    pub host: String,
    /// Grace period for a stopping service.
    pub stop_timeout: Duration,
    /// Output lines kept per service.
    pub log_lines: usize,
    /// Directory for instance locks.
    pub lock_dir: PathBuf,
}

/// Per-invocation overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces the candidate list when non-empty.
    pub candidate_paths: Vec<String>,
    /// Overall probing timeout.
    pub probe_timeout: Option<Duration>,
    /// Reachability deadline.
    pub wait_timeout: Option<Duration>,
    /// Startup grace period (zero disables it).
    pub startup_delay: Option<Duration>,
}

impl EngineConfig {
    /// Validate a merged config and convert it to typed settings.
    pub fn resolve(config: &Config) -> Result<Self, ConfigError> {
        if config.wait.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "wait.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if config.probe.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "probe.request_timeout_secs",
                "must be greater than zero",
            ));
        }
        if config.runtime.container.trim().is_empty() {
            return Err(ConfigError::invalid("runtime.container", "must not be empty"));
        }
        if config.runtime.host.trim().is_empty() {
            return Err(ConfigError::invalid("runtime.host", "must not be empty"));
        }
        validate_paths("probe.candidate_paths", &config.probe.candidate_paths)?;
        for prefix in &config.filter.denied_prefixes {
            if !prefix.starts_with('/') {
                return Err(ConfigError::invalid(
                    "filter.denied_prefixes",
                    format!("'{prefix}' must start with '/'"),
                ));
            }
        }

        Ok(Self::convert(config))
    }

    fn convert(config: &Config) -> Self {
        Self {
            candidate_paths: config.probe.candidate_paths.clone(),
            probe_timeout: Duration::from_secs(config.probe.timeout_secs),
            request_timeout: Duration::from_secs(config.probe.request_timeout_secs),
            probe_retry_interval: Duration::from_secs(config.probe.retry_interval_secs),
            wait_timeout: Duration::from_secs(config.wait.timeout_secs),
            poll_interval: Duration::from_millis(config.wait.poll_interval_ms),
            startup_delay: Duration::from_secs(config.wait.startup_delay_secs),
            denied_prefixes: config.filter.denied_prefixes.clone(),
            container_runtime: config.runtime.container.clone(),
            host: config.runtime.host.clone(),
            stop_timeout: Duration::from_secs(config.runtime.stop_timeout_secs),
            log_lines: config.runtime.log_lines.max(1),
            lock_dir: config
                .runtime
                .lock_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if !overrides.candidate_paths.is_empty() {
            validate_paths("--probe-path", &overrides.candidate_paths)?;
            self.candidate_paths = overrides.candidate_paths;
        }
        if let Some(timeout) = overrides.probe_timeout {
            self.probe_timeout = timeout;
        }
        if let Some(timeout) = overrides.wait_timeout {
            self.wait_timeout = timeout;
        }
        if let Some(delay) = overrides.startup_delay {
            self.startup_delay = delay;
        }
        Ok(self)
    }

    /// Route filter for the configured denylist.
    pub fn route_filter(&self) -> RouteFilter {
        RouteFilter::new(self.denied_prefixes.iter().cloned())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::convert(&Config::defaults())
    }
}

fn validate_paths(field: &str, paths: &[String]) -> Result<(), ConfigError> {
    if paths.is_empty() {
        return Err(ConfigError::invalid(field, "at least one path is required"));
    }
    if let Some(bad) = paths.iter().find(|p| !p.starts_with('/')) {
        return Err(ConfigError::invalid(field, format!("'{bad}' must start with '/'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.candidate_paths.len(), 4);
        assert_eq!(engine.probe_timeout, Duration::from_secs(60));
        assert_eq!(engine.request_timeout, Duration::from_secs(5));
        assert_eq!(engine.poll_interval, Duration::from_secs(1));
        assert_eq!(engine.startup_delay, Duration::from_secs(10));
        assert_eq!(engine.lock_dir, std::env::temp_dir());
        assert!(engine.route_filter().denied_prefixes().contains(&"/static".to_string()));
    }

    #[test]
    fn test_builtin_defaults_pass_validation() {
        assert_eq!(
            EngineConfig::resolve(&Config::defaults()).unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_resolve_rejects_zero_poll_interval() {
        let mut config = Config::defaults();
        config.wait.poll_interval_ms = 0;
        assert!(matches!(
            EngineConfig::resolve(&config),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_resolve_rejects_relative_candidate() {
        let mut config = Config::defaults();
        config.probe.candidate_paths.push("openapi.json".to_string());
        let err = EngineConfig::resolve(&config).unwrap_err();
        assert!(err.to_string().contains("openapi.json"));
    }

    #[test]
    fn test_resolve_rejects_empty_candidates() {
        let mut config = Config::defaults();
        config.probe.candidate_paths.clear();
        assert!(EngineConfig::resolve(&config).is_err());
    }

    #[test]
    fn test_overrides_replace_values() {
        let engine = EngineConfig::default()
            .with_overrides(ConfigOverrides {
                candidate_paths: vec!["/spec".to_string()],
                probe_timeout: Some(Duration::from_secs(5)),
                wait_timeout: None,
                startup_delay: Some(Duration::ZERO),
            })
            .unwrap();

        assert_eq!(engine.candidate_paths, vec!["/spec"]);
        assert_eq!(engine.probe_timeout, Duration::from_secs(5));
        assert_eq!(engine.wait_timeout, Duration::from_secs(300));
        assert_eq!(engine.startup_delay, Duration::ZERO);
    }

    #[test]
    fn test_overrides_validate_paths() {
        let result = EngineConfig::default().with_overrides(ConfigOverrides {
            candidate_paths: vec!["spec".to_string()],
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
