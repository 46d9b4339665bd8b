//! Configuration loading with hierarchy merging.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults (compiled into binary)
//! 2. System config: `/etc/routescout/config.toml`
//! 3. User config: `~/.config/routescout/config.toml`
//! 4. Additional config file (via `--config` flag)
//!
//! Command-line flags are applied afterwards, on the resolved
//! [`EngineConfig`](super::EngineConfig).
//!
//! Lists (candidate paths, denied prefixes) are **merged** (appended).
//! Scalars (timeouts, runtime) are **overridden**.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ConfigError;
use super::schema::Config;

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/routescout/config.toml";

/// User configuration directory name.
pub const USER_CONFIG_DIR: &str = "routescout";

/// User configuration filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Configuration loader with support for hierarchy merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Path to system-wide configuration.
    system_path: PathBuf,
    /// Path to user configuration.
    user_path: PathBuf,
}

impl ConfigLoader {
    /// Create a new ConfigLoader with default paths.
    #[must_use]
    pub fn new() -> Self {
        let user_config_dir = dirs::config_dir()
            .map(|p| p.join(USER_CONFIG_DIR))
            .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR));

        Self {
            system_path: PathBuf::from(SYSTEM_CONFIG_PATH),
            user_path: user_config_dir.join(USER_CONFIG_FILE),
        }
    }

    /// Create a ConfigLoader with custom paths (for testing).
    #[must_use]
    pub fn with_paths(system_path: PathBuf, user_path: PathBuf) -> Self {
        Self {
            system_path,
            user_path,
        }
    }

    /// Load and merge configuration from all sources.
    ///
    /// Missing system and user files are skipped. A missing `extra` file is
    /// an error, and invalid TOML anywhere fails fast.
    pub fn load(&self, extra: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = Config::defaults();
        debug!("Loaded embedded default configuration");

        if let Some(system_config) = load_file(&self.system_path)? {
            config.merge(system_config);
            debug!("Loaded system config from {:?}", self.system_path);
        } else {
            debug!("No system config found at {:?}", self.system_path);
        }

        if let Some(user_config) = load_file(&self.user_path)? {
            config.merge(user_config);
            debug!("Loaded user config from {:?}", self.user_path);
        } else {
            debug!("No user config found at {:?}", self.user_path);
        }

        if let Some(path) = extra {
            match load_file(path)? {
                Some(extra_config) => {
                    config.merge(extra_config);
                    debug!("Loaded additional config from {:?}", path);
                }
                None => {
                    // Unlike system/user config, an explicitly named file must exist
                    return Err(ConfigError::ReadError {
                        path: path.to_path_buf(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "Specified config file not found",
                        ),
                    });
                }
            }
        }

        Ok(config)
    }

    /// Path of the user configuration file.
    pub fn user_path(&self) -> &Path {
        &self.user_path
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<Config>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config: Config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
