//! Command-line interface definitions for routescout.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigOverrides;

/// Discover the HTTP routes of a service and write a passthrough route
/// manifest.
///
/// routescout starts the service (a container image or a host command),
/// waits for its ports, probes it for an OpenAPI/Swagger document and turns
/// the documented endpoints into a manifest a deployment step can consume.
#[derive(Parser, Debug)]
#[command(name = "routescout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Subcommands for routescout.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a service, discover its routes and write the manifest.
    Discover(DiscoverArgs),

    /// Probe an already running service once and write the manifest.
    Probe(ProbeArgs),

    /// Resolve a service's manifest the way a deployment would and print it.
    Show(ShowArgs),
}

/// Arguments for `routescout discover`.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Service spec file (TOML).
    pub spec: PathBuf,

    /// Seconds to wait after launch before polling ports.
    #[arg(long = "startup-delay", value_name = "SECS")]
    pub startup_delay: Option<u64>,

    /// Overall seconds allowed for finding a schema.
    #[arg(long = "probe-timeout", value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Seconds allowed for all ports to become reachable.
    #[arg(long = "wait-timeout", value_name = "SECS")]
    pub wait_timeout: Option<u64>,

    /// Extra environment for the service (repeatable).
    ///
    /// Overrides entries from the spec's [env] table.
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// GPU request passed to the container runtime.
    #[arg(long = "gpus", value_name = "VALUE")]
    pub gpus: Option<String>,

    /// Extra container runtime arguments (repeatable, whitespace-split).
    #[arg(long = "extra-arg", value_name = "ARGS", allow_hyphen_values = true)]
    pub extra_args: Vec<String>,

    /// Schema path to probe (repeatable); replaces the configured list.
    #[arg(long = "probe-path", value_name = "PATH")]
    pub probe_paths: Vec<String>,

    /// Manifest destination; `-` for stdout.
    ///
    /// Defaults to `<spec stem>.routes.json` next to the spec.
    #[arg(short = 'o', long = "output", value_name = "OUTPUT")]
    pub output: Option<String>,
}

impl DiscoverArgs {
    /// Settings given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            candidate_paths: self.probe_paths.clone(),
            probe_timeout: self.probe_timeout.map(Duration::from_secs),
            wait_timeout: self.wait_timeout.map(Duration::from_secs),
            startup_delay: self.startup_delay.map(Duration::from_secs),
        }
    }
}

/// Arguments for `routescout probe`.
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Base URL of the running service, e.g. `http://127.0.0.1:8000`.
    #[arg(long = "base-url", value_name = "URL")]
    pub base_url: String,

    /// Internal service port recorded in the routes.
    #[arg(long = "port", value_name = "PORT")]
    pub port: u16,

    /// Schema path to probe (repeatable); replaces the configured list.
    #[arg(long = "probe-path", value_name = "PATH")]
    pub probe_paths: Vec<String>,

    /// Overall seconds allowed for finding a schema.
    #[arg(long = "probe-timeout", value_name = "SECS")]
    pub probe_timeout: Option<u64>,

    /// Manifest destination; `-` for stdout.
    #[arg(short = 'o', long = "output", value_name = "OUTPUT", default_value = "-")]
    pub output: String,

    /// Service identifier recorded in the manifest.
    #[arg(long = "source", value_name = "NAME")]
    pub source: Option<String>,
}

impl ProbeArgs {
    /// Settings given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            candidate_paths: self.probe_paths.clone(),
            probe_timeout: self.probe_timeout.map(Duration::from_secs),
            ..ConfigOverrides::default()
        }
    }
}

/// Arguments for `routescout show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Service spec file (TOML).
    pub spec: PathBuf,

    /// Port for manifest entries that do not name one.
    ///
    /// Defaults to the first port declared in the spec.
    #[arg(long = "default-port", value_name = "PORT")]
    pub default_port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_basic() {
        let cli = Cli::parse_from(["routescout", "discover", "imggen.toml"]);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Discover(args) => {
                assert_eq!(args.spec, PathBuf::from("imggen.toml"));
                assert!(args.output.is_none());
                let overrides = args.overrides();
                assert!(overrides.candidate_paths.is_empty());
                assert!(overrides.startup_delay.is_none());
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_discover_with_options() {
        let cli = Cli::parse_from([
            "routescout",
            "-vv",
            "discover",
            "svc.toml",
            "--startup-delay",
            "0",
            "--probe-timeout",
            "30",
            "--wait-timeout",
            "120",
            "-e",
            "A=1",
            "--env",
            "B=x=y",
            "--gpus",
            "all",
            "--extra-arg",
            "--shm-size=8g --ipc=host",
            "--probe-path",
            "/api/openapi.json",
            "-o",
            "-",
            "-c",
            "/etc/extra.toml",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/extra.toml")));
        match cli.command {
            Commands::Discover(args) => {
                assert_eq!(args.env, vec!["A=1", "B=x=y"]);
                assert_eq!(args.gpus.as_deref(), Some("all"));
                assert_eq!(args.extra_args, vec!["--shm-size=8g --ipc=host"]);
                assert_eq!(args.output.as_deref(), Some("-"));

                let overrides = args.overrides();
                assert_eq!(overrides.candidate_paths, vec!["/api/openapi.json"]);
                assert_eq!(overrides.startup_delay, Some(Duration::ZERO));
                assert_eq!(overrides.probe_timeout, Some(Duration::from_secs(30)));
                assert_eq!(overrides.wait_timeout, Some(Duration::from_secs(120)));
            }
            _ => panic!("Expected Discover command"),
        }
    }

    #[test]
    fn test_probe_command() {
        let cli = Cli::parse_from([
            "routescout",
            "probe",
            "--base-url",
            "http://127.0.0.1:41000",
            "--port",
            "8020",
            "--source",
            "imggen",
        ]);

        match cli.command {
            Commands::Probe(args) => {
                assert_eq!(args.base_url, "http://127.0.0.1:41000");
                assert_eq!(args.port, 8020);
                assert_eq!(args.output, "-");
                assert_eq!(args.source.as_deref(), Some("imggen"));
                assert!(args.overrides().wait_timeout.is_none());
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_probe_requires_port() {
        assert!(Cli::try_parse_from(["routescout", "probe", "--base-url", "http://h"]).is_err());
    }

    #[test]
    fn test_show_command() {
        let cli = Cli::parse_from(["routescout", "show", "svc.toml", "--default-port", "8080"]);
        match cli.command {
            Commands::Show(args) => {
                assert_eq!(args.spec, PathBuf::from("svc.toml"));
                assert_eq!(args.default_port, Some(8080));
            }
            _ => panic!("Expected Show command"),
        }
    }
}
