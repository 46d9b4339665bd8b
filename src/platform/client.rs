//! Narrow interface to the hosting platform's command line tool.
//!
//! Discovery never goes through here; this is what a deployment step uses
//! after the manifest has been written.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Output};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::PlatformError;

/// Default platform binary.
pub const DEFAULT_PLATFORM_BINARY: &str = "chutes";

/// Captured output of a successful platform command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// One deployment as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeploymentSummary {
    /// Deployment name.
    pub name: String,
    /// Platform identifier.
    #[serde(default, alias = "chute_id")]
    pub id: Option<String>,
    /// Deployed version.
    #[serde(default)]
    pub version: Option<String>,
    /// Image reference.
    #[serde(default)]
    pub image: Option<String>,
}

/// Operations a deployment step needs from the platform.
pub trait PlatformClient {
    /// Build the image for `reference` (a `module:attr` style reference).
    fn build(&self, reference: &str, wait: bool) -> Result<CommandOutput, PlatformError>;

    /// Deploy `reference`.
    fn deploy(&self, reference: &str) -> Result<CommandOutput, PlatformError>;

    /// All deployments of the current account.
    fn list(&self) -> Result<Vec<DeploymentSummary>, PlatformError>;

    /// A single deployment by name.
    fn get(&self, name: &str) -> Result<DeploymentSummary, PlatformError>;

    /// Remove a deployment.
    fn delete(&self, name: &str) -> Result<CommandOutput, PlatformError>;
}

/// [`PlatformClient`] that shells out to the platform binary.
#[derive(Debug, Clone)]
pub struct CommandPlatformClient {
    binary: PathBuf,
    global_args: Vec<String>,
    extra_env: Vec<(String, String)>,
}

impl CommandPlatformClient {
    /// Use `binary`, resolved through PATH when it is a bare name.
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self, PlatformError> {
        let binary = binary.into();
        let resolved = which::which(&binary).map_err(|_| PlatformError::BinaryNotFound {
            binary: binary.display().to_string(),
        })?;
        Ok(Self {
            binary: resolved,
            global_args: Vec::new(),
            extra_env: Vec::new(),
        })
    }

    /// Add an argument placed before every subcommand.
    #[must_use]
    pub fn global_arg(mut self, arg: impl Into<String>) -> Self {
        self.global_args.push(arg.into());
        self
    }

    /// Set an environment variable for every command.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Resolved binary path.
    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, PlatformError> {
        let command_line = self.command_line(args);
        debug!("Running {}", command_line);

        let mut cmd = Command::new(&self.binary);
        cmd.args(self.global_args.iter().map(OsString::from));
        cmd.args(args.iter().map(OsString::from));
        for (key, value) in &self.extra_env {
            cmd.env(key, value);
        }

        let Output {
            status,
            stdout,
            stderr,
        } = cmd.output().map_err(|e| PlatformError::Spawn {
            command: command_line.clone(),
            source: e,
        })?;

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        if !status.success() {
            return Err(PlatformError::CommandFailed {
                command: command_line,
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }

    fn command_line(&self, args: &[&str]) -> String {
        let program = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.binary.display().to_string());
        std::iter::once(program)
            .chain(self.global_args.iter().cloned())
            .chain(args.iter().map(|a| a.to_string()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PlatformClient for CommandPlatformClient {
    fn build(&self, reference: &str, wait: bool) -> Result<CommandOutput, PlatformError> {
        if wait {
            self.run(&["build", reference, "--wait"])
        } else {
            self.run(&["build", reference])
        }
    }

    fn deploy(&self, reference: &str) -> Result<CommandOutput, PlatformError> {
        self.run(&["deploy", reference, "--accept-fee"])
    }

    fn list(&self) -> Result<Vec<DeploymentSummary>, PlatformError> {
        let args = ["chutes", "list", "--json"];
        let output = self.run(&args)?;
        parse_deployments(&output.stdout).map_err(|e| PlatformError::InvalidOutput {
            command: self.command_line(&args),
            source: e,
        })
    }

    fn get(&self, name: &str) -> Result<DeploymentSummary, PlatformError> {
        self.list()?
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| PlatformError::NotFound(name.to_string()))
    }

    fn delete(&self, name: &str) -> Result<CommandOutput, PlatformError> {
        self.run(&["chutes", "delete", name, "--yes"])
    }
}

/// Parse list output: a bare array or an object with `items`.
pub fn parse_deployments(text: &str) -> Result<Vec<DeploymentSummary>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(mut map) => match map.remove("items") {
            Some(items) => serde_json::from_value(items),
            None => Ok(Vec::new()),
        },
        other => serde_json::from_value(other),
    }
}
