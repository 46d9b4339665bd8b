//! Starting the target service.
//!
//! Two launch modes share one handle type:
//!
//! - **Container**: the container runtime runs attached (`run --rm`), each
//!   declared port published on a free host port.
//! - **Process**: the command runs directly on the host, in its own process
//!   group, listening on its declared ports.
//!
//! In both modes the spawned child's lifetime is the service's lifetime, so
//! an early exit is observed by waiting on the child.

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use super::builder::ContainerRunBuilder;
use super::cleanup::{InstanceLock, instance_name};
use super::error::SupervisorError;
use super::handle::{HandleKind, ServiceHandle};
use super::logs::{LogBuffer, spawn_capture};
use crate::config::EngineConfig;
use crate::probe::ServiceEndpoint;

/// How the service is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Run an image through the container runtime.
    Container {
        /// Image reference.
        image: String,
        /// Command run inside the image; the image default when empty.
        entrypoint: Vec<String>,
        /// Value for `--gpus`.
        gpus: Option<String>,
        /// Extra runtime arguments, whitespace-split.
        extra_args: Vec<String>,
    },
    /// Run a host command.
    Process {
        /// Program followed by its arguments.
        command: Vec<String>,
        /// Working directory.
        work_dir: Option<PathBuf>,
    },
}

/// Everything needed to start one service.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Service name; the instance name is derived from it.
    pub name: String,
    /// Launch mode.
    pub mode: LaunchMode,
    /// Ports the service listens on.
    pub ports: Vec<u16>,
    /// Environment injected into the service.
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    fn validate(&self) -> Result<(), SupervisorError> {
        if self.ports.is_empty() {
            return Err(SupervisorError::InvalidSpec(
                "at least one port is required".to_string(),
            ));
        }
        if self.ports.contains(&0) {
            return Err(SupervisorError::InvalidSpec("port 0 is not allowed".to_string()));
        }
        match &self.mode {
            LaunchMode::Container { image, .. } if image.trim().is_empty() => {
                Err(SupervisorError::InvalidSpec("image is empty".to_string()))
            }
            LaunchMode::Process { command, .. } if command.is_empty() => {
                Err(SupervisorError::InvalidSpec("command is empty".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Starts services and hands back an owning [`ServiceHandle`].
#[derive(Debug, Clone)]
pub struct ServiceLauncher {
    runtime: String,
    host: String,
    log_capacity: usize,
    stop_timeout: Duration,
    lock_dir: PathBuf,
}

impl ServiceLauncher {
    /// Create a launcher using `runtime` for container mode and `host` for
    /// reaching the service.
    pub fn new(runtime: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            host: host.into(),
            log_capacity: 200,
            stop_timeout: Duration::from_secs(10),
            lock_dir: std::env::temp_dir(),
        }
    }

    /// Create a launcher from the engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            runtime: config.container_runtime.clone(),
            host: config.host.clone(),
            log_capacity: config.log_lines,
            stop_timeout: config.stop_timeout,
            lock_dir: config.lock_dir.clone(),
        }
    }

    /// Keep instance locks in `dir` instead of the temp directory.
    #[must_use]
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = dir.into();
        self
    }

    /// Set the grace period given to a stopping service.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Host the service is reached on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Directory holding instance locks.
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Start the service described by `spec`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, spec: LaunchSpec) -> Result<ServiceHandle, SupervisorError> {
        spec.validate()?;
        let instance = instance_name(&spec.name);
        let lock = InstanceLock::acquire_in(&self.lock_dir, &instance)?;

        let (mut cmd, kind, endpoints, program) = match &spec.mode {
            LaunchMode::Container {
                image,
                entrypoint,
                gpus,
                extra_args,
            } => {
                let runtime = which::which(&self.runtime).map_err(|_| SupervisorError::RuntimeNotFound {
                    runtime: self.runtime.clone(),
                })?;
                remove_leftover_container(&runtime, &instance);

                let mut builder = ContainerRunBuilder::new(&runtime).name(&instance);
                if let Some(gpus) = gpus {
                    builder = builder.gpus(gpus);
                }
                for (key, value) in &spec.env {
                    builder = builder.env(key, value);
                }
                builder = builder.extra_args(extra_args);

                let mut endpoints = Vec::with_capacity(spec.ports.len());
                for &port in &spec.ports {
                    let host_port = pick_host_port(&self.host)?;
                    builder = builder.publish(&self.host, host_port, port);
                    endpoints.push(ServiceEndpoint::new(&self.host, host_port, port));
                }
                builder = builder.image(image, entrypoint);

                info!("Starting container: {}", builder.to_command_line());
                (
                    builder.build(),
                    HandleKind::Container { runtime },
                    endpoints,
                    self.runtime.clone(),
                )
            }
            LaunchMode::Process { command, work_dir } => {
                let (program, args) = command
                    .split_first()
                    .ok_or_else(|| SupervisorError::InvalidSpec("command is empty".to_string()))?;
                let mut cmd = Command::new(program);
                cmd.args(args).envs(&spec.env);
                if let Some(dir) = work_dir {
                    cmd.current_dir(dir);
                }
                let endpoints = spec
                    .ports
                    .iter()
                    .map(|&port| ServiceEndpoint::direct(&self.host, port))
                    .collect();

                info!("Starting process: {}", command.join(" "));
                (cmd, HandleKind::Process, endpoints, program.clone())
            }
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::SpawnFailed {
            program: program.clone(),
            source: e,
        })?;
        let pid = child.id().ok_or_else(|| SupervisorError::SpawnFailed {
            program,
            source: std::io::Error::other("child exited before its pid was read"),
        })?;
        debug!("Service {} started with PID {}", instance, pid);

        let logs = LogBuffer::new(self.log_capacity);
        let mut capture = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            capture.push(spawn_capture(stdout, "stdout", instance.clone(), logs.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            capture.push(spawn_capture(stderr, "stderr", instance.clone(), logs.clone()));
        }

        Ok(ServiceHandle::new(
            child,
            pid,
            instance,
            kind,
            endpoints,
            logs,
            self.stop_timeout,
            capture,
            lock,
        ))
    }
}

/// Whether the container runtime can be found on `PATH`.
pub fn runtime_available(runtime: &str) -> bool {
    which::which(runtime).is_ok()
}

/// Reserve a free ephemeral port on `host`.
///
/// The listener is closed before returning, so the port is only very likely
/// to still be free when the runtime binds it.
pub fn pick_host_port(host: &str) -> Result<u16, SupervisorError> {
    let listener = TcpListener::bind((host, 0)).map_err(SupervisorError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(SupervisorError::PortAllocation)?
        .port();
    Ok(port)
}

/// Remove a container left behind by a run that died without cleanup.
fn remove_leftover_container(runtime: &std::path::Path, instance: &str) {
    match std::process::Command::new(runtime)
        .args(["rm", "-f", instance])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => debug!("Pre-launch removal of {} exited with {}", instance, status),
        Err(e) => debug!("Pre-launch removal of {} failed: {}", instance, e),
    }
}
