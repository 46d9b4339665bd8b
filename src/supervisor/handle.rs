//! Handle to a running service.
//!
//! The handle owns the spawned child and the instance lock. Teardown happens
//! through [`ServiceHandle::stop`] on the normal path and through `Drop` on
//! every other one, so no exit path leaves the service running.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};

use super::cleanup::InstanceLock;
use super::error::SupervisorError;
use super::logs::LogBuffer;
use crate::error::DiscoveryError;
use crate::portwait::{PortWaiter, WaitError};
use crate::probe::ServiceEndpoint;

/// How often recent output is surfaced during the startup delay.
const LOG_SURFACE_INTERVAL: Duration = Duration::from_secs(5);

/// Lines of output surfaced each time.
const RECENT_LOG_LINES: usize = 5;

/// How long to wait for output capture to finish after an exit.
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// What the spawned child is.
#[derive(Debug, Clone)]
pub(crate) enum HandleKind {
    /// The attached container runtime client.
    Container {
        /// Resolved runtime binary.
        runtime: PathBuf,
    },
    /// The service process itself.
    Process,
}

enum Race {
    Ready(Result<(), WaitError>),
    Exited(io::Result<ExitStatus>),
}

enum Watch<T> {
    Done(T),
    Exited(io::Result<ExitStatus>),
}

enum Delay {
    Elapsed,
    Tick,
    Exited(io::Result<ExitStatus>),
}

/// Handle to a running service.
#[derive(Debug)]
pub struct ServiceHandle {
    child: Child,
    pid: u32,
    name: String,
    kind: HandleKind,
    endpoints: Vec<ServiceEndpoint>,
    logs: LogBuffer,
    stop_timeout: Duration,
    exit_status: Option<ExitStatus>,
    stopped: bool,
    capture: Vec<JoinHandle<()>>,
    _lock: InstanceLock,
}

impl ServiceHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        child: Child,
        pid: u32,
        name: String,
        kind: HandleKind,
        endpoints: Vec<ServiceEndpoint>,
        logs: LogBuffer,
        stop_timeout: Duration,
        capture: Vec<JoinHandle<()>>,
        lock: InstanceLock,
    ) -> Self {
        Self {
            child,
            pid,
            name,
            kind,
            endpoints,
            logs,
            stop_timeout,
            exit_status: None,
            stopped: false,
            capture,
            _lock: lock,
        }
    }

    /// PID of the spawned child (the runtime client in container mode).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Instance name (also the container name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the service runs in a container.
    pub fn is_container(&self) -> bool {
        matches!(self.kind, HandleKind::Container { .. })
    }

    /// Endpoints the service can be probed on, in declared port order.
    pub fn endpoints(&self) -> &[ServiceEndpoint] {
        &self.endpoints
    }

    /// Captured output.
    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// Exit status, if the child has exited and been reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Wait for the service to exit.
    pub async fn wait_exit(&mut self) -> Result<ExitStatus, SupervisorError> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let status = self.child.wait().await.map_err(SupervisorError::WaitFailed)?;
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Get the exit status if available without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>, SupervisorError> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait().map_err(SupervisorError::WaitFailed)?;
        }
        Ok(self.exit_status)
    }

    /// Hold off for `delay` before polling, watching for an early exit.
    ///
    /// Recent output is logged periodically so slow starts stay visible.
    pub async fn startup_delay(&mut self, delay: Duration) -> Result<(), DiscoveryError> {
        if let Some(status) = self.exit_status {
            return Err(self.crashed(status).await);
        }
        if delay.is_zero() {
            return Ok(());
        }

        info!("Giving {} {:?} to start", self.name, delay);
        let deadline = Instant::now() + delay;
        let mut ticker = tokio::time::interval_at(Instant::now() + LOG_SURFACE_INTERVAL, LOG_SURFACE_INTERVAL);
        let mut shown = 0usize;

        loop {
            let event = tokio::select! {
                _ = sleep_until(deadline) => Delay::Elapsed,
                _ = ticker.tick() => Delay::Tick,
                status = self.child.wait() => Delay::Exited(status),
            };
            match event {
                Delay::Elapsed => return Ok(()),
                Delay::Tick => shown = self.surface_recent_logs(shown),
                Delay::Exited(status) => return Err(self.on_exit(status).await),
            }
        }
    }

    /// Wait until every service port accepts a TCP connection.
    ///
    /// Races the port waiter against the child exiting: an exit first
    /// yields [`DiscoveryError::ServiceCrashed`] right away.
    pub async fn wait_reachable(&mut self, limit: Duration, poll_interval: Duration) -> Result<(), DiscoveryError> {
        if let Some(status) = self.try_wait()? {
            return Err(self.crashed(status).await);
        }

        let host = self
            .endpoints
            .first()
            .map(|e| e.host.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let ports: Vec<u16> = self.endpoints.iter().map(|e| e.probe_port).collect();
        let mut waiter = PortWaiter::new(host, &ports, poll_interval);

        let race = tokio::select! {
            result = waiter.wait(limit) => Race::Ready(result),
            status = self.child.wait() => Race::Exited(status),
        };
        match race {
            Race::Ready(result) => result.map_err(DiscoveryError::from),
            Race::Exited(status) => Err(self.on_exit(status).await),
        }
    }

    /// Run `work` while watching the service; an exit first yields
    /// [`DiscoveryError::ServiceCrashed`].
    pub async fn while_running<F>(&mut self, work: F) -> Result<F::Output, DiscoveryError>
    where
        F: Future,
    {
        if let Some(status) = self.try_wait()? {
            return Err(self.crashed(status).await);
        }

        let watch = tokio::select! {
            output = work => Watch::Done(output),
            status = self.child.wait() => Watch::Exited(status),
        };
        match watch {
            Watch::Done(output) => Ok(output),
            Watch::Exited(status) => Err(self.on_exit(status).await),
        }
    }

    /// Stop the service gracefully, escalating to a forced kill.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let result = match self.kind.clone() {
            HandleKind::Container { runtime } => self.stop_container(&runtime).await,
            HandleKind::Process => self.stop_process().await,
        };

        for task in self.capture.drain(..) {
            task.abort();
        }
        result
    }

    async fn stop_container(&mut self, runtime: &std::path::Path) -> Result<(), SupervisorError> {
        if self.try_wait()?.is_none() {
            info!("Stopping container {}", self.name);
            let grace = self.stop_timeout.as_secs().to_string();
            let stop = Command::new(runtime)
                .args(["stop", "-t", &grace, &self.name])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match timeout(self.stop_timeout + Duration::from_secs(5), stop).await {
                Ok(Ok(status)) => debug!("{} stop exited with {}", self.name, status),
                Ok(Err(e)) => warn!("Failed to run container stop for {}: {}", self.name, e),
                Err(_) => warn!("Container stop for {} did not finish in time", self.name),
            }
        }

        // The container was started with --rm; this only covers a stop that
        // failed part way.
        let _ = Command::new(runtime)
            .args(["rm", "-f", &self.name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match timeout(self.stop_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                Ok(())
            }
            Ok(Err(e)) => Err(SupervisorError::WaitFailed(e)),
            Err(_) => {
                let _ = self.child.start_kill();
                Err(SupervisorError::StopFailed(format!(
                    "runtime client for {} did not exit after container removal",
                    self.name
                )))
            }
        }
    }

    async fn stop_process(&mut self) -> Result<(), SupervisorError> {
        if self.try_wait()?.is_none() {
            info!("Stopping process group {} ({})", self.pid, self.name);
            self.signal_group(Signal::SIGTERM)?;

            match timeout(self.stop_timeout, self.child.wait()).await {
                Ok(Ok(status)) => self.exit_status = Some(status),
                Ok(Err(e)) => return Err(SupervisorError::WaitFailed(e)),
                Err(_) => {
                    warn!(
                        "{} did not exit within {:?}, sending SIGKILL",
                        self.name, self.stop_timeout
                    );
                    self.signal_group(Signal::SIGKILL)?;
                    let status = self.child.wait().await.map_err(SupervisorError::WaitFailed)?;
                    self.exit_status = Some(status);
                }
            }
        }

        // Descendants that outlived the leader.
        self.signal_group(Signal::SIGKILL)
    }

    /// Send `signal` to the service's process group. A group that no longer
    /// exists is not an error.
    fn signal_group(&self, signal: Signal) -> Result<(), SupervisorError> {
        let Ok(raw) = i32::try_from(self.pid) else {
            return Ok(());
        };
        match killpg(Pid::from_raw(raw), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SupervisorError::SignalFailed(e)),
        }
    }

    fn surface_recent_logs(&self, shown: usize) -> usize {
        let total = self.logs.len();
        if total == 0 || total == shown {
            info!("{}: no new output yet", self.name);
            return total;
        }
        for line in self.logs.tail(RECENT_LOG_LINES) {
            info!("[{}] {}", self.name, line);
        }
        total
    }

    async fn on_exit(&mut self, status: io::Result<ExitStatus>) -> DiscoveryError {
        match status {
            Ok(status) => {
                self.exit_status = Some(status);
                self.crashed(status).await
            }
            Err(e) => SupervisorError::WaitFailed(e).into(),
        }
    }

    async fn crashed(&mut self, status: ExitStatus) -> DiscoveryError {
        for task in self.capture.drain(..) {
            if timeout(LOG_DRAIN_TIMEOUT, task).await.is_err() {
                debug!("Output of {} still open after exit", self.name);
            }
        }
        warn!("{} exited before becoming reachable ({})", self.name, status);
        DiscoveryError::ServiceCrashed {
            status,
            logs: self.logs.snapshot(),
        }
    }
}

/// Run `f` on this thread, letting a multi-threaded runtime move its other
/// tasks elsewhere first.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(rt) if rt.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        for task in &self.capture {
            task.abort();
        }
        if self.stopped {
            return;
        }

        debug!("Tearing down {} from drop", self.name);
        match &self.kind {
            HandleKind::Container { runtime } => {
                // Drop cannot await, so `rm -f` runs synchronously.
                let remove = || {
                    std::process::Command::new(runtime)
                        .args(["rm", "-f", &self.name])
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .status()
                };
                if let Err(e) = run_blocking(remove) {
                    warn!("Failed to remove container {}: {}", self.name, e);
                }
            }
            HandleKind::Process => {
                if self.exit_status.is_none()
                    && let Err(e) = self.signal_group(Signal::SIGKILL)
                {
                    warn!("Failed to kill process group of {}: {}", self.name, e);
                }
            }
        }
        if self.exit_status.is_none() {
            let _ = self.child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::*;
    use crate::supervisor::{LaunchMode, LaunchSpec, ServiceLauncher, pick_host_port};

    fn spec(name: &str, script: &str, port: u16) -> LaunchSpec {
        LaunchSpec {
            name: name.to_string(),
            mode: LaunchMode::Process {
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                work_dir: None,
            },
            ports: vec![port],
            env: BTreeMap::from([("GREETING".to_string(), "hi".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_early_exit_is_reported_as_crash_with_logs() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1").with_lock_dir(dir.path());
        let port = pick_host_port("127.0.0.1").unwrap();
        let mut handle = launcher
            .launch(spec("crash", "echo \"$GREETING boom\" >&2; exit 1", port))
            .unwrap();

        let start = std::time::Instant::now();
        let err = handle
            .wait_reachable(Duration::from_secs(30), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(10));
        match err {
            DiscoveryError::ServiceCrashed { status, logs } => {
                assert_eq!(status.code(), Some(1));
                assert!(logs.iter().any(|l| l.contains("hi boom")), "logs: {logs:?}");
            }
            other => panic!("unexpected error: {other}"),
        }
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_crash_during_startup_delay() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1").with_lock_dir(dir.path());
        let port = pick_host_port("127.0.0.1").unwrap();
        let mut handle = launcher.launch(spec("early", "exit 3", port)).unwrap();

        let start = std::time::Instant::now();
        let err = handle.startup_delay(Duration::from_secs(30)).await.unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(matches!(err, DiscoveryError::ServiceCrashed { .. }));
        assert_eq!(handle.exit_status().and_then(|s| s.code()), Some(3));
    }

    #[tokio::test]
    async fn test_while_running_returns_work_output_or_crash() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1").with_lock_dir(dir.path());
        let port = pick_host_port("127.0.0.1").unwrap();

        let mut handle = launcher.launch(spec("steady", "sleep 30", port)).unwrap();
        let value = handle.while_running(async { 42 }).await.unwrap();
        assert_eq!(value, 42);
        handle.stop().await.unwrap();

        let mut handle = launcher.launch(spec("flaky", "sleep 0.2; exit 4", port)).unwrap();
        let err = handle
            .while_running(tokio::time::sleep(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ServiceCrashed { .. }));
        assert_eq!(handle.exit_status().and_then(|s| s.code()), Some(4));
    }

    #[tokio::test]
    async fn test_stop_terminates_process_group() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1")
            .with_lock_dir(dir.path())
            .with_stop_timeout(Duration::from_secs(2));
        let port = pick_host_port("127.0.0.1").unwrap();
        let mut handle = launcher.launch(spec("sleeper", "sleep 30", port)).unwrap();
        let pid = handle.pid();

        assert!(handle.try_wait().unwrap().is_none());
        handle.stop().await.unwrap();

        assert!(handle.exit_status().is_some());
        assert!(!crate::supervisor::process_exists(pid));
        let status = handle.wait_exit().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_drop_kills_service_and_releases_lock() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1").with_lock_dir(dir.path());
        let port = pick_host_port("127.0.0.1").unwrap();
        let handle = launcher.launch(spec("dropped", "sleep 30", port)).unwrap();
        let lock_path = dir.path().join("routescout-discover-dropped.lock");
        assert!(lock_path.exists());

        drop(handle);

        assert!(!lock_path.exists());
        launcher
            .launch(spec("dropped", "sleep 30", port))
            .unwrap()
            .stop()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_debug_names_service() {
        let dir = tempdir().unwrap();
        let launcher = ServiceLauncher::new("docker", "127.0.0.1").with_lock_dir(dir.path());
        let port = pick_host_port("127.0.0.1").unwrap();
        let mut handle = launcher.launch(spec("printable", "sleep 30", port)).unwrap();

        let text = format!("{handle:?}");
        assert!(text.contains("routescout-discover-printable"));
        handle.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_blocking_inside_multi_thread_runtime() {
        let status = run_blocking(|| std::process::Command::new("true").status()).unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_run_blocking_inside_current_thread_runtime() {
        assert_eq!(run_blocking(|| 7), 7);
    }

    #[test]
    fn test_run_blocking_outside_runtime() {
        assert_eq!(run_blocking(|| "done"), "done");
    }
}
