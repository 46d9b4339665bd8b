//! TCP reachability polling.
//!
//! Each round attempts one connection to every port that has not yet
//! accepted one. A satisfied port is never probed again, so a service that
//! briefly stops listening after its first accept still counts as reachable.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, trace};

use super::error::WaitError;

/// Polls a set of ports on one host until each has accepted a connection.
#[derive(Debug, Clone)]
pub struct PortWaiter {
    host: String,
    /// Ports in caller order, duplicates removed.
    ports: Vec<u16>,
    /// Parallel to `ports`.
    satisfied: Vec<bool>,
    poll_interval: Duration,
}

impl PortWaiter {
    /// Create a waiter for `ports` on `host`.
    pub fn new(host: impl Into<String>, ports: &[u16], poll_interval: Duration) -> Self {
        let mut unique = Vec::with_capacity(ports.len());
        for port in ports {
            if !unique.contains(port) {
                unique.push(*port);
            }
        }
        let satisfied = vec![false; unique.len()];
        Self {
            host: host.into(),
            ports: unique,
            satisfied,
            poll_interval,
        }
    }

    /// Attempt one connection to each pending port.
    ///
    /// Every attempt is bounded by `attempt_timeout`. Returns `true` once all
    /// ports are satisfied.
    pub async fn poll_once(&mut self, attempt_timeout: Duration) -> bool {
        for (port, satisfied) in self.ports.iter().zip(self.satisfied.iter_mut()) {
            if *satisfied {
                continue;
            }
            let addr = format!("{}:{}", self.host, port);
            match timeout(attempt_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(_stream)) => {
                    debug!("Port {} on {} accepted a connection", port, self.host);
                    *satisfied = true;
                }
                Ok(Err(e)) => trace!("Port {} not reachable yet: {}", port, e),
                Err(_) => trace!("Connection attempt to {} timed out", addr),
            }
        }
        self.is_satisfied()
    }

    /// Whether every port has accepted a connection.
    pub fn is_satisfied(&self) -> bool {
        self.satisfied.iter().all(|s| *s)
    }

    /// Ports that have not accepted a connection yet, in caller order.
    pub fn pending(&self) -> Vec<u16> {
        self.ports
            .iter()
            .zip(&self.satisfied)
            .filter(|(_, satisfied)| !**satisfied)
            .map(|(port, _)| *port)
            .collect()
    }

    /// Poll until all ports are satisfied or `limit` elapses.
    ///
    /// The deadline is checked after every round and the loop sleeps
    /// `min(poll_interval, remaining)` between rounds.
    pub async fn wait(&mut self, limit: Duration) -> Result<(), WaitError> {
        if self.ports.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let deadline = start + limit;
        info!(
            "Waiting up to {:?} for port(s) {:?} on {}",
            limit, self.ports, self.host
        );

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt_timeout = self.poll_interval.min(remaining).max(Duration::from_millis(1));
            if self.poll_once(attempt_timeout).await {
                info!("All ports reachable after {:?}", start.elapsed());
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WaitError::Timeout {
                    pending: self.pending(),
                    elapsed: start.elapsed(),
                });
            }
            sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Host being polled.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Ports being polled, duplicates removed.
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }
}

/// Wait for every port in `ports` on `host` to accept a TCP connection.
pub async fn wait_for_ports(
    host: &str,
    ports: &[u16],
    limit: Duration,
    poll_interval: Duration,
) -> Result<(), WaitError> {
    PortWaiter::new(host, ports, poll_interval).wait(limit).await
}
