//! Error types for port reachability waiting.

use std::time::Duration;
use thiserror::Error;

/// Errors from waiting on service ports.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The deadline elapsed before every port accepted a connection.
    #[error("Timed out after {elapsed:?} waiting for port(s) {} to accept connections", format_ports(pending))]
    Timeout {
        /// Ports that never accepted a connection.
        pending: Vec<u16>,
        /// Time spent waiting.
        elapsed: Duration,
    },
}

fn format_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_names_pending_ports() {
        let err = WaitError::Timeout {
            pending: vec![8020, 8080],
            elapsed: Duration::from_secs(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("8020, 8080"));
        assert!(msg.contains("2s"));
    }
}
