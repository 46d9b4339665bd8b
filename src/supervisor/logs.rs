//! Bounded capture of service output.
//!
//! Lines are kept for diagnostics only (crash reports, startup progress).
//! Nothing reads them to decide readiness.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Ring buffer of the most recent output lines, shared with capture tasks.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer keeping at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.guard();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// All buffered lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.guard().iter().cloned().collect()
    }

    /// The last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.guard();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Number of buffered lines.
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Maximum number of lines kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Spawn a task copying `reader` line by line into `buffer`.
///
/// The task ends when the stream closes.
pub(crate) fn spawn_capture<R>(reader: R, stream: &'static str, instance: String, buffer: LogBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(target: "routescout::service", "[{} {}] {}", instance, stream, line);
                    buffer.push(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading {} of {}: {}", stream, instance, e);
                    break;
                }
            }
        }
    })
}
