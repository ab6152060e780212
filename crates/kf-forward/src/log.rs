//! Per-forward log ring
//!
//! Every line is mirrored to `tracing` and also kept in a bounded ring so
//! front ends can show a forward's recent history. The oldest line is
//! evicted once the ring is full.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use kf_core::time::{clock_time, current_time_millis};

/// Bounded log history for one forward
pub struct ForwardLog {
    /// Forward name, attached to mirrored tracing events
    name: String,
    /// Maximum number of retained lines
    capacity: usize,
    /// Retained lines, oldest first
    lines: Mutex<VecDeque<String>>,
}

impl ForwardLog {
    /// Create an empty log
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(forward = %self.name, "{}", message);
        self.push("DEBUG", message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(forward = %self.name, "{}", message);
        self.push("INFO", message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(forward = %self.name, "{}", message);
        self.push("WARN", message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(forward = %self.name, "{}", message);
        self.push("ERROR", message);
    }

    /// Last `max_lines` lines, oldest first
    pub fn tail(&self, max_lines: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = lines.len().saturating_sub(max_lines);
        lines.iter().skip(skip).cloned().collect()
    }

    /// Number of retained lines
    pub fn len(&self) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing has been logged yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, level: &str, message: &str) {
        let line = format!(
            "{} [{}] {}",
            clock_time(current_time_millis()),
            level,
            message
        );

        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }
}

impl std::fmt::Debug for ForwardLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardLog")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
