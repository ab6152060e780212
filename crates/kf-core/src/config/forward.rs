//! Forwarding engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::duration;

/// Bounded, fixed-delay reconnection policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts allowed after the last explicit start
    pub max_attempts: u32,

    /// Delay before each attempt
    #[serde(with = "duration")]
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(2),
        }
    }
}

/// Tuning for forward sessions and the template registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Reconnection after a running forward fails
    pub reconnect: ReconnectPolicy,

    /// How long stop waits for the run loop before forcing it down
    #[serde(with = "duration")]
    pub stop_grace: Duration,

    /// Upper bound on opening one remote stream
    #[serde(with = "duration")]
    pub dial_timeout: Duration,

    /// Upper bound on start-time control plane calls
    #[serde(with = "duration")]
    pub start_timeout: Duration,

    /// How often a running forward re-checks its pod; zero disables
    #[serde(with = "duration")]
    pub health_interval: Duration,

    /// Log lines kept per forward
    pub log_capacity: usize,

    /// Read buffer per local connection
    pub read_buffer_size: usize,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            stop_grace: Duration::from_secs(5),
            dial_timeout: Duration::from_secs(15),
            start_timeout: Duration::from_secs(15),
            health_interval: Duration::from_secs(10),
            log_capacity: 1000,
            read_buffer_size: 32 * 1024,
        }
    }
}
