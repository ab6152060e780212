//! Pod health watch
//!
//! A running forward has no steady remote connection to notice a vanished
//! pod with; every stream is per local connection. The watch re-reads the
//! target pod periodically and reports the first reason the forward should
//! reconnect.

use std::sync::Arc;
use std::time::Duration;

use kf_core::traits::ClusterClient;
use kf_core::ResourceError;

use crate::log::ForwardLog;

/// Consecutive failed lookups tolerated before the cluster is considered lost
pub const MAX_LOOKUP_FAILURES: u32 = 3;

/// Watches the pod a forward is relaying to
pub struct PodWatch {
    pub client: Arc<dyn ClusterClient>,
    pub namespace: String,
    pub pod: String,
    /// Check interval; zero disables the watch
    pub interval: Duration,
    /// Upper bound on one lookup; a timeout counts as a failed lookup
    pub lookup_timeout: Duration,
}

impl PodWatch {
    /// Run until the pod is gone or stops running, or the cluster stops
    /// answering, and return why
    ///
    /// Never returns when the interval is zero.
    pub async fn run(&self, log: &ForwardLog) -> String {
        if self.interval.is_zero() {
            return std::future::pending().await;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut failures = 0u32;
        loop {
            ticker.tick().await;

            let lookup = self.client.get_pod(&self.namespace, &self.pod);
            let result = tokio::time::timeout(self.lookup_timeout, lookup)
                .await
                .unwrap_or_else(|_| {
                    Err(ResourceError::Timeout {
                        operation: format!("Looking up pod {}/{}", self.namespace, self.pod),
                        timeout: self.lookup_timeout,
                    })
                });

            match result {
                Ok(Some(pod)) if pod.is_running() => {
                    failures = 0;
                }
                Ok(Some(pod)) => {
                    return format!(
                        "Pod {}/{} is no longer running (phase: {})",
                        self.namespace, self.pod, pod.phase
                    );
                }
                Ok(None) => {
                    return format!("Pod {}/{} no longer exists", self.namespace, self.pod);
                }
                Err(e) => {
                    failures += 1;
                    log.warn(format!(
                        "Health check failed ({}/{}): {}",
                        failures, MAX_LOOKUP_FAILURES, e
                    ));
                    if failures >= MAX_LOOKUP_FAILURES {
                        return format!("Lost contact with cluster: {}", e);
                    }
                }
            }
        }
    }
}
