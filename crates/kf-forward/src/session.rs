//! Forward session lifecycle
//!
//! One session owns one forward definition at runtime:
//!
//! ```text
//! Stopped/Failed --start--> Starting --establish ok--> Running
//!                              |                          |
//!                        establish err             failure detected
//!                              v                          v
//!                           Failed      <--exhausted-- Starting (reconnect)
//!
//! Starting/Running --stop--> Stopping --> Stopped
//! ```
//!
//! Establishing a cycle reserves the local port, resolves secrets if none
//! are held, resolves the target pod and starts listening. While running, a
//! supervisor task races the accept loop against the pod health watch; the
//! first to fail triggers a reconnect with a fixed delay, up to the
//! configured number of attempts.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use kf_core::config::ForwardConfig;
use kf_core::time::current_time_millis;
use kf_core::traits::ClusterClient;
use kf_core::{
    ForwardDefinition, ForwardError, ForwardInstance, ForwardStatus, InstanceId, ResolvedSecret,
    ResourceError,
};

use crate::bridge::{self, RelaySettings, RemoteEndpoint};
use crate::health::PodWatch;
use crate::log::ForwardLog;
use crate::resolve::{resolve_secrets, resolve_target, ResolvedTarget};

/// States a stop can interrupt
const ACTIVE: [ForwardStatus; 2] = [ForwardStatus::Starting, ForwardStatus::Running];

/// A running supervisor and the token that stops it
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Result of a successful establish step
struct Established {
    socket: TcpSocket,
    port: u16,
    target: ResolvedTarget,
}

/// Runtime owner of one forward definition
pub struct ForwardSession {
    inner: Arc<SessionInner>,
    /// Serializes start and stop; holds the supervisor while one runs
    run: Mutex<Option<RunHandle>>,
}

struct SessionInner {
    definition: ForwardDefinition,
    client: Arc<dyn ClusterClient>,
    config: ForwardConfig,
    state: watch::Sender<ForwardInstance>,
    log: Arc<ForwardLog>,
}

impl ForwardSession {
    /// Create a stopped session with a fresh instance id
    pub fn new(
        definition: ForwardDefinition,
        client: Arc<dyn ClusterClient>,
        config: ForwardConfig,
    ) -> Self {
        let instance = ForwardInstance::new(InstanceId::new(), &definition);
        let (state, _) = watch::channel(instance);
        let log = Arc::new(ForwardLog::new(&definition.name, config.log_capacity));

        Self {
            inner: Arc::new(SessionInner {
                definition,
                client,
                config,
                state,
                log,
            }),
            run: Mutex::new(None),
        }
    }

    /// Instance identifier
    pub fn id(&self) -> InstanceId {
        self.inner.state.borrow().id
    }

    /// Definition this session runs
    pub fn definition(&self) -> &ForwardDefinition {
        &self.inner.definition
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ForwardInstance {
        self.inner.state.borrow().clone()
    }

    /// Current status
    pub fn status(&self) -> ForwardStatus {
        self.inner.state.borrow().status
    }

    /// Receive every snapshot published from now on
    pub fn subscribe(&self) -> watch::Receiver<ForwardInstance> {
        self.inner.state.subscribe()
    }

    /// This forward's log history
    pub fn log(&self) -> &Arc<ForwardLog> {
        &self.inner.log
    }

    /// Resolve the definition's secret references now, so the next start
    /// does not have to
    pub async fn prepare_secrets(&self) {
        let secrets = self.inner.fetch_secrets().await;
        self.inner.state.send_modify(|s| s.secrets = secrets);
    }

    /// Start forwarding
    ///
    /// Does nothing while already starting or running. Otherwise resets the
    /// reconnect counter and establishes the first cycle before returning; on
    /// error the instance is left `Failed`.
    pub async fn start(&self) -> Result<(), ForwardError> {
        let mut run = self.run.lock().await;

        let status = self.status();
        if status.is_active() {
            self.inner
                .log
                .debug(format!("Start ignored, forward is {}", status));
            return Ok(());
        }

        // A supervisor that gave up has already returned
        if let Some(stale) = run.take() {
            stale.cancel.cancel();
            let _ = stale.task.await;
        }

        self.inner.state.send_modify(|s| {
            s.status = ForwardStatus::Starting;
            s.reconnect_attempts = 0;
            s.error_message = None;
            s.stopped_at = None;
        });
        self.inner.log.info(format!(
            "Starting forward to {} port {}",
            self.inner.definition.target, self.inner.definition.remote_port
        ));

        match self.inner.establish(None).await {
            Ok(established) => {
                let cancel = CancellationToken::new();
                let live = match self.inner.bind(established) {
                    Ok(live) => live,
                    Err(e) => {
                        self.inner.fail(&e);
                        return Err(e);
                    }
                };
                // The run lock is held, so the status is still `Starting`
                self.inner.go_live(&live);
                let supervisor = Arc::clone(&self.inner).supervise(live, cancel.clone());
                let task = tokio::spawn(supervisor);
                *run = Some(RunHandle { cancel, task });
                Ok(())
            }
            Err(e) => {
                self.inner.fail(&e);
                Err(e)
            }
        }
    }

    /// Stop forwarding and release the local port
    ///
    /// Does nothing when already stopped or failed. Waits up to the
    /// configured grace period for in-flight work, then aborts it.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;

        if self.status().is_terminal() {
            return;
        }

        self.inner
            .state
            .send_modify(|s| s.status = ForwardStatus::Stopping);
        self.inner.log.info("Stopping forward");

        if let Some(handle) = run.take() {
            handle.cancel.cancel();

            let mut task = handle.task;
            if tokio::time::timeout(self.inner.config.stop_grace, &mut task)
                .await
                .is_err()
            {
                self.inner.log.warn(format!(
                    "Forward did not stop within {:?}, aborting",
                    self.inner.config.stop_grace
                ));
                task.abort();
                let _ = task.await;
            }
        }

        self.inner.state.send_modify(|s| {
            s.status = ForwardStatus::Stopped;
            s.stopped_at = Some(current_time_millis());
            s.bound_port = None;
            s.resolved_pod = None;
            s.secrets.clear();
        });
        self.inner.log.info("Forward stopped");
    }
}

/// Listener plus what it relays to
struct Live {
    listener: TcpListener,
    port: u16,
    endpoint: Arc<RemoteEndpoint>,
}

impl SessionInner {
    fn namespace(&self) -> &str {
        self.definition.namespace_or(self.client.default_namespace())
    }

    /// Secret lookups are bounded by the start timeout; on timeout every
    /// reference comes back without a value
    async fn fetch_secrets(&self) -> Vec<ResolvedSecret> {
        let timeout = self.config.start_timeout;
        let lookup = resolve_secrets(
            self.client.as_ref(),
            self.namespace(),
            &self.definition.secrets,
            &self.log,
        );

        match tokio::time::timeout(timeout, lookup).await {
            Ok(secrets) => secrets,
            Err(_) => {
                self.log.warn(format!(
                    "Secret lookups timed out after {:?}, continuing without values",
                    timeout
                ));
                self.definition
                    .secrets
                    .iter()
                    .map(|reference| ResolvedSecret::new(reference.clone(), None))
                    .collect()
            }
        }
    }

    /// Port assignment, secret resolution, target resolution
    ///
    /// `reuse_port` keeps the port a previous cycle was bound to.
    async fn establish(&self, reuse_port: Option<u16>) -> Result<Established, ForwardError> {
        let requested = reuse_port.unwrap_or(self.definition.local_port);
        let (socket, port) = bridge::reserve_port(requested)?;
        self.state.send_modify(|s| s.bound_port = Some(port));

        let needs_secrets =
            self.state.borrow().secrets.is_empty() && !self.definition.secrets.is_empty();
        if needs_secrets {
            let secrets = self.fetch_secrets().await;
            self.state.send_modify(|s| s.secrets = secrets);
        }

        let timeout = self.config.start_timeout;
        let target = tokio::time::timeout(
            timeout,
            resolve_target(
                self.client.as_ref(),
                self.namespace(),
                &self.definition.target,
                self.definition.remote_port,
                &self.log,
            ),
        )
        .await
        .map_err(|_| ResourceError::Timeout {
            operation: format!("Resolving {}", self.definition.target),
            timeout,
        })??;

        Ok(Established {
            socket,
            port,
            target,
        })
    }

    /// Bind step: start listening
    fn bind(&self, established: Established) -> Result<Live, ForwardError> {
        let Established {
            socket,
            port,
            target,
        } = established;
        let listener = bridge::listen(socket, port)?;

        let endpoint = Arc::new(RemoteEndpoint {
            client: Arc::clone(&self.client),
            namespace: target.namespace,
            pod: target.pod,
            port: target.port,
        });

        Ok(Live {
            listener,
            port,
            endpoint,
        })
    }

    /// Apply `update` only while the status is one of `from`
    ///
    /// Returns `false` when a stop got there first.
    fn transition(
        &self,
        from: &[ForwardStatus],
        update: impl FnOnce(&mut ForwardInstance),
    ) -> bool {
        self.state.send_if_modified(|s| {
            if !from.contains(&s.status) {
                return false;
            }
            update(s);
            true
        })
    }

    /// Publish `Running` for a freshly bound cycle
    fn go_live(&self, live: &Live) -> bool {
        let published = self.transition(&[ForwardStatus::Starting], |s| {
            s.status = ForwardStatus::Running;
            s.bound_port = Some(live.port);
            s.resolved_pod = Some(live.endpoint.pod.clone());
            s.started_at = Some(current_time_millis());
            s.error_message = None;
        });
        if published {
            self.log.info(format!(
                "Forwarding 127.0.0.1:{} -> {}",
                live.port, live.endpoint
            ));
        }
        published
    }

    fn fail(&self, error: &ForwardError) {
        let failed = self.transition(&ACTIVE, |s| {
            s.status = ForwardStatus::Failed;
            s.bound_port = None;
            s.error_message = Some(error.to_string());
        });
        if failed {
            self.log.error(format!("Failed: {}", error));
        } else {
            self.log.debug(format!("Failure after stop ignored: {}", error));
        }
    }

    /// Run loop: serve, and on failure reconnect until cancelled or exhausted
    async fn supervise(self: Arc<Self>, mut live: Live, cancel: CancellationToken) {
        let port = live.port;

        loop {
            let mut reason = match self.serve(live, &cancel).await {
                Some(reason) => reason,
                None => return,
            };

            live = loop {
                let attempts = self.state.borrow().reconnect_attempts;
                let max_attempts = self.config.reconnect.max_attempts;
                if attempts >= max_attempts {
                    self.fail(&ForwardError::Exhausted { attempts, reason });
                    return;
                }

                let retrying = self.transition(&ACTIVE, |s| {
                    s.reconnect_attempts += 1;
                    s.status = ForwardStatus::Starting;
                    s.error_message = Some(reason.clone());
                });
                if !retrying || cancel.is_cancelled() {
                    return;
                }
                self.log.warn(format!(
                    "Reconnecting in {:?} (attempt {}/{}): {}",
                    self.config.reconnect.delay,
                    attempts + 1,
                    max_attempts,
                    reason
                ));

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.config.reconnect.delay) => {}
                }

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = self.establish(Some(port)) => result,
                };

                match result.and_then(|established| self.bind(established)) {
                    Ok(next) => {
                        if cancel.is_cancelled() || !self.go_live(&next) {
                            return;
                        }
                        self.log.info("Reconnected");
                        break next;
                    }
                    Err(e) => {
                        self.log.warn(format!("Reconnect failed: {}", e));
                        reason = e.to_string();
                    }
                }
            };
        }
    }

    /// Serve one cycle; `None` when cancelled, otherwise why it failed
    ///
    /// Connections of the cycle are cancelled and awaited before returning,
    /// and the listener is closed.
    async fn serve(&self, live: Live, cancel: &CancellationToken) -> Option<String> {
        let Live {
            listener, endpoint, ..
        } = live;

        let cycle = cancel.child_token();
        let tracker = TaskTracker::new();
        let settings = RelaySettings {
            dial_timeout: self.config.dial_timeout,
            read_buffer_size: self.config.read_buffer_size,
        };
        let watch = PodWatch {
            client: Arc::clone(&self.client),
            namespace: endpoint.namespace.clone(),
            pod: endpoint.pod.clone(),
            interval: self.config.health_interval,
            lookup_timeout: self.config.start_timeout,
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = bridge::accept_loop(
                &listener,
                Arc::clone(&endpoint),
                settings,
                Arc::clone(&self.log),
                cycle.clone(),
                &tracker,
            ) => match result {
                Ok(()) => None,
                Err(e) => Some(format!("Local listener failed: {}", e)),
            },
            reason = watch.run(&self.log) => Some(reason),
        };

        cycle.cancel();
        drop(listener);
        tracker.close();
        tracker.wait().await;

        outcome
    }
}

impl std::fmt::Debug for ForwardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardSession")
            .field("id", &self.id())
            .field("name", &self.inner.definition.name)
            .field("status", &self.status())
            .finish()
    }
}
