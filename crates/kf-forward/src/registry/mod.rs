//! Session registry and template orchestration
//!
//! The registry is the only place that knows about templates. Starting a
//! template is all-or-nothing: if any forward fails to start, every session
//! started in the same call is stopped again and nothing is registered.

mod coordinator;
mod running;

pub use running::RunningTemplate;

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{watch, Mutex};

use kf_core::config::ForwardConfig;
use kf_core::time::current_time_millis;
use kf_core::traits::{ClusterClient, ClusterClientFactory};
use kf_core::{
    ClusterConnectionInfo, ForwardError, ForwardInstance, InstanceId, ResourceError, Template,
    TemplateId,
};

use crate::session::ForwardSession;
use coordinator::RegistryCoordinator;

/// Owns every running template and its forward sessions
pub struct ForwardRegistry {
    factory: Arc<dyn ClusterClientFactory>,
    config: ForwardConfig,
    coordinator: RegistryCoordinator,
    /// Serializes start/stop per template id
    template_locks: DashMap<TemplateId, Arc<Mutex<()>>>,
}

impl ForwardRegistry {
    /// Create an empty registry
    pub fn new(factory: Arc<dyn ClusterClientFactory>, config: ForwardConfig) -> Self {
        Self {
            factory,
            config,
            coordinator: RegistryCoordinator::new(),
            template_locks: DashMap::new(),
        }
    }

    /// Engine configuration sessions are created with
    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    fn template_lock(&self, id: TemplateId) -> Arc<Mutex<()>> {
        Arc::clone(self.template_locks.entry(id).or_default().value())
    }

    /// Forget a template's lock once nobody but the caller holds it
    fn release_template_lock(&self, id: TemplateId) {
        // The map's reference plus the caller's
        self.template_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) <= 2);
    }

    /// Start every forward of a template against a cluster
    ///
    /// A template that is already running is fully stopped first. On failure
    /// the sessions started by this call are stopped, the cluster client is
    /// released and the first failing forward's error is returned.
    pub async fn start_template(
        &self,
        template: Template,
        cluster: ClusterConnectionInfo,
    ) -> Result<Arc<RunningTemplate>, ForwardError> {
        let lock = self.template_lock(template.id);
        let _guard = lock.lock().await;

        if self.stop_template_locked(template.id).await {
            tracing::info!("Restarting template '{}'", template.name);
        }

        tracing::info!(
            "Starting template '{}' ({} forwards) on cluster '{}'",
            template.name,
            template.forwards.len(),
            cluster.name
        );

        let client = match self.connect(&cluster).await {
            Ok(client) => client,
            Err(e) => {
                self.release_template_lock(template.id);
                return Err(e);
            }
        };

        let sessions: Vec<Arc<ForwardSession>> = template
            .forwards
            .iter()
            .map(|definition| {
                Arc::new(ForwardSession::new(
                    definition.clone(),
                    Arc::clone(&client),
                    self.config.clone(),
                ))
            })
            .collect();

        join_all(sessions.iter().map(|session| session.prepare_secrets())).await;

        let results = join_all(sessions.iter().map(|session| session.start())).await;

        let failure = sessions
            .iter()
            .zip(results)
            .find_map(|(session, result)| result.err().map(|e| (session, e)));

        if let Some((failed, error)) = failure {
            let forward = failed.definition().name.clone();
            tracing::warn!(
                "Template '{}' failed to start, rolling back: forward '{}': {}",
                template.name,
                forward,
                error
            );

            join_all(sessions.iter().map(|session| session.stop())).await;
            let rolled_back = sessions.iter().map(|session| session.snapshot()).collect();
            drop(sessions);
            drop(client);
            self.release_template_lock(template.id);

            return Err(ForwardError::TemplateStart {
                forward,
                source: Box::new(error),
                rolled_back,
            });
        }

        let running = Arc::new(RunningTemplate::new(
            template,
            cluster,
            sessions,
            client,
            current_time_millis(),
        ));
        self.coordinator
            .atomic_register(Arc::clone(&running))
            .await;

        tracing::info!("Template '{}' is running", running.template.name);
        Ok(running)
    }

    /// Client for a cluster that answered a connectivity check
    async fn connect(
        &self,
        cluster: &ClusterConnectionInfo,
    ) -> Result<Arc<dyn ClusterClient>, ForwardError> {
        let client = self.factory.connect(cluster).await?;
        let timeout = self.config.start_timeout;
        tokio::time::timeout(timeout, client.ping())
            .await
            .map_err(|_| ResourceError::Timeout {
                operation: format!("Connectivity check for cluster '{}'", cluster.name),
                timeout,
            })??;
        Ok(client)
    }

    /// Stop a running template
    ///
    /// Returns `false` if it was not running.
    pub async fn stop_template(&self, id: TemplateId) -> bool {
        let lock = self.template_lock(id);
        let _guard = lock.lock().await;
        let stopped = self.stop_template_locked(id).await;
        self.release_template_lock(id);
        stopped
    }

    async fn stop_template_locked(&self, id: TemplateId) -> bool {
        let Some(running) = self.coordinator.atomic_unregister(id).await else {
            return false;
        };

        tracing::info!("Stopping template '{}'", running.template.name);
        join_all(running.sessions().iter().map(|session| session.stop())).await;
        tracing::info!("Template '{}' stopped", running.template.name);

        true
    }

    fn session(&self, id: InstanceId) -> Result<Arc<ForwardSession>, ForwardError> {
        self.coordinator
            .instances
            .get(&id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(ForwardError::InstanceNotFound(id))
    }

    /// Run `op` on a registered instance under its template's lock
    ///
    /// The instance is looked up again once the lock is held, so an
    /// operation never revives a session its template already stopped.
    async fn with_instance<F, Fut, T>(&self, id: InstanceId, op: F) -> Result<T, ForwardError>
    where
        F: FnOnce(Arc<ForwardSession>) -> Fut,
        Fut: Future<Output = T>,
    {
        let template_id = self
            .template_of(id)
            .ok_or(ForwardError::InstanceNotFound(id))?;
        let lock = self.template_lock(template_id);
        let _guard = lock.lock().await;

        match self.session(id) {
            Ok(session) => Ok(op(session).await),
            Err(e) => {
                self.release_template_lock(template_id);
                Err(e)
            }
        }
    }

    /// Start one forward of a running template
    pub async fn start_forward(&self, id: InstanceId) -> Result<(), ForwardError> {
        self.with_instance(id, |session| async move { session.start().await })
            .await?
    }

    /// Stop one forward; it stays registered until its template stops
    pub async fn stop_forward(&self, id: InstanceId) -> Result<(), ForwardError> {
        self.with_instance(id, |session| async move { session.stop().await })
            .await
    }

    /// Stop and start one forward
    ///
    /// Returns `false` if the instance is unknown or fails to start again.
    pub async fn restart_forward(&self, id: InstanceId) -> bool {
        self.with_instance(id, |session| async move {
            session.stop().await;
            session.start().await.is_ok()
        })
        .await
        .unwrap_or(false)
    }

    /// Look up a running template
    pub fn get_running_template(&self, id: TemplateId) -> Option<Arc<RunningTemplate>> {
        self.coordinator
            .templates
            .get(&id)
            .map(|r| Arc::clone(r.value()))
    }

    /// Point-in-time list of running templates
    pub async fn list_running_templates(&self) -> Vec<Arc<RunningTemplate>> {
        let _lock = self.coordinator.read().await;
        self.coordinator
            .templates
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Template an instance belongs to
    pub fn template_of(&self, id: InstanceId) -> Option<TemplateId> {
        self.coordinator
            .instances
            .get(&id)
            .map(|entry| entry.template_id)
    }

    /// Snapshot of one instance
    pub fn get_instance(&self, id: InstanceId) -> Option<ForwardInstance> {
        self.session(id).ok().map(|session| session.snapshot())
    }

    /// Last `max_lines` log lines of one instance, oldest first
    pub fn get_logs(&self, id: InstanceId, max_lines: usize) -> Option<Vec<String>> {
        self.session(id)
            .ok()
            .map(|session| session.log().tail(max_lines))
    }

    /// Follow an instance's snapshots as they change
    pub fn subscribe(&self, id: InstanceId) -> Option<watch::Receiver<ForwardInstance>> {
        self.session(id).ok().map(|session| session.subscribe())
    }

    /// Stop every running template
    pub async fn shutdown(&self) {
        let ids: Vec<TemplateId> = self
            .coordinator
            .templates
            .iter()
            .map(|r| *r.key())
            .collect();

        if !ids.is_empty() {
            tracing::info!("Shutting down {} running templates", ids.len());
        }
        join_all(ids.into_iter().map(|id| self.stop_template(id))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kf_core::error::ConnectionError;

    struct OfflineFactory;

    #[async_trait]
    impl ClusterClientFactory for OfflineFactory {
        async fn connect(
            &self,
            _: &ClusterConnectionInfo,
        ) -> Result<Arc<dyn ClusterClient>, ConnectionError> {
            Err(ConnectionError::Unreachable("offline".to_string()))
        }
    }

    fn registry() -> ForwardRegistry {
        ForwardRegistry::new(Arc::new(OfflineFactory), ForwardConfig::default())
    }

    #[tokio::test]
    async fn test_locks_are_released_after_use() {
        let registry = registry();
        let template = Template::new("offline");
        let id = template.id;

        let cluster = ClusterConnectionInfo::new("offline", "https://127.0.0.1:6443");
        assert!(registry.start_template(template, cluster).await.is_err());
        assert!(registry.template_locks.is_empty());

        assert!(!registry.stop_template(id).await);
        assert!(registry.template_locks.is_empty());
    }

    #[test]
    fn test_contended_lock_is_kept() {
        let registry = registry();
        let id = TemplateId::new();

        let _mine = registry.template_lock(id);
        let waiter = registry.template_lock(id);
        registry.release_template_lock(id);
        assert!(registry.template_locks.contains_key(&id));

        drop(waiter);
        registry.release_template_lock(id);
        assert!(!registry.template_locks.contains_key(&id));
    }
}
