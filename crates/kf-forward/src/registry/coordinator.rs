//! Cross-map atomicity for the registry
//!
//! Templates and instances live in two concurrent maps. Writers that touch
//! both take the coordinator's write lock, so a reader holding the read lock
//! never sees an instance whose template is gone, or a template whose
//! instances are not yet visible.
//!
//! Registration inserts the template before its instances; removal deletes
//! instances first. Single-key lookups can therefore skip the lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, RwLockReadGuard};

use kf_core::{InstanceId, TemplateId};

use super::running::RunningTemplate;
use crate::session::ForwardSession;

/// Instance map entry
pub(crate) struct InstanceEntry {
    pub template_id: TemplateId,
    pub session: Arc<ForwardSession>,
}

pub(crate) struct RegistryCoordinator {
    /// Unit lock used purely for coordination
    inner: RwLock<()>,
    pub templates: DashMap<TemplateId, Arc<RunningTemplate>>,
    pub instances: DashMap<InstanceId, InstanceEntry>,
}

impl RegistryCoordinator {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(()),
            templates: DashMap::new(),
            instances: DashMap::new(),
        }
    }

    /// Acquire a read lock for a consistent view across both maps
    pub async fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.inner.read().await
    }

    /// Register a running template and all of its instances
    pub async fn atomic_register(&self, running: Arc<RunningTemplate>) {
        let _lock = self.inner.write().await;

        let template_id = running.template_id;
        self.templates.insert(template_id, Arc::clone(&running));
        for session in running.sessions() {
            self.instances.insert(
                session.id(),
                InstanceEntry {
                    template_id,
                    session: Arc::clone(session),
                },
            );
        }
    }

    /// Remove a template and all of its instances, returning the template
    pub async fn atomic_unregister(&self, template_id: TemplateId) -> Option<Arc<RunningTemplate>> {
        let _lock = self.inner.write().await;

        self.instances
            .retain(|_, entry| entry.template_id != template_id);
        self.templates
            .remove(&template_id)
            .map(|(_, running)| running)
    }
}
