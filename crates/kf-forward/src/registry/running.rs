//! Registry entry for a started template

use std::sync::Arc;

use kf_core::traits::ClusterClient;
use kf_core::{ClusterConnectionInfo, ForwardInstance, Template, TemplateId};

use crate::session::ForwardSession;

/// A template whose forwards were all started together
///
/// Holds the cluster client for as long as the group runs; individual
/// restarts reuse it.
pub struct RunningTemplate {
    /// Template identifier
    pub template_id: TemplateId,
    /// Template as it was when started
    pub template: Template,
    /// Cluster the forwards run against
    pub cluster: ClusterConnectionInfo,
    /// Unix millis when the group started
    pub started_at: u64,
    sessions: Vec<Arc<ForwardSession>>,
    client: Arc<dyn ClusterClient>,
}

impl RunningTemplate {
    pub(crate) fn new(
        template: Template,
        cluster: ClusterConnectionInfo,
        sessions: Vec<Arc<ForwardSession>>,
        client: Arc<dyn ClusterClient>,
        started_at: u64,
    ) -> Self {
        Self {
            template_id: template.id,
            template,
            cluster,
            started_at,
            sessions,
            client,
        }
    }

    /// Sessions in template order
    pub fn sessions(&self) -> &[Arc<ForwardSession>] {
        &self.sessions
    }

    /// Snapshots of every instance, in template order
    pub fn instances(&self) -> Vec<ForwardInstance> {
        self.sessions.iter().map(|s| s.snapshot()).collect()
    }

    /// Client scoped to this group's cluster
    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.client
    }
}

impl std::fmt::Debug for RunningTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningTemplate")
            .field("template_id", &self.template_id)
            .field("name", &self.template.name)
            .field("cluster", &self.cluster.name)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
