//! Client factory

use std::sync::Arc;

use async_trait::async_trait;

use kf_core::error::ConnectionError;
use kf_core::traits::{ClusterClient, ClusterClientFactory};
use kf_core::ClusterConnectionInfo;

use crate::client::KubeClient;

/// Builds a [`KubeClient`] per cluster connection
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeClientFactory;

impl KubeClientFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterClientFactory for KubeClientFactory {
    async fn connect(
        &self,
        info: &ClusterConnectionInfo,
    ) -> Result<Arc<dyn ClusterClient>, ConnectionError> {
        tracing::debug!("Creating client for cluster '{}' at {}", info.name, info.server);
        let client = KubeClient::new(info)?;
        Ok(Arc::new(client))
    }
}
