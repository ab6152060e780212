//! Control-plane client traits
//!
//! The engine never talks HTTP itself. A `ClusterClient` is obtained per
//! cluster connection from a `ClusterClientFactory` and shared by every
//! forward started against that connection.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};

use crate::cluster::{ClusterConnectionInfo, DataResource, PodInfo, ServiceInfo};
use crate::error::{ConnectionError, ResourceError};

/// Outbound half of a port-forward stream; one item is one binary message
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = ConnectionError> + Send>>;

/// Inbound half of a port-forward stream; ends when the remote closes
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, ConnectionError>> + Send>>;

/// A freshly dialed multiplexed stream to one pod port
///
/// Items are whole channel frames (channel byte included); framing is the
/// caller's job.
pub struct PortForwardStream {
    /// Messages to the remote endpoint
    pub sink: FrameSink,
    /// Messages from the remote endpoint
    pub stream: FrameStream,
}

impl PortForwardStream {
    /// Bundle the two halves
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Abstraction over a control-plane client scoped to one cluster
///
/// The read methods double as the resource repository used for service and
/// secret resolution. `Ok(None)` means the resource does not exist.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Namespace used when a forward does not name one
    fn default_namespace(&self) -> &str;

    /// Lightweight connectivity check
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// Read a pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, ResourceError>;

    /// List pods matching a label selector (`k=v,k2=v2`)
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>, ResourceError>;

    /// Read a service
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceInfo>, ResourceError>;

    /// List a namespace's secrets with decoded values
    async fn list_secrets(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError>;

    /// List a namespace's config maps
    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError>;

    /// Open a multiplexed byte stream to a pod port
    async fn open_port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<PortForwardStream, ConnectionError>;
}

/// Creates clients scoped to a cluster connection
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    /// Build a client for the given connection
    async fn connect(
        &self,
        info: &ClusterConnectionInfo,
    ) -> Result<Arc<dyn ClusterClient>, ConnectionError>;
}
