//! In-process cluster used by the engine integration tests
//!
//! Port-forward dials are served by a spawned fake remote that speaks the
//! channel protocol over `futures` mpsc channels: it sends the two handshake
//! frames, then either replays a script or echoes every data frame back.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use kf_core::cluster::{
    ClusterConnectionInfo, DataResource, PodInfo, PodPhase, ServiceInfo, ServicePort, TargetPort,
};
use kf_core::config::{ForwardConfig, ReconnectPolicy};
use kf_core::error::{ConnectionError, ResourceError};
use kf_core::traits::{ClusterClient, ClusterClientFactory, PortForwardStream};
use kf_core::ForwardInstance;
use kf_core::ForwardStatus;

/// What the fake remote sends after a dial
#[derive(Clone, Default)]
pub enum RemoteScript {
    /// Handshakes, then echo every data frame
    #[default]
    Echo,
    /// Handshakes, then these frames
    AfterHandshake(Vec<Bytes>),
    /// Exactly these frames, no automatic handshakes
    Raw(Vec<Bytes>),
}

#[derive(Default)]
struct MockState {
    pods: HashMap<(String, String), PodInfo>,
    services: HashMap<(String, String), ServiceInfo>,
    secrets: HashMap<String, Vec<DataResource>>,
    config_maps: HashMap<String, Vec<DataResource>>,
    script: RemoteScript,
    refuse_dials: bool,
    ping_fails: bool,
    hang_secret_lists: bool,
    hang_pod_lookups: bool,
}

/// Fake control plane
#[derive(Default)]
pub struct MockCluster {
    state: Mutex<MockState>,
    /// Every frame received from the engine, across all dials
    upstream: Arc<Mutex<Vec<Bytes>>>,
    pub dials: AtomicUsize,
    pub secret_lists: AtomicUsize,
    pub config_map_lists: AtomicUsize,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_pod(&self, namespace: &str, name: &str, labels: &[(&str, &str)]) {
        self.add_pod_in_phase(namespace, name, labels, PodPhase::Running);
    }

    pub fn add_pod_in_phase(
        &self,
        namespace: &str,
        name: &str,
        labels: &[(&str, &str)],
        phase: PodPhase,
    ) {
        let pod = PodInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            labels: to_map(labels),
            phase,
        };
        self.state
            .lock()
            .unwrap()
            .pods
            .insert((namespace.to_string(), name.to_string()), pod);
    }

    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: PodPhase) {
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state
            .pods
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            pod.phase = phase;
        }
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn add_service(
        &self,
        namespace: &str,
        name: &str,
        selector: &[(&str, &str)],
        port: u16,
        target_port: Option<TargetPort>,
    ) {
        let service = ServiceInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            selector: to_map(selector),
            ports: vec![ServicePort {
                name: Some("main".to_string()),
                port,
                target_port,
            }],
        };
        self.state
            .lock()
            .unwrap()
            .services
            .insert((namespace.to_string(), name.to_string()), service);
    }

    pub fn add_secret(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        self.state
            .lock()
            .unwrap()
            .secrets
            .entry(namespace.to_string())
            .or_default()
            .push(DataResource {
                name: name.to_string(),
                namespace: namespace.to_string(),
                data: to_map(data),
            });
    }

    pub fn add_config_map(&self, namespace: &str, name: &str, data: &[(&str, &str)]) {
        self.state
            .lock()
            .unwrap()
            .config_maps
            .entry(namespace.to_string())
            .or_default()
            .push(DataResource {
                name: name.to_string(),
                namespace: namespace.to_string(),
                data: to_map(data),
            });
    }

    pub fn set_script(&self, script: RemoteScript) {
        self.state.lock().unwrap().script = script;
    }

    pub fn set_refuse_dials(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_dials = refuse;
    }

    pub fn set_ping_fails(&self, fails: bool) {
        self.state.lock().unwrap().ping_fails = fails;
    }

    /// Secret and config map listings never answer
    pub fn set_hang_secret_lists(&self, hang: bool) {
        self.state.lock().unwrap().hang_secret_lists = hang;
    }

    /// Single pod lookups never answer
    pub fn set_hang_pod_lookups(&self, hang: bool) {
        self.state.lock().unwrap().hang_pod_lookups = hang;
    }

    async fn stall_if(&self, hang: impl Fn(&MockState) -> bool) {
        let stalled = {
            let state = self.state.lock().unwrap();
            hang(&*state)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
    }

    /// Frames received from the engine so far
    pub fn upstream_frames(&self) -> Vec<Bytes> {
        self.upstream.lock().unwrap().clone()
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn handshake(channel: u8, port: u16) -> Bytes {
    let p = port.to_le_bytes();
    Bytes::from(vec![channel, p[0], p[1]])
}

#[async_trait]
impl ClusterClient for MockCluster {
    fn default_namespace(&self) -> &str {
        "default"
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        if self.state.lock().unwrap().ping_fails {
            return Err(ConnectionError::Unreachable("mock cluster is down".into()));
        }
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, ResourceError> {
        self.stall_if(|s| s.hang_pod_lookups).await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>, ResourceError> {
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();

        let state = self.state.lock().unwrap();
        let mut pods: Vec<PodInfo> = state
            .pods
            .values()
            .filter(|pod| pod.namespace == namespace)
            .filter(|pod| {
                wanted
                    .iter()
                    .all(|(k, v)| pod.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .cloned()
            .collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pods)
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceInfo>, ResourceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError> {
        self.secret_lists.fetch_add(1, Ordering::SeqCst);
        self.stall_if(|s| s.hang_secret_lists).await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .secrets
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError> {
        self.config_map_lists.fetch_add(1, Ordering::SeqCst);
        self.stall_if(|s| s.hang_secret_lists).await;
        Ok(self
            .state
            .lock()
            .unwrap()
            .config_maps
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<PortForwardStream, ConnectionError> {
        let script = {
            let state = self.state.lock().unwrap();
            if state.refuse_dials {
                return Err(ConnectionError::ConnectionRefused("dial refused".into()));
            }
            if !state
                .pods
                .contains_key(&(namespace.to_string(), pod.to_string()))
            {
                return Err(ConnectionError::ConnectionRefused(format!(
                    "pod {}/{} not found",
                    namespace, pod
                )));
            }
            state.script.clone()
        };
        self.dials.fetch_add(1, Ordering::SeqCst);

        let (to_remote, mut from_local) = mpsc::unbounded::<Bytes>();
        let (mut to_local, from_remote) = mpsc::unbounded::<Bytes>();
        let upstream = Arc::clone(&self.upstream);

        tokio::spawn(async move {
            let (greeting, echo) = match script {
                RemoteScript::Echo => (vec![handshake(0, port), handshake(1, port)], true),
                RemoteScript::AfterHandshake(frames) => {
                    let mut all = vec![handshake(0, port), handshake(1, port)];
                    all.extend(frames);
                    (all, false)
                }
                RemoteScript::Raw(frames) => (frames, false),
            };

            for frame in greeting {
                if to_local.send(frame).await.is_err() {
                    return;
                }
            }

            while let Some(frame) = from_local.next().await {
                upstream.lock().unwrap().push(frame.clone());
                if echo && to_local.send(frame).await.is_err() {
                    return;
                }
            }
        });

        let sink = to_remote.sink_map_err(|_| ConnectionError::Closed);
        let stream = from_remote.map(Ok::<Bytes, ConnectionError>);
        Ok(PortForwardStream::new(Box::pin(sink), Box::pin(stream)))
    }
}

/// Factory handing out one shared mock cluster
pub struct MockFactory {
    pub cluster: Arc<MockCluster>,
    pub connects: AtomicUsize,
}

impl MockFactory {
    pub fn new(cluster: Arc<MockCluster>) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClusterClientFactory for MockFactory {
    async fn connect(
        &self,
        _info: &ClusterConnectionInfo,
    ) -> Result<Arc<dyn ClusterClient>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.cluster) as Arc<dyn ClusterClient>)
    }
}

/// Engine settings with short timers so failure paths run quickly
pub fn fast_config() -> ForwardConfig {
    ForwardConfig {
        reconnect: ReconnectPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(20),
        },
        stop_grace: Duration::from_secs(2),
        dial_timeout: Duration::from_secs(2),
        start_timeout: Duration::from_secs(2),
        health_interval: Duration::from_millis(30),
        log_capacity: 200,
        read_buffer_size: 16 * 1024,
    }
}

pub fn cluster_info() -> ClusterConnectionInfo {
    ClusterConnectionInfo::new("mock", "https://127.0.0.1:6443")
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Wait until a snapshot satisfies the predicate, or panic after 5 seconds
pub async fn wait_until(
    rx: &mut tokio::sync::watch::Receiver<ForwardInstance>,
    what: &str,
    predicate: impl FnMut(&ForwardInstance) -> bool,
) -> ForwardInstance {
    let reached = match tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate)).await
    {
        Ok(Ok(instance)) => Some(instance.clone()),
        Ok(Err(_)) => panic!("session dropped while waiting for {}", what),
        Err(_) => None,
    };

    match reached {
        Some(instance) => instance,
        None => panic!("timed out waiting for {}: {:?}", what, *rx.borrow()),
    }
}

pub async fn wait_for_status(
    rx: &mut tokio::sync::watch::Receiver<ForwardInstance>,
    status: ForwardStatus,
) -> ForwardInstance {
    wait_until(rx, &status.to_string(), |s| s.status == status).await
}
