//! Wire shapes of the Kubernetes API objects kforward reads
//!
//! Only the fields the engine needs are modelled; everything else in the
//! JSON is ignored.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;

use kf_core::cluster::{DataResource, PodInfo, PodPhase, ServiceInfo, ServicePort, TargetPort};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct List<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PodStatus {
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Service {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServiceSpec {
    #[serde(default)]
    pub selector: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub ports: Vec<ServicePortSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServicePortSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub port: u16,
    #[serde(default)]
    pub target_port: Option<IntOrString>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum IntOrString {
    Int(u16),
    String(String),
}

/// Secret or config map; secret values arrive base64-encoded
#[derive(Debug, Deserialize)]
pub(crate) struct DataObject {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: Option<BTreeMap<String, String>>,
}

/// Error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct Status {
    #[serde(default)]
    pub message: Option<String>,
}

impl From<Pod> for PodInfo {
    fn from(pod: Pod) -> Self {
        let phase = pod
            .status
            .phase
            .as_deref()
            .map(PodPhase::parse)
            .unwrap_or(PodPhase::Unknown);

        PodInfo {
            name: pod.metadata.name,
            namespace: pod.metadata.namespace,
            labels: pod.metadata.labels,
            phase,
        }
    }
}

impl From<Service> for ServiceInfo {
    fn from(service: Service) -> Self {
        let ports = service
            .spec
            .ports
            .into_iter()
            .map(|p| ServicePort {
                name: p.name,
                port: p.port,
                target_port: p.target_port.map(|t| match t {
                    IntOrString::Int(port) => TargetPort::Number(port),
                    // Numeric strings are valid targetPort values too
                    IntOrString::String(s) => match s.parse() {
                        Ok(port) => TargetPort::Number(port),
                        Err(_) => TargetPort::Name(s),
                    },
                }),
            })
            .collect();

        ServiceInfo {
            name: service.metadata.name,
            namespace: service.metadata.namespace,
            selector: service.spec.selector.unwrap_or_default(),
            ports,
        }
    }
}

impl DataObject {
    /// Config map values as-is
    pub fn into_plain(self) -> DataResource {
        DataResource {
            name: self.metadata.name,
            namespace: self.metadata.namespace,
            data: self.data.unwrap_or_default(),
        }
    }

    /// Secret values base64-decoded; undecodable or non-UTF-8 entries are dropped
    pub fn into_decoded(self) -> DataResource {
        let name = self.metadata.name;
        let data = self
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, encoded)| {
                let decoded = STANDARD
                    .decode(encoded.as_bytes())
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok());
                if decoded.is_none() {
                    tracing::debug!("Skipping undecodable key '{}' of secret {}", key, name);
                }
                decoded.map(|value| (key, value))
            })
            .collect();

        DataResource {
            name,
            namespace: self.metadata.namespace,
            data,
        }
    }
}
