//! Pod and service target resolution

use std::collections::BTreeMap;

use kf_core::cluster::{ServiceInfo, TargetPort};
use kf_core::traits::ClusterClient;
use kf_core::{ForwardTarget, ResourceError};

use crate::log::ForwardLog;

/// Concrete pod and container port a forward dials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub namespace: String,
    pub pod: String,
    pub port: u16,
}

/// Resolve a pod or service target to a running pod
///
/// Pods must exist and be running. Services are mapped through their port
/// table and selector to the first running backing pod.
pub async fn resolve_target(
    client: &dyn ClusterClient,
    namespace: &str,
    target: &ForwardTarget,
    remote_port: u16,
    log: &ForwardLog,
) -> Result<ResolvedTarget, ResourceError> {
    match target {
        ForwardTarget::Pod(name) => {
            let pod = client.get_pod(namespace, name).await?.ok_or_else(|| {
                ResourceError::PodNotFound {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                }
            })?;

            if !pod.is_running() {
                return Err(ResourceError::PodNotRunning {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                    phase: pod.phase.to_string(),
                });
            }

            Ok(ResolvedTarget {
                namespace: namespace.to_string(),
                pod: pod.name,
                port: remote_port,
            })
        }
        ForwardTarget::Service(name) => {
            let service = client.get_service(namespace, name).await?.ok_or_else(|| {
                ResourceError::ServiceNotFound {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                }
            })?;

            let port = container_port(&service, remote_port, log);

            if service.selector.is_empty() {
                return Err(ResourceError::NoSelector {
                    namespace: namespace.to_string(),
                    name: name.clone(),
                });
            }

            let selector = selector_string(&service.selector);
            let pods = client.list_pods(namespace, &selector).await?;
            if pods.is_empty() {
                return Err(ResourceError::NoMatchingPods {
                    namespace: namespace.to_string(),
                    selector,
                });
            }

            let pod = pods
                .into_iter()
                .find(|pod| pod.is_running())
                .ok_or_else(|| ResourceError::NoRunningPod {
                    namespace: namespace.to_string(),
                    selector: selector.clone(),
                })?;

            log.debug(format!(
                "Resolved svc/{} to pod {} port {}",
                name, pod.name, port
            ));

            Ok(ResolvedTarget {
                namespace: namespace.to_string(),
                pod: pod.name,
                port,
            })
        }
    }
}

/// Render a selector map as a label selector (`k=v,k2=v2`, sorted by key)
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Container port behind a service port
///
/// A numeric `targetPort` wins. A named one cannot be resolved without the
/// pod spec, so the service port is used instead.
fn container_port(service: &ServiceInfo, service_port: u16, log: &ForwardLog) -> u16 {
    let entry = service.ports.iter().find(|p| p.port == service_port);

    match entry.and_then(|p| p.target_port.as_ref()) {
        Some(TargetPort::Number(port)) => *port,
        Some(TargetPort::Name(name)) => {
            log.warn(format!(
                "Service {} maps port {} to named port '{}'; using {} instead",
                service.name, service_port, name, service_port
            ));
            service_port
        }
        None => service_port,
    }
}
