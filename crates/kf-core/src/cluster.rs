//! Cluster connection descriptors and resource views
//!
//! These are the shapes the engine consumes from a control-plane client. They
//! carry only what forwarding needs, not full API objects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace used when a connection descriptor does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// How to authenticate against the control plane
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Anonymous access
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    BearerToken { token: String },
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// Mutual TLS with a PEM client certificate and key
    ClientCertificate {
        certificate_pem: String,
        key_pem: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::BearerToken { .. } => write!(f, "BearerToken(<redacted>)"),
            Credentials::Basic { username, .. } => write!(f, "Basic({}, <redacted>)", username),
            Credentials::ClientCertificate { .. } => write!(f, "ClientCertificate(<redacted>)"),
        }
    }
}

/// Opaque description of how to reach one cluster
///
/// Produced by configuration discovery outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConnectionInfo {
    /// Display name (context name)
    pub name: String,
    /// API server URL, e.g. `https://10.0.0.1:6443`
    pub server: String,
    /// Namespace used when a forward does not name one
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    /// Credentials
    #[serde(default)]
    pub credentials: Credentials,
    /// PEM bundle of trusted CAs; `None` uses the public web roots
    #[serde(default)]
    pub certificate_authority: Option<String>,
    /// Skip server certificate verification (INSECURE)
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ClusterConnectionInfo {
    /// Create a descriptor for a server with no credentials
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            default_namespace: default_namespace(),
            credentials: Credentials::None,
            certificate_authority: None,
            insecure_skip_tls_verify: false,
        }
    }
}

/// Pod lifecycle phase as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    /// Parse the API's phase string; anything unrecognised is `Unknown`
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// The parts of a pod the engine looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub phase: PodPhase,
}

impl PodInfo {
    /// Whether the pod can accept port-forward dials
    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }
}

/// Service `targetPort`: a container port number or a named container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    Number(u16),
    Name(String),
}

/// One port entry of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: u16,
    pub target_port: Option<TargetPort>,
}

/// The parts of a service the engine looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

/// A secret or config map's decoded key/value data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataResource {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts() {
        let creds = Credentials::BearerToken {
            token: "super-secret".to_string(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("super-secret"));

        let basic = Credentials::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", basic);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_connection_info_default_namespace() {
        let json = r#"{"name":"kind","server":"https://127.0.0.1:6443"}"#;
        let info: ClusterConnectionInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.default_namespace, "default");
        assert_eq!(info.credentials, Credentials::None);
        assert!(!info.insecure_skip_tls_verify);
    }

    #[test]
    fn test_pod_phase_parse() {
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("CrashLoopBackOff"), PodPhase::Unknown);
    }
}
