//! Templates and forward definitions
//!
//! These are user-authored and immutable once created; edits produce new
//! values. The engine only reads them at start time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ForwardId, TemplateId};

/// Placeholder shown instead of sensitive values
pub const MASK: &str = "********";

/// What a forward points at
///
/// Dispatched once when a session starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ForwardTarget {
    /// A pod addressed by name
    Pod(String),
    /// A service resolved to one of its running pods
    Service(String),
}

impl ForwardTarget {
    /// Name of the targeted resource
    pub fn name(&self) -> &str {
        match self {
            ForwardTarget::Pod(name) | ForwardTarget::Service(name) => name,
        }
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardTarget::Pod(name) => write!(f, "pod/{}", name),
            ForwardTarget::Service(name) => write!(f, "svc/{}", name),
        }
    }
}

/// Static description of one tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardDefinition {
    /// Definition identifier
    #[serde(default)]
    pub id: ForwardId,
    /// Display name
    pub name: String,
    /// Pod or service to forward to
    pub target: ForwardTarget,
    /// Namespace; `None` uses the cluster's default namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// Port on the target (the service port for service targets)
    pub remote_port: u16,
    /// Requested local port; 0 lets the OS choose
    #[serde(default)]
    pub local_port: u16,
    /// Informational protocol hint such as "http" or "postgres"
    #[serde(default)]
    pub protocol: Option<String>,
    /// Secret and config values to show alongside the forward
    #[serde(default)]
    pub secrets: Vec<SecretReference>,
}

impl ForwardDefinition {
    /// Create a definition with an auto-assigned local port in the default namespace
    pub fn new(name: impl Into<String>, target: ForwardTarget, remote_port: u16) -> Self {
        Self {
            id: ForwardId::new(),
            name: name.into(),
            target,
            namespace: None,
            remote_port,
            local_port: 0,
            protocol: None,
            secrets: Vec::new(),
        }
    }

    /// Builder-style namespace override
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builder-style fixed local port
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Builder-style secret reference
    pub fn with_secret(mut self, reference: SecretReference) -> Self {
        self.secrets.push(reference);
        self
    }

    /// Namespace to use, falling back to the given default
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default)
    }
}

/// Source of a referenced value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    /// A Secret; values are sensitive
    Secret,
    /// A ConfigMap; values are shown in clear
    ConfigMap,
}

impl SecretKind {
    /// Whether values of this kind are masked by default
    pub fn is_sensitive(&self) -> bool {
        matches!(self, SecretKind::Secret)
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretKind::Secret => write!(f, "secret"),
            SecretKind::ConfigMap => write!(f, "configmap"),
        }
    }
}

/// Reference to one key of a secret or config map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    /// Secret or config map
    pub kind: SecretKind,
    /// Resource name
    pub resource: String,
    /// Namespace; `None` uses the forward's namespace
    #[serde(default)]
    pub namespace: Option<String>,
    /// Key inside the resource
    pub key: String,
    /// Label to show instead of the key
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SecretReference {
    /// Create a reference in the forward's namespace
    pub fn new(kind: SecretKind, resource: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind,
            resource: resource.into(),
            namespace: None,
            key: key.into(),
            display_name: None,
        }
    }

    /// Label for display
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key)
    }
}

/// A reference paired with its value at resolution time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSecret {
    /// What was resolved
    pub reference: SecretReference,
    /// Fetched value; `None` when the resource or key is missing
    pub value: Option<String>,
    /// Whether the value should be masked for display
    pub sensitive: bool,
}

impl ResolvedSecret {
    /// Pair a reference with a value, deriving sensitivity from its kind
    pub fn new(reference: SecretReference, value: Option<String>) -> Self {
        let sensitive = reference.kind.is_sensitive();
        Self {
            reference,
            value,
            sensitive,
        }
    }

    /// Value for display: masked when sensitive, empty when missing
    pub fn display_value(&self) -> String {
        match &self.value {
            None => String::new(),
            Some(_) if self.sensitive => MASK.to_string(),
            Some(value) => value.clone(),
        }
    }
}

/// Named, ordered set of forwards started and stopped together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Template identifier
    #[serde(default)]
    pub id: TemplateId,
    /// Template name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional icon name for front ends
    #[serde(default)]
    pub icon: Option<String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Forwards in start order
    #[serde(default)]
    pub forwards: Vec<ForwardDefinition>,
}

impl Template {
    /// Create an empty template
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            description: None,
            icon: None,
            tags: Vec::new(),
            forwards: Vec::new(),
        }
    }

    /// Builder-style forward
    pub fn with_forward(mut self, definition: ForwardDefinition) -> Self {
        self.forwards.push(definition);
        self
    }
}
