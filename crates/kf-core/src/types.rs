//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::template::{ForwardDefinition, ResolvedSecret};

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Get the raw UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a template
    TemplateId
}

uuid_id! {
    /// Unique identifier for a forward definition
    ForwardId
}

uuid_id! {
    /// Process-wide unique identifier for a running forward instance
    InstanceId
}

/// Lifecycle state of a forward instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStatus {
    /// Not running; initial and terminal state
    #[default]
    Stopped,
    /// Acquiring a port, resolving the target or reconnecting
    Starting,
    /// Listening and relaying
    Running,
    /// Tearing down after a stop request
    Stopping,
    /// Start failed or reconnects exhausted; needs an explicit start
    Failed,
}

impl ForwardStatus {
    /// Whether a start request should be ignored in this state
    pub fn is_active(&self) -> bool {
        matches!(self, ForwardStatus::Starting | ForwardStatus::Running)
    }

    /// Whether a stop request should be ignored in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ForwardStatus::Stopped | ForwardStatus::Failed)
    }
}

impl fmt::Display for ForwardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardStatus::Stopped => write!(f, "stopped"),
            ForwardStatus::Starting => write!(f, "starting"),
            ForwardStatus::Running => write!(f, "running"),
            ForwardStatus::Stopping => write!(f, "stopping"),
            ForwardStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time snapshot of one forward's runtime state
///
/// Snapshots are replaced whole; a reader never sees a partially updated one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardInstance {
    /// Instance identifier
    pub id: InstanceId,
    /// Definition this instance runs
    pub definition_id: ForwardId,
    /// Display name copied from the definition
    pub name: String,
    /// Current status
    pub status: ForwardStatus,
    /// Local port, set once per start cycle and cleared on stop
    pub bound_port: Option<u16>,
    /// Pod the forward currently targets
    pub resolved_pod: Option<String>,
    /// Unix millis of the last successful start
    pub started_at: Option<u64>,
    /// Unix millis of the last stop
    pub stopped_at: Option<u64>,
    /// Last error message
    pub error_message: Option<String>,
    /// Reconnect attempts since the last explicit start
    pub reconnect_attempts: u32,
    /// Secret and config values resolved at start
    pub secrets: Vec<ResolvedSecret>,
}

impl ForwardInstance {
    /// Create the initial `Stopped` snapshot for a definition
    pub fn new(id: InstanceId, definition: &ForwardDefinition) -> Self {
        Self {
            id,
            definition_id: definition.id,
            name: definition.name.clone(),
            status: ForwardStatus::Stopped,
            bound_port: None,
            resolved_pod: None,
            started_at: None,
            stopped_at: None,
            error_message: None,
            reconnect_attempts: 0,
            secrets: Vec::new(),
        }
    }

    /// Loopback address clients should connect to, while bound
    pub fn local_address(&self) -> Option<String> {
        self.bound_port.map(|port| format!("127.0.0.1:{}", port))
    }
}
