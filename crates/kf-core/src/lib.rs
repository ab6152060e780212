//! kf-core: Core abstractions and configuration for kforward
//!
//! This crate provides the data model, error taxonomy, configuration and the
//! traits through which the forwarding engine talks to a cluster control
//! plane.

pub mod cluster;
pub mod config;
pub mod error;
pub mod template;
pub mod time;
pub mod traits;
pub mod types;

pub use cluster::{ClusterConnectionInfo, Credentials};
pub use error::{ConnectionError, ForwardError, KfError, ResourceError};
pub use template::{
    ForwardDefinition, ForwardTarget, ResolvedSecret, SecretKind, SecretReference, Template,
};
pub use types::{ForwardId, ForwardInstance, ForwardStatus, InstanceId, TemplateId};
