//! Core error types for kforward

use std::path::PathBuf;
use std::time::Duration;

use kf_protocol::ProtocolError;
use thiserror::Error;

use crate::template::SecretKind;
use crate::types::{ForwardInstance, InstanceId};

/// Error that ends one relayed connection
///
/// Raised by the bridge pumps; never escapes the connection it belongs to.
#[derive(Error, Debug)]
pub enum KfError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reaching the control plane or dialing a remote stream
///
/// At the bridge level these are isolated to a single local connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The remote dial did not complete in time
    #[error("Dial to {target} timed out after {timeout:?}")]
    DialTimeout { target: String, timeout: Duration },

    /// Connection refused
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The upgrade handshake was rejected
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The remote stream is already closed
    #[error("Connection closed")]
    Closed,

    /// TLS setup or negotiation failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// The control plane could not be reached
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),
}

/// Start-time failures: missing resources, unusable targets, bind failures
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Pod not found
    #[error("Pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },

    /// Pod exists but is not running
    #[error("Pod {namespace}/{name} is not running (phase: {phase})")]
    PodNotRunning {
        namespace: String,
        name: String,
        phase: String,
    },

    /// Service not found
    #[error("Service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },

    /// Service has no selector to find backing pods with
    #[error("Service {namespace}/{name} has no selector")]
    NoSelector { namespace: String, name: String },

    /// Selector matched nothing
    #[error("No pods match selector '{selector}' in namespace {namespace}")]
    NoMatchingPods { namespace: String, selector: String },

    /// Selector matched pods but none are running
    #[error("No running pod matches selector '{selector}' in namespace {namespace}")]
    NoRunningPod { namespace: String, selector: String },

    /// Local port could not be bound
    #[error("Failed to bind local port {port}: {source}")]
    PortBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A start-time operation took too long
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// Control plane API call failed
    #[error("Cluster API error: {0}")]
    Api(String),
}

/// Forward session and template lifecycle errors
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Resource error during start
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Connection error during start
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Reconnect ceiling reached
    #[error("Gave up after {attempts} reconnect attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },

    /// A forward in a template failed to start; siblings were rolled back
    #[error("Forward '{forward}' failed to start: {source}")]
    TemplateStart {
        forward: String,
        #[source]
        source: Box<ForwardError>,
        /// Final snapshots of every forward the call started, in template order
        rolled_back: Vec<ForwardInstance>,
    },

    /// Unknown instance
    #[error("Forward instance not found: {0}")]
    InstanceNotFound(InstanceId),
}

/// Failures resolving a secret or config reference
///
/// Never fatal: logged as a warning and surfaced as a value-less entry.
#[derive(Error, Debug)]
pub enum SecretResolutionError {
    /// The secret or config map does not exist
    #[error("{kind} {namespace}/{name} not found")]
    ResourceMissing {
        kind: SecretKind,
        namespace: String,
        name: String,
    },

    /// The resource exists but lacks the key
    #[error("Key '{key}' not found in {kind} {namespace}/{name}")]
    KeyMissing {
        kind: SecretKind,
        namespace: String,
        name: String,
        key: String,
    },

    /// Listing the namespace failed
    #[error("Failed to list {kind}s in namespace {namespace}: {reason}")]
    FetchFailed {
        kind: SecretKind,
        namespace: String,
        reason: String,
    },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
