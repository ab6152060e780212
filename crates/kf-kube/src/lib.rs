//! kf-kube: Kubernetes control-plane client for kforward
//!
//! Implements the `kf-core` cluster traits over the Kubernetes REST API and
//! the `v4.channel.k8s.io` WebSocket port-forward subprotocol. Takes an
//! already-built [`ClusterConnectionInfo`](kf_core::ClusterConnectionInfo);
//! kubeconfig discovery is left to the caller.

mod api;
mod client;
mod factory;
mod portforward;
mod tls;

pub use client::KubeClient;
pub use factory::KubeClientFactory;
