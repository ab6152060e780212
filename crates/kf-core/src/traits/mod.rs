//! Core trait definitions

mod cluster;

pub use cluster::{ClusterClient, ClusterClientFactory, FrameSink, FrameStream, PortForwardStream};
