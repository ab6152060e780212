//! kf-cli: Command-line interface for kforward
//!
//! Provides the `kforward` binary: run forward templates or ad-hoc forwards
//! against a cluster and manage the local configuration.

pub mod cluster;
pub mod commands;
pub mod output;
