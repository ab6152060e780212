//! Cluster connection flags
//!
//! Every flag can also come from the environment so that tokens stay out of
//! shell history.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use kf_core::{ClusterConnectionInfo, Credentials};

/// Flags describing how to reach the API server
#[derive(Debug, Clone, Default, Args)]
pub struct ClusterArgs {
    /// API server URL (e.g. https://10.0.0.1:6443)
    #[arg(long, env = "KFORWARD_SERVER")]
    pub server: Option<String>,

    /// Display name for the cluster
    #[arg(long, env = "KFORWARD_CLUSTER", default_value = "default")]
    pub cluster_name: String,

    /// Default namespace for forwards that do not name one
    #[arg(short, long, env = "KFORWARD_NAMESPACE")]
    pub namespace: Option<String>,

    /// Bearer token
    #[arg(long, env = "KFORWARD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for basic authentication
    #[arg(long, env = "KFORWARD_USERNAME", requires = "password")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "KFORWARD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// PEM client certificate file
    #[arg(long, requires = "client_key")]
    pub client_certificate: Option<PathBuf>,

    /// PEM client key file
    #[arg(long, requires = "client_certificate")]
    pub client_key: Option<PathBuf>,

    /// PEM bundle of trusted certificate authorities
    #[arg(long)]
    pub certificate_authority: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,
}

impl ClusterArgs {
    /// Build a connection descriptor, reading any referenced PEM files
    pub fn connection_info(&self) -> Result<ClusterConnectionInfo> {
        let Some(server) = &self.server else {
            bail!("No API server given; pass --server or set KFORWARD_SERVER");
        };

        let mut info = ClusterConnectionInfo::new(&self.cluster_name, server);
        if let Some(namespace) = &self.namespace {
            info.default_namespace = namespace.clone();
        }
        info.credentials = self.credentials()?;
        info.certificate_authority = self
            .certificate_authority
            .as_deref()
            .map(read_pem)
            .transpose()?;
        info.insecure_skip_tls_verify = self.insecure_skip_tls_verify;

        Ok(info)
    }

    fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = &self.token {
            return Ok(Credentials::BearerToken {
                token: token.clone(),
            });
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            return Ok(Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            });
        }
        if let (Some(cert), Some(key)) = (&self.client_certificate, &self.client_key) {
            return Ok(Credentials::ClientCertificate {
                certificate_pem: read_pem(cert)?,
                key_pem: read_pem(key)?,
            });
        }
        Ok(Credentials::None)
    }
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}
