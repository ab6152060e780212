//! REST client for one cluster

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use kf_core::cluster::{DataResource, PodInfo, ServiceInfo};
use kf_core::error::{ConnectionError, ResourceError};
use kf_core::traits::{ClusterClient, PortForwardStream};
use kf_core::{ClusterConnectionInfo, Credentials};

use crate::api::{DataObject, List, Pod, Service, Status};
use crate::portforward;
use crate::tls;

/// Kubernetes API client scoped to one cluster connection
pub struct KubeClient {
    name: String,
    base: Url,
    default_namespace: String,
    http: reqwest::Client,
    /// `Authorization` header value, if the credentials use one
    authorization: Option<HeaderValue>,
    tls: Arc<rustls::ClientConfig>,
}

impl KubeClient {
    /// Build a client; no request is made until the first call
    pub fn new(info: &ClusterConnectionInfo) -> Result<Self, ConnectionError> {
        let mut base = Url::parse(&info.server).map_err(|e| {
            ConnectionError::Unreachable(format!("Invalid server URL '{}': {}", info.server, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConnectionError::Unreachable(format!(
                "Unsupported server URL scheme '{}'",
                base.scheme()
            )));
        }
        // Keep any path prefix when joining API paths
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let tls = tls::client_config(info)?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls.clone())
            .build()
            .map_err(|e| ConnectionError::Tls(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name: info.name.clone(),
            base,
            default_namespace: info.default_namespace.clone(),
            http,
            authorization: authorization(&info.credentials)?,
            tls: Arc::new(tls),
        })
    }

    /// Cluster display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute URL for an API path (without leading slash)
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ResourceError> {
        self.base
            .join(path)
            .map_err(|e| ResourceError::Api(format!("Invalid API path '{}': {}", path, e)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ResourceError> {
        let url = self.endpoint(path)?;
        tracing::trace!("GET {}", url);

        let mut request = self.http.get(url).query(query);
        if let Some(auth) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResourceError::Api(format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response
                .json::<Status>()
                .await
                .ok()
                .and_then(|s| s.message)
                .unwrap_or_else(|| status.to_string());
            return Err(ResourceError::Api(format!(
                "GET {} returned {}: {}",
                path, status, message
            )));
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ResourceError::Api(format!("Invalid response from {}: {}", path, e)))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ResourceError> {
        Ok(self
            .get_json::<List<T>>(path, query)
            .await?
            .map(|list| list.items)
            .unwrap_or_default())
    }

    pub(crate) fn authorization_header(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    pub(crate) fn tls_config(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.tls)
    }
}

fn authorization(credentials: &Credentials) -> Result<Option<HeaderValue>, ConnectionError> {
    let value = match credentials {
        Credentials::BearerToken { token } => format!("Bearer {}", token),
        Credentials::Basic { username, password } => {
            format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
        }
        Credentials::None | Credentials::ClientCertificate { .. } => return Ok(None),
    };

    let mut header = HeaderValue::from_str(&value).map_err(|_| {
        ConnectionError::HandshakeFailed("Credentials contain invalid characters".to_string())
    })?;
    header.set_sensitive(true);
    Ok(Some(header))
}

fn namespaced(namespace: &str, resource: &str) -> String {
    format!("api/v1/namespaces/{}/{}", namespace, resource)
}

#[async_trait]
impl ClusterClient for KubeClient {
    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    async fn ping(&self) -> Result<(), ConnectionError> {
        let url = self
            .endpoint("version")
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

        let mut request = self.http.get(url);
        if let Some(auth) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectionError::Unreachable(format!("{}: {}", self.base, e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectionError::HandshakeFailed(format!("{} rejected credentials", self.name)),
            ),
            status => Err(ConnectionError::Unreachable(format!(
                "{} answered {}",
                self.base, status
            ))),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>, ResourceError> {
        let path = namespaced(namespace, &format!("pods/{}", name));
        Ok(self.get_json::<Pod>(&path, &[]).await?.map(PodInfo::from))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>, ResourceError> {
        let pods = self
            .list::<Pod>(
                &namespaced(namespace, "pods"),
                &[("labelSelector", label_selector)],
            )
            .await?;
        Ok(pods.into_iter().map(PodInfo::from).collect())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceInfo>, ResourceError> {
        let path = namespaced(namespace, &format!("services/{}", name));
        Ok(self
            .get_json::<Service>(&path, &[])
            .await?
            .map(ServiceInfo::from))
    }

    async fn list_secrets(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError> {
        let secrets = self
            .list::<DataObject>(&namespaced(namespace, "secrets"), &[])
            .await?;
        Ok(secrets.into_iter().map(DataObject::into_decoded).collect())
    }

    async fn list_config_maps(&self, namespace: &str) -> Result<Vec<DataResource>, ResourceError> {
        let config_maps = self
            .list::<DataObject>(&namespaced(namespace, "configmaps"), &[])
            .await?;
        Ok(config_maps
            .into_iter()
            .map(DataObject::into_plain)
            .collect())
    }

    async fn open_port_forward(
        &self,
        namespace: &str,
        pod: &str,
        port: u16,
    ) -> Result<PortForwardStream, ConnectionError> {
        portforward::open(self, namespace, pod, port).await
    }
}

impl std::fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClient")
            .field("name", &self.name)
            .field("server", &self.base.as_str())
            .field("default_namespace", &self.default_namespace)
            .finish()
    }
}
