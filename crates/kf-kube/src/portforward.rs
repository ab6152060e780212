//! WebSocket port-forward dialing
//!
//! Each dial upgrades a fresh connection to
//! `/api/v1/namespaces/{ns}/pods/{pod}/portforward?ports={port}` with the
//! `v4.channel.k8s.io` subprotocol. Binary messages map one-to-one onto
//! frames; control messages are handled by tungstenite and skipped here.

use bytes::Bytes;
use futures::{future, stream, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::Connector;
use url::Url;

use kf_core::error::ConnectionError;
use kf_core::traits::PortForwardStream;
use kf_protocol::SUBPROTOCOL;

use crate::client::KubeClient;

/// Port-forward URL for a pod port, with the scheme switched to ws/wss
pub(crate) fn portforward_url(
    client: &KubeClient,
    namespace: &str,
    pod: &str,
    port: u16,
) -> Result<Url, ConnectionError> {
    let path = format!("api/v1/namespaces/{}/pods/{}/portforward", namespace, pod);
    let mut url = client
        .endpoint(&path)
        .map_err(|e| ConnectionError::ConnectionRefused(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("ports", &port.to_string());

    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| {
        ConnectionError::ConnectionRefused(format!("Cannot dial {} over WebSocket", url))
    })?;

    Ok(url)
}

/// Dial a pod port
pub(crate) async fn open(
    client: &KubeClient,
    namespace: &str,
    pod: &str,
    port: u16,
) -> Result<PortForwardStream, ConnectionError> {
    let url = portforward_url(client, namespace, pod, port)?;
    tracing::debug!("Opening port-forward stream to {}/{}:{}", namespace, pod, port);

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectionError::ConnectionRefused(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    if let Some(auth) = client.authorization_header() {
        headers.insert(AUTHORIZATION, auth.clone());
    }

    let connector = Connector::Rustls(client.tls_config());
    let (ws, _response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector))
            .await
            .map_err(dial_error)?;

    let (write, read) = ws.split();

    let sink = write
        .sink_map_err(|e| ConnectionError::ConnectionLost(e.to_string()))
        .with(|frame: Bytes| {
            future::ready(Ok::<_, ConnectionError>(Message::Binary(frame.to_vec())))
        });

    let stream = stream::unfold(read, |mut read| async move {
        loop {
            match read.next().await {
                Some(Ok(Message::Binary(data))) => return Some((Ok(Bytes::from(data)), read)),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Some((Err(ConnectionError::ConnectionLost(e.to_string())), read))
                }
            }
        }
    });

    Ok(PortForwardStream::new(Box::pin(sink), Box::pin(stream)))
}

fn dial_error(e: WsError) -> ConnectionError {
    match e {
        WsError::Http(response) => ConnectionError::HandshakeFailed(format!(
            "Port-forward upgrade rejected with {}",
            response.status()
        )),
        WsError::Tls(e) => ConnectionError::Tls(e.to_string()),
        WsError::Io(e) => ConnectionError::ConnectionRefused(e.to_string()),
        other => ConnectionError::HandshakeFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_core::ClusterConnectionInfo;

    #[test]
    fn test_portforward_url_schemes() {
        let secure = KubeClient::new(&ClusterConnectionInfo::new("a", "https://10.0.0.1:6443"))
            .unwrap();
        let url = portforward_url(&secure, "db", "postgres-0", 5432).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://10.0.0.1:6443/api/v1/namespaces/db/pods/postgres-0/portforward?ports=5432"
        );

        let plain = KubeClient::new(&ClusterConnectionInfo::new("b", "http://127.0.0.1:8001"))
            .unwrap();
        let url = portforward_url(&plain, "default", "web-0", 80).unwrap();
        assert_eq!(url.scheme(), "ws");
    }
}
