//! Local TCP bridge
//!
//! A loopback listener whose every accepted connection is relayed over its
//! own freshly dialed port-forward stream. The two directions run as pumps
//! raced under `select!`; when either side finishes, the other is dropped
//! and the connection is torn down. Sibling connections are unaffected.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use kf_core::error::{ConnectionError, KfError, ResourceError};
use kf_core::traits::{ClusterClient, FrameSink, FrameStream, PortForwardStream};
use kf_protocol::{ChannelCodec, ChannelDemux, Inbound};

use crate::log::ForwardLog;

/// Consecutive non-transient accept failures before the listener is given up
pub const MAX_ACCEPT_FAILURES: u32 = 5;

/// Pause between failed accepts
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Listen backlog for the loopback socket
const LISTEN_BACKLOG: u32 = 1024;

/// Where accepted connections are relayed to
pub struct RemoteEndpoint {
    pub client: Arc<dyn ClusterClient>,
    pub namespace: String,
    pub pod: String,
    pub port: u16,
}

impl std::fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod, self.port)
    }
}

/// Per-connection relay settings
#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    /// Upper bound on dialing the remote stream
    pub dial_timeout: Duration,
    /// Largest chunk read from the local socket per frame
    pub read_buffer_size: usize,
}

/// Reserve a loopback port without listening on it yet
///
/// Port 0 asks the OS for a free port. The returned socket has
/// `SO_REUSEADDR` set so a port released by a previous cycle can be taken
/// again immediately.
pub fn reserve_port(port: u16) -> Result<(TcpSocket, u16), ResourceError> {
    let bind_error = |source: io::Error| ResourceError::PortBind { port, source };

    let socket = TcpSocket::new_v4().map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .map_err(bind_error)?;
    let bound = socket.local_addr().map_err(bind_error)?.port();

    Ok((socket, bound))
}

/// Start listening on a reserved socket
pub fn listen(socket: TcpSocket, port: u16) -> Result<TcpListener, ResourceError> {
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| ResourceError::PortBind { port, source })
}

/// Accept connections until cancelled
///
/// Returns `Ok(())` on cancellation. Returns the last error once
/// [`MAX_ACCEPT_FAILURES`] non-transient failures happen in a row; the
/// listener is then considered unusable.
pub async fn accept_loop(
    listener: &TcpListener,
    endpoint: Arc<RemoteEndpoint>,
    settings: RelaySettings,
    log: Arc<ForwardLog>,
    cancel: CancellationToken,
    tracker: &TaskTracker,
) -> io::Result<()> {
    let mut failures = 0u32;

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = listener.accept() => result,
        };

        match accepted {
            Ok((socket, peer)) => {
                failures = 0;
                log.debug(format!("Accepted connection from {}", peer));

                let endpoint = Arc::clone(&endpoint);
                let log = Arc::clone(&log);
                let cancel = cancel.child_token();
                tracker.spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = serve_connection(socket, &endpoint, settings, &log, cancel.clone()) => {}
                    }
                    log.debug(format!("Connection from {} closed", peer));
                });
            }
            Err(e) if is_transient(&e) => {
                log.debug(format!("Transient accept error: {}", e));
            }
            Err(e) => {
                failures += 1;
                log.warn(format!(
                    "Accept failed ({}/{}): {}",
                    failures, MAX_ACCEPT_FAILURES, e
                ));
                if failures >= MAX_ACCEPT_FAILURES {
                    return Err(e);
                }
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Dial the remote side for one accepted socket and relay until done
///
/// A failed or timed out dial closes only this socket.
async fn serve_connection(
    socket: TcpStream,
    endpoint: &RemoteEndpoint,
    settings: RelaySettings,
    log: &ForwardLog,
    cancel: CancellationToken,
) {
    let dial = endpoint
        .client
        .open_port_forward(&endpoint.namespace, &endpoint.pod, endpoint.port);

    let remote = match tokio::time::timeout(settings.dial_timeout, dial).await {
        Ok(Ok(remote)) => remote,
        Ok(Err(e)) => {
            log.warn(format!("Failed to open stream to {}: {}", endpoint, e));
            return;
        }
        Err(_) => {
            let e = ConnectionError::DialTimeout {
                target: endpoint.to_string(),
                timeout: settings.dial_timeout,
            };
            log.warn(e.to_string());
            return;
        }
    };

    match relay(socket, remote, settings.read_buffer_size, log, cancel).await {
        Ok(()) => {}
        Err(KfError::Protocol(e)) => {
            log.warn(format!("Dropping connection on protocol error: {}", e));
        }
        Err(e) => {
            log.debug(format!("Connection ended: {}", e));
        }
    }
}

/// Relay bytes between a local socket and a remote stream
///
/// Local reads become one data frame each; inbound data frames are written
/// to the socket in arrival order. Handshake frames and error-channel text
/// never reach the socket.
pub async fn relay(
    socket: TcpStream,
    remote: PortForwardStream,
    read_buffer_size: usize,
    log: &ForwardLog,
    cancel: CancellationToken,
) -> Result<(), KfError> {
    let (mut reader, mut writer) = socket.into_split();
    let PortForwardStream {
        mut sink,
        mut stream,
    } = remote;

    let result = tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        result = pump_upstream(&mut reader, &mut sink, read_buffer_size) => result,
        result = pump_downstream(&mut stream, &mut writer, log) => result,
    };

    let _ = sink.close().await;
    let _ = writer.shutdown().await;

    result
}

/// Local socket to remote stream
async fn pump_upstream(
    reader: &mut OwnedReadHalf,
    sink: &mut FrameSink,
    read_buffer_size: usize,
) -> Result<(), KfError> {
    let mut codec = ChannelCodec::new();
    let mut buf = BytesMut::with_capacity(read_buffer_size);

    loop {
        buf.reserve(read_buffer_size);
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let payload: Bytes = buf.split().freeze();
        let mut frame = BytesMut::with_capacity(payload.len() + 1);
        codec.encode(payload, &mut frame)?;
        sink.send(frame.freeze()).await?;
    }
}

/// Remote stream to local socket
async fn pump_downstream(
    stream: &mut FrameStream,
    writer: &mut OwnedWriteHalf,
    log: &ForwardLog,
) -> Result<(), KfError> {
    let mut demux = ChannelDemux::new();

    while let Some(message) = stream.next().await {
        match demux.accept(message?)? {
            Inbound::Data(payload) => {
                if !payload.is_empty() {
                    writer.write_all(&payload).await?;
                }
            }
            Inbound::Error(text) => {
                log.warn(format!("Remote error: {}", text.trim_end()));
            }
            Inbound::Handshake { .. } => {}
        }
    }

    Ok(())
}
