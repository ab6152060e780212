//! Local TCP bridge tests: framing, handshake handling and isolation

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{fast_config, MockCluster, RemoteScript};
use kf_core::traits::ClusterClient;
use kf_core::{ForwardDefinition, ForwardStatus, ForwardTarget};
use kf_forward::ForwardSession;

async fn running_session(cluster: &Arc<MockCluster>) -> (ForwardSession, u16) {
    cluster.add_pod("default", "svc-0", &[]);
    let definition = ForwardDefinition::new("svc", ForwardTarget::Pod("svc-0".into()), 9000);
    let session = ForwardSession::new(
        definition,
        Arc::clone(cluster) as Arc<dyn ClusterClient>,
        fast_config(),
    );
    session.start().await.unwrap();
    let port = session.snapshot().bound_port.unwrap();
    (session, port)
}

/// Read until the peer closes, or give up after a second of silence
async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return received,
            Ok(Ok(n)) => received.extend_from_slice(&buf[..n]),
        }
    }
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .unwrap();
    buf
}

#[tokio::test]
async fn test_each_read_becomes_one_data_frame() {
    let cluster = MockCluster::new();
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"abc").await.unwrap();
    assert_eq!(read_exactly(&mut client, 3).await, b"abc");
    client.write_all(b"defg").await.unwrap();
    assert_eq!(read_exactly(&mut client, 4).await, b"defg");

    let frames = cluster.upstream_frames();
    assert_eq!(
        frames,
        vec![Bytes::from_static(b"\x00abc"), Bytes::from_static(b"\x00defg")]
    );

    session.stop().await;
}

#[tokio::test]
async fn test_two_byte_handshake_delivers_nothing() {
    let cluster = MockCluster::new();
    cluster.set_script(RemoteScript::AfterHandshake(vec![Bytes::from_static(
        b"\x00ok",
    )]));
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let received = read_to_close(&mut client).await;
    assert_eq!(received, b"ok");

    session.stop().await;
}

#[tokio::test]
async fn test_long_first_frame_delivers_tail() {
    let cluster = MockCluster::new();
    cluster.set_script(RemoteScript::Raw(vec![
        Bytes::from_static(&[0, 0x28, 0x23, b'x', b'y', b'z']),
        Bytes::from_static(&[1, 0x28, 0x23]),
    ]));
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let received = read_to_close(&mut client).await;
    assert_eq!(received, b"xyz");

    session.stop().await;
}

#[tokio::test]
async fn test_error_channel_is_never_delivered() {
    let cluster = MockCluster::new();
    cluster.set_script(RemoteScript::AfterHandshake(vec![
        Bytes::from_static(b"\x01container exploded"),
        Bytes::from_static(b"\x00!"),
    ]));
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let received = read_to_close(&mut client).await;
    assert_eq!(received, b"!");

    let lines = session.log().tail(100);
    assert!(lines.iter().any(|l| l.contains("container exploded")));

    session.stop().await;
}

#[tokio::test]
async fn test_short_handshake_drops_only_that_connection() {
    let cluster = MockCluster::new();
    cluster.set_script(RemoteScript::Raw(vec![Bytes::from_static(&[0, 0x01])]));
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let received = read_to_close(&mut client).await;
    assert!(received.is_empty());
    assert_eq!(session.status(), ForwardStatus::Running);

    cluster.set_script(RemoteScript::Echo);
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"still up").await.unwrap();
    assert_eq!(read_exactly(&mut client, 8).await, b"still up");

    session.stop().await;
}

#[tokio::test]
async fn test_failed_dial_closes_only_that_connection() {
    let cluster = MockCluster::new();
    let (session, port) = running_session(&cluster).await;

    cluster.set_refuse_dials(true);
    let mut refused = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(read_to_close(&mut refused).await.is_empty());
    assert_eq!(session.status(), ForwardStatus::Running);

    cluster.set_refuse_dials(false);
    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"again").await.unwrap();
    assert_eq!(read_exactly(&mut client, 5).await, b"again");

    session.stop().await;
}

#[tokio::test]
async fn test_connections_are_independent() {
    let cluster = MockCluster::new();
    let (session, port) = running_session(&cluster).await;

    let mut first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    first.write_all(b"one").await.unwrap();
    second.write_all(b"two").await.unwrap();
    assert_eq!(read_exactly(&mut second, 3).await, b"two");
    assert_eq!(read_exactly(&mut first, 3).await, b"one");

    drop(first);
    second.write_all(b"more").await.unwrap();
    assert_eq!(read_exactly(&mut second, 4).await, b"more");

    session.stop().await;
}

#[tokio::test]
async fn test_stop_closes_open_connections() {
    let cluster = MockCluster::new();
    let (session, port) = running_session(&cluster).await;

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"x").await.unwrap();
    assert_eq!(read_exactly(&mut client, 1).await, b"x");

    session.stop().await;

    let mut buf = [0u8; 8];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("connection should close on stop")
        .unwrap_or(0);
    assert_eq!(n, 0);
}
