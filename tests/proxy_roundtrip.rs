//! End-to-end routing over loopback sockets

use std::sync::Arc;
use std::time::Duration;

use rdpgate::config::Config;
use rdpgate::{RdpGateProxy, RouteTable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;

fn connection_request(cookie: &str) -> Vec<u8> {
    let mut buf = vec![0x03, 0x00, 0x00, 0x00, 0x00, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00];
    buf.extend_from_slice(cookie.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&[0x01, 0x00, 0x08, 0x00, 0x03, 0x00, 0x00, 0x00]);
    buf
}

/// Upstream that reads `expect` bytes, replies with `reply` and returns what it got
async fn spawn_upstream(
    expect: usize,
    reply: &'static [u8],
) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = vec![0u8; expect];
        stream.read_exact(&mut received).await.unwrap();
        stream.write_all(reply).await.unwrap();
        received
    });

    (addr, handle)
}

async fn spawn_proxy(config: Config) -> String {
    spawn_proxy_with_routes(config).await.0
}

async fn spawn_proxy_with_routes(config: Config) -> (String, Arc<RwLock<RouteTable>>) {
    let proxy = RdpGateProxy::new(&config).unwrap();
    let routes = proxy.routes();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        let _ = proxy.serve(listener).await;
    });

    (addr, routes)
}

fn raw_request(token: &str) -> Vec<u8> {
    let mut buf = vec![0x03, 0x00, 0x00, 0x00, 0x00, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00];
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}

/// True when the proxy closes the client without routing it
async fn is_dropped(client: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    n == 0
}

#[tokio::test]
async fn test_routes_by_cookie() {
    let request = connection_request("Cookie: mstshash=alice");
    let (alice_addr, alice) = spawn_upstream(request.len(), b"confirm").await;

    let mut config = Config::default();
    config.routes.sessions.insert("alice".to_string(), alice_addr);
    config.routes.default_upstream = Some("127.0.0.1:1".to_string());
    let proxy_addr = spawn_proxy(config).await;

    let mut client = TcpStream::connect(&proxy_addr).await.unwrap();
    // Split inside the token to exercise accumulation across reads
    client.write_all(&request[..16]).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(&request[16..]).await.unwrap();

    let mut reply = [0u8; 7];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"confirm");

    let received = alice.await.unwrap();
    assert_eq!(received, request);
}

#[tokio::test]
async fn test_falls_back_to_default_upstream() {
    let request = connection_request("Cookie: mstshash=nobody");
    let (default_addr, default_upstream) = spawn_upstream(request.len(), b"ok").await;

    let mut config = Config::default();
    config.routes.default_upstream = Some(default_addr);
    let proxy_addr = spawn_proxy(config).await;

    let mut client = TcpStream::connect(&proxy_addr).await.unwrap();
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 2];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"ok");
    assert_eq!(default_upstream.await.unwrap(), request);
}

#[tokio::test]
async fn test_unrouted_client_is_dropped() {
    let proxy_addr = spawn_proxy(Config::default()).await;

    let mut client = TcpStream::connect(&proxy_addr).await.unwrap();
    client
        .write_all(&connection_request("Cookie: mstshash=ghost"))
        .await
        .unwrap();

    assert!(is_dropped(&mut client).await);
}

#[tokio::test]
async fn test_preread_timeout_routes_to_default() {
    // Connection Request whose token never gets its CR/LF
    let partial = [0x03, 0x00, 0x00, 0x00, 0x00, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00, b'a', b'b'];
    let (default_addr, default_upstream) = spawn_upstream(partial.len(), b"late").await;

    let mut config = Config::default();
    config.scanner.preread_timeout_secs = 1;
    config.routes.default_upstream = Some(default_addr);
    let proxy_addr = spawn_proxy(config).await;

    let mut client = TcpStream::connect(&proxy_addr).await.unwrap();
    client.write_all(&partial).await.unwrap();

    let mut reply = [0u8; 4];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"late");
    assert_eq!(default_upstream.await.unwrap(), partial);
}

#[tokio::test]
async fn test_live_mapping_add_and_remove() {
    let (proxy_addr, routes) = spawn_proxy_with_routes(Config::default()).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let token = format!("ws1_{}", port);
    let request = raw_request(&token);

    routes
        .write()
        .await
        .add_mapping("ws1", "127.0.0.1", &[port])
        .unwrap();

    let expect = request.len();
    let upstream = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = vec![0u8; expect];
        stream.read_exact(&mut received).await.unwrap();
        stream.write_all(b"ws1").await.unwrap();
        received
    });

    let mut client = TcpStream::connect(&proxy_addr).await.unwrap();
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 3];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"ws1");
    assert_eq!(upstream.await.unwrap(), request);

    assert_eq!(routes.write().await.remove_session("ws1"), 1);

    let mut late_client = TcpStream::connect(&proxy_addr).await.unwrap();
    late_client.write_all(&request).await.unwrap();
    assert!(is_dropped(&mut late_client).await);
}
