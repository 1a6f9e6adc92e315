//! End-to-end forwarding through a stub origin: head serialization, body
//! relay per transmission mode, and the per-chunk data-transfer hook.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use interpose::plugins::{PluginInstruction, PluginProperties, PluginRegistry, ProxyPlugin};
use interpose::plugins::SharedPluginRegistry;
use interpose::proxy::ConnectionHandler;
use interpose::request::RequestContext;
use interpose::ProxyLogger;

/// Stub origin: records what the proxy sent and answers with `response`
/// once the received bytes contain `done_marker`.
async fn spawn_origin(
    response: &'static str,
    done_marker: &'static [u8],
) -> (std::net::SocketAddr, Arc<Mutex<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_writer = seen.clone();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let seen = seen_writer.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    let done = {
                        let mut guard = seen.lock().unwrap();
                        guard.extend_from_slice(&buf[..n]);
                        guard
                            .windows(done_marker.len())
                            .any(|w| w == done_marker)
                    };
                    if done {
                        stream.write_all(response.as_bytes()).await.unwrap();
                        stream.shutdown().await.ok();
                        break;
                    }
                }
            });
        }
    });

    (addr, seen)
}

async fn spawn_proxy(registry: PluginRegistry, origin_port: u16) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let handler = Arc::new(ConnectionHandler::new(
            SharedPluginRegistry::new(registry),
            ProxyLogger::new(),
            origin_port,
        ));
        loop {
            let (stream, peer) = listener.accept().await.unwrap();
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.handle(stream, peer).await;
            });
        }
    });

    addr
}

struct ChunkObserver {
    properties: PluginProperties,
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ProxyPlugin for ChunkObserver {
    fn properties(&self) -> &PluginProperties {
        &self.properties
    }

    fn on_post_client_headers_request(&self, _ctx: &mut RequestContext) -> PluginInstruction {
        PluginInstruction::do_nothing()
    }

    fn on_server_data_transfer(&self, _ctx: &mut RequestContext, chunk: &[u8]) {
        self.bytes.lock().unwrap().extend_from_slice(chunk);
    }
}

#[tokio::test]
async fn get_is_forwarded_and_response_relayed() {
    let (origin_addr, seen) =
        spawn_origin(
        "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        b"\r\n\r\n",
    )
    .await;
    let proxy_addr = spawn_proxy(PluginRegistry::new(), origin_addr.port()).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"GET /path HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("hello"), "{response}");

    let sent = String::from_utf8_lossy(&seen.lock().unwrap().clone()).into_owned();
    assert!(sent.starts_with("GET /path HTTP/1.1\r\n"), "{sent}");
    assert!(sent.contains("Host: localhost\r\n"));
}

#[tokio::test]
async fn post_body_reaches_the_origin() {
    let (origin_addr, seen) =
        spawn_origin(
        "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n",
        b"key=value",
    )
    .await;
    let proxy_addr = spawn_proxy(PluginRegistry::new(), origin_addr.port()).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(
            b"POST /submit HTTP/1.1\r\nHost: localhost\r\nContent-Length: 9\r\nConnection: close\r\n\r\nkey=value",
        )
        .await
        .unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 204 No Content\r\n"));

    // The origin saw the head and the fixed-length body.
    let sent = String::from_utf8_lossy(&seen.lock().unwrap().clone()).into_owned();
    assert!(sent.starts_with("POST /submit HTTP/1.1\r\n"), "{sent}");
    assert!(sent.ends_with("key=value"), "{sent}");
}

#[tokio::test]
async fn data_transfer_hook_sees_the_relayed_body() {
    let (origin_addr, _seen) =
        spawn_origin(
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world",
        b"\r\n\r\n",
    )
    .await;

    let bytes = Arc::new(Mutex::new(Vec::new()));
    let mut registry = PluginRegistry::new();
    registry.register(Box::new(ChunkObserver {
        properties: PluginProperties::new("observer", 1),
        bytes: bytes.clone(),
    }));
    let proxy_addr = spawn_proxy(registry, origin_addr.port()).await;

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();

    assert_eq!(bytes.lock().unwrap().as_slice(), &b"hello world"[..]);
}
