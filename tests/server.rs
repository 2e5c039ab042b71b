use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use snippetbox::app::App;
use snippetbox::config::Config;
use snippetbox::models::{MemorySnippets, MemoryUsers};
use snippetbox::render::JsonRenderer;
use snippetbox::session::MemoryStore;

async fn raw_request(addr: std::net::SocketAddr, head: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(head.as_bytes()).await.expect("write");
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.expect("read");
    String::from_utf8_lossy(&buf).into_owned()
}

fn app() -> snippetbox::BoxedHandler {
    App::new(
        Config::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryUsers::new()),
        Arc::new(MemorySnippets::new()),
        Arc::new(JsonRenderer),
    )
    .routes()
}

#[tokio::test]
async fn serves_over_tcp_and_drains_on_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(snippetbox::serve_listener(listener, app(), async move {
        let _ = stopped.await;
    }));

    let ping = raw_request(addr, "GET /ping HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n").await;
    assert!(ping.starts_with("HTTP/1.1 200"), "{ping}");
    assert!(ping.to_ascii_lowercase().contains("x-frame-options: deny"));
    assert!(ping.ends_with("OK"));

    let brew = raw_request(addr, "BREW /ping HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n").await;
    assert!(brew.starts_with("HTTP/1.1 405"), "{brew}");

    stop.send(()).expect("server still running");
    server.await.expect("join").expect("clean shutdown");
}

#[tokio::test]
async fn idle_keep_alive_connections_do_not_block_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(snippetbox::serve_listener(listener, app(), async move {
        let _ = stopped.await;
    }));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(b"GET /ping HTTP/1.1\r\nhost: localhost\r\n\r\n").await.expect("write");
    let mut buf = Vec::new();
    while !buf.ends_with(b"OK") {
        let mut chunk = [0_u8; 1024];
        let n = stream.read(&mut chunk).await.expect("read");
        assert_ne!(n, 0, "connection closed before the response finished");
        buf.extend_from_slice(&chunk[..n]);
    }
    assert!(buf.starts_with(b"HTTP/1.1 200"));

    // The connection stays open and idle while the server shuts down.
    stop.send(()).expect("server still running");
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("shutdown finished while a keep-alive connection was open")
        .expect("join")
        .expect("clean shutdown");

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.expect("read");
    assert!(rest.is_empty());
}
