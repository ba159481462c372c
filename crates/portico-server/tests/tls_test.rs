//! Tests del listener HTTPS con un handshake TLS real.

mod helpers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::HeaderMap};
use helpers::*;
use portico_core::BackendAddress;
use portico_server::balancer::BackendRouter;
use portico_server::listener::{ConnectionLimits, EdgeListener, ListenerKind};
use portico_server::tls::load_tls_config;
use portico_server::{BalancerState, create_balancer_router};
use portico_store::MemoryStore;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

fn limits() -> ConnectionLimits {
    ConnectionLimits::new(16, Duration::from_secs(5), Duration::from_secs(1))
}

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Cliente que confia solo en el certificado de prueba y resuelve `localhost`
/// al puerto del listener.
fn https_client(cert_pem: &str, addr: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(cert_pem.as_bytes()).unwrap())
        .resolve("localhost", addr)
        .build()
        .unwrap()
}

async fn https_listener(app: Router, dir: &tempfile::TempDir) -> (EdgeListener, String) {
    let (settings, cert_pem) = self_signed(dir.path());
    let listener = EdgeListener::bind(ListenerKind::Https, local(), app, limits())
        .await
        .unwrap()
        .with_tls(load_tls_config(&settings).unwrap());
    (listener, cert_pem)
}

#[tokio::test]
async fn test_https_listener_serves_cache_path() {
    let dir = tempfile::tempdir().unwrap();
    let origin = CountingOrigin::new("sealed");
    let pipeline = pipeline(
        Arc::new(MemoryStore::default()),
        origin.clone(),
        RecordingSink::new(),
    );
    let (listener, cert_pem) =
        https_listener(cache_app(pipeline, Duration::from_secs(2)), &dir).await;
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(listener.serve(shutdown_rx));

    let http = https_client(&cert_pem, addr);
    let url = format!("https://localhost:{}/secure/page", addr.port());

    let first = http.get(&url).send().await.unwrap();
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.text().await.unwrap(), "sealed");

    let second = http.get(&url).send().await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(origin.calls(), 1);

    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_handshake_does_not_stop_listener() {
    let dir = tempfile::tempdir().unwrap();
    let app = Router::new().route("/", axum::routing::get(|| async { "ok" }));
    let (listener, cert_pem) = https_listener(app, &dir).await;
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(listener.serve(shutdown_rx));

    // HTTP plano contra el puerto TLS: el handshake falla y la conexion se cierra
    let mut plain = tokio::net::TcpStream::connect(addr).await.unwrap();
    plain
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    drop(plain);

    let untrusted = reqwest::Client::new()
        .get(format!("https://127.0.0.1:{}/", addr.port()))
        .send()
        .await;
    assert!(untrusted.is_err());

    let body = https_client(&cert_pem, addr)
        .get(format!("https://localhost:{}/", addr.port()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");

    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_proxy_behind_tls_forwards_https_proto() {
    let backend = Router::new().fallback(|headers: HeaderMap| async move {
        headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    });
    let backend_listener = tokio::net::TcpListener::bind(local()).await.unwrap();
    let backend_addr: BackendAddress = backend_listener
        .local_addr()
        .unwrap()
        .to_string()
        .parse()
        .unwrap();
    tokio::spawn(async move {
        axum::serve(backend_listener, backend).await.unwrap();
    });

    let state = BalancerState::new(
        BackendRouter::new(vec![backend_addr]),
        reqwest::Client::new(),
        Duration::from_secs(2),
    );
    let dir = tempfile::tempdir().unwrap();
    let (listener, cert_pem) = https_listener(create_balancer_router(state), &dir).await;
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(listener.serve(shutdown_rx));

    let proto = https_client(&cert_pem, addr)
        .get(format!("https://localhost:{}/api", addr.port()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(proto, "https");

    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}
