//! Exercises the literal testable property from the reactive-401 retry
//! design: a successful refresh callback yields exactly two upstream
//! requests and a 200 passed through to the client; no callback yields
//! exactly one upstream request and the original 401; API-key mode never
//! invokes the callback at all.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, UnixStream};
use tokio::sync::watch;

use ax_proxy::{AuthMode, ProxyState, RefreshCallback};

/// A tiny upstream that returns 401 for the first N calls then 200.
async fn spawn_mock_upstream(fail_first: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            let calls = Arc::clone(&calls_clone);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        let status = if n < fail_first { 401 } else { 200 };
                        let body = Full::new(Bytes::from_static(b"{}")).map_err(|never: Infallible| match never {}).boxed();
                        Ok::<_, Infallible>(Response::builder().status(status).body(body).unwrap())
                    }
                });
                let _ = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (format!("http://{addr}"), calls)
}

struct MockRefresh {
    invoked: Arc<AtomicUsize>,
    succeeds: bool,
}

#[async_trait]
impl RefreshCallback for MockRefresh {
    async fn refresh(&self) -> bool {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.succeeds
    }
}

async fn start_proxy(state: ProxyState) -> (PathBuf, watch::Sender<bool>) {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("proxy.sock");
    std::mem::forget(dir);
    let (tx, rx) = watch::channel(false);
    let state = Arc::new(state);
    let path = socket_path.clone();
    tokio::spawn(async move {
        let _ = ax_proxy::server::serve(&path, state, rx).await;
    });
    // give the listener a moment to bind
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (socket_path, tx)
}

async fn post_messages(socket_path: &PathBuf) -> u16 {
    let stream = UnixStream::connect(socket_path).await.unwrap();
    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await.unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header("host", "localhost")
        .body(Full::new(Bytes::from_static(b"{\"model\":\"x\"}")).map_err(|never: Infallible| match never {}).boxed())
        .unwrap();

    let resp = sender.send_request(req).await.unwrap();
    resp.status().as_u16()
}

#[tokio::test]
async fn oauth_mode_retries_once_on_successful_refresh() {
    std::env::set_var("CLAUDE_CODE_OAUTH_TOKEN", "dummy-token");
    let (upstream_url, calls) = spawn_mock_upstream(1).await;
    let invoked = Arc::new(AtomicUsize::new(0));
    let refresh = Arc::new(MockRefresh { invoked: Arc::clone(&invoked), succeeds: true });
    let state = ProxyState::new(upstream_url, AuthMode::OAuth, Some(refresh));
    let (socket_path, shutdown) = start_proxy(state).await;

    let status = post_messages(&socket_path).await;

    assert_eq!(status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn oauth_mode_without_callback_surfaces_original_401() {
    std::env::set_var("CLAUDE_CODE_OAUTH_TOKEN", "dummy-token");
    let (upstream_url, calls) = spawn_mock_upstream(usize::MAX).await;
    let state = ProxyState::new(upstream_url, AuthMode::OAuth, None);
    let (socket_path, shutdown) = start_proxy(state).await;

    let status = post_messages(&socket_path).await;

    assert_eq!(status, 401);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let _ = shutdown.send(true);
}

#[tokio::test]
async fn api_key_mode_never_invokes_refresh_callback() {
    let (upstream_url, calls) = spawn_mock_upstream(usize::MAX).await;
    let invoked = Arc::new(AtomicUsize::new(0));
    let refresh = Arc::new(MockRefresh { invoked: Arc::clone(&invoked), succeeds: true });
    let state = ProxyState::new(upstream_url, AuthMode::ApiKey("sk-test".to_string()), Some(refresh));
    let (socket_path, shutdown) = start_proxy(state).await;

    let status = post_messages(&socket_path).await;

    assert_eq!(status, 401);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    let _ = shutdown.send(true);
}
