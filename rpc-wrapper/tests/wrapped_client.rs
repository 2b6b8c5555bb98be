//! End-to-end tests: wrapped clients over `HyperTransport` against an
//! in-process axum server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use rpc_wrapper::policy::{
    Chain, HeaderListener, ReauthContext, ReauthListener, RetryContext, RetryListener, RetryPolicy,
};
use rpc_wrapper::{ClientError, RpcClient, RpcWrapper};
use tokio::net::TcpListener;

const PAYLOAD: &str = "7|0|5|http://localhost/app/|ABC123|com.example.Greeting|greet|java.lang.String|1|2|3|4|1|5|";
const SESSION: &str = "session-2";

#[derive(Default)]
struct Server {
    hits: AtomicU32,
    logins: AtomicU32,
}

async fn echo(State(server): State<Arc<Server>>, body: Bytes) -> Bytes {
    server.hits.fetch_add(1, Ordering::SeqCst);
    body
}

/// Unavailable for the first two hits.
async fn flaky(State(server): State<Arc<Server>>, body: Bytes) -> (StatusCode, Bytes) {
    if server.hits.fetch_add(1, Ordering::SeqCst) < 2 {
        (StatusCode::SERVICE_UNAVAILABLE, Bytes::new())
    } else {
        (StatusCode::OK, body)
    }
}

/// Requires the session token handed out by `/login`.
async fn secured(State(server): State<Arc<Server>>, headers: HeaderMap, body: Bytes) -> (StatusCode, Bytes) {
    server.hits.fetch_add(1, Ordering::SeqCst);
    match headers.get("x-session") {
        Some(token) if token == SESSION => (StatusCode::OK, body),
        _ => (StatusCode::UNAUTHORIZED, Bytes::new()),
    }
}

async fn login(State(server): State<Arc<Server>>) -> &'static str {
    server.logins.fetch_add(1, Ordering::SeqCst);
    SESSION
}

async fn start_server() -> (SocketAddr, Arc<Server>) {
    let server = Arc::new(Server::default());
    let app = Router::new()
        .route("/echo", post(echo))
        .route("/flaky", post(flaky))
        .route("/secured", post(secured))
        .route("/login", post(login))
        .with_state(server.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, server)
}

fn client(addr: SocketAddr, path: &str) -> RpcClient {
    RpcClient::builder(format!("http://{}{}", addr, path))
        .content_type("text/x-gwt-rpc; charset=utf-8")
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_default_wrapper_is_transparent() {
    let (addr, server) = start_server().await;
    let client = RpcWrapper::<()>::new().wrap(client(addr, "/echo"));

    let response = client.call(PAYLOAD).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), Some(PAYLOAD));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_listener_hides_transient_failures() {
    let (addr, server) = start_server().await;
    let policy = RetryPolicy::new()
        .max_retries(3)
        .base_delay(Duration::from_millis(10))
        .jitter(0.0);
    let wrapper = RpcWrapper::<RetryContext>::with_listener(Arc::new(RetryListener::new(policy).unwrap()));
    let client = wrapper.wrap(client(addr, "/flaky"));

    let response = client.call(PAYLOAD).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), Some(PAYLOAD));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_ceiling_delivers_last_response() {
    let (addr, server) = start_server().await;
    let policy = RetryPolicy::new()
        .max_retries(1)
        .base_delay(Duration::from_millis(10))
        .jitter(0.0);
    let wrapper = RpcWrapper::<RetryContext>::with_listener(Arc::new(RetryListener::new(policy).unwrap()));
    let client = wrapper.wrap(client(addr, "/flaky"));

    let response = client.call(PAYLOAD).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
}

/// Carries the session header and logs in again when it is rejected.
type SessionListener = Chain<Arc<HeaderListener>, ReauthListener>;

fn session_listener(login_client: RpcClient) -> SessionListener {
    let header = Arc::new(HeaderListener::try_new("x-session", "expired").unwrap());
    let rotated = header.clone();
    let reauth = ReauthListener::new(move || {
        let login_client = login_client.clone();
        let header = rotated.clone();
        async move {
            let response = login_client.call(Bytes::new()).await?;
            if !response.is_success() {
                return Err(ClientError::invocation(format!("login failed: {}", response.status())));
            }
            let token = response
                .text()
                .ok_or_else(|| ClientError::invocation("login returned no token"))?;
            header.set_value(token)
        }
    });
    Chain::new(header, reauth)
}

#[tokio::test]
async fn test_reauth_resends_with_new_session() {
    let (addr, server) = start_server().await;
    let listener = session_listener(client(addr, "/login"));
    let wrapper = RpcWrapper::<ReauthContext>::with_listener(Arc::new(listener));
    let client = wrapper.wrap(client(addr, "/secured"));

    let response = client.call(PAYLOAD).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text(), Some(PAYLOAD));
    assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    assert_eq!(server.logins.load(Ordering::SeqCst), 1);

    // the rotated token is used from the first attempt on
    client.call(PAYLOAD).await.unwrap();
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    assert_eq!(server.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_login_surfaces_error() {
    let (addr, server) = start_server().await;
    let listener = session_listener(client(addr, "/missing"));
    let wrapper = RpcWrapper::<ReauthContext>::with_listener(Arc::new(listener));
    let client = wrapper.wrap(client(addr, "/secured"));

    let err = client.call(PAYLOAD).await.unwrap_err();

    assert!(matches!(&err, ClientError::Invocation(m) if m.starts_with("login failed")));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    assert_eq!(server.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_connection_refused_is_delivered_as_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RpcWrapper::<()>::new().wrap(client(addr, "/echo"));
    let err = client.call(PAYLOAD).await.unwrap_err();

    assert!(matches!(err, ClientError::Transport(_)));
    assert!(err.is_retryable());
}
