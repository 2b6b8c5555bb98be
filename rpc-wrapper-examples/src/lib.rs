use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::routing::post;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Header carrying the session token.
pub const SESSION_HEADER: &str = "x-session";

/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Returns the server address from PORT env var, defaulting to 3000.
///
/// # Example
///
/// ```ignore
/// let addr = rpc_wrapper_examples::server_addr()?;
/// let listener = tokio::net::TcpListener::bind(addr).await?;
/// ```
pub fn server_addr() -> anyhow::Result<SocketAddr> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    Ok(format!("127.0.0.1:{port}").parse()?)
}

/// Credentials handed out by `/login`.
#[derive(Default)]
struct Session {
    generation: u32,
    token: String,
    csrf: String,
}

/// Demo server state.
#[derive(Default)]
pub struct DemoServer {
    session: Mutex<Session>,
    greetings: AtomicU32,
    flaky_hits: AtomicU32,
}

impl DemoServer {
    /// Sessions expire after this many greetings.
    const SESSION_LENGTH: u32 = 3;

    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Greets the caller; requires a live session and the matching CSRF token.
async fn greet(State(server): State<Arc<DemoServer>>, headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let count = server.greetings.fetch_add(1, Ordering::SeqCst) + 1;
    let mut session = server.session();
    if count % DemoServer::SESSION_LENGTH == 0 {
        // expire the session so the client has to log in again
        session.token.clear();
    }

    let sent_session = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok());
    if session.token.is_empty() || sent_session != Some(session.token.as_str()) {
        return (StatusCode::UNAUTHORIZED, "session expired".into());
    }
    let sent_csrf = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    if sent_csrf != Some(session.csrf.as_str()) {
        return (StatusCode::FORBIDDEN, "csrf token mismatch".into());
    }
    (StatusCode::OK, format!("hello #{}: {}", count, String::from_utf8_lossy(&body)))
}

/// Starts a new session; answers `session|csrf`.
async fn login(State(server): State<Arc<DemoServer>>) -> String {
    let mut session = server.session();
    session.generation += 1;
    session.token = format!("session-{}", session.generation);
    session.csrf = format!("csrf-{}", session.generation);
    tracing::info!(session = %session.token, "issued new session");
    format!("{}|{}", session.token, session.csrf)
}

/// Unavailable on two out of every three hits.
async fn flaky(State(server): State<Arc<DemoServer>>, body: Bytes) -> (StatusCode, Bytes) {
    if server.flaky_hits.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
        (StatusCode::OK, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Bytes::new())
    }
}

/// The demo server's routes.
pub fn app() -> Router {
    Router::new()
        .route("/app/greet", post(greet))
        .route("/app/login", post(login))
        .route("/app/flaky", post(flaky))
        .with_state(Arc::new(DemoServer::default()))
}

/// Serve [`app`] on `addr` in the background, returning the bound address.
pub async fn spawn_server(addr: SocketAddr) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app()).await {
            tracing::error!(error = %e, "demo server stopped");
        }
    });
    Ok(addr)
}

/// A serialized call to `com.example.Greeting.greet` with one string argument.
pub fn greeting_payload(name: &str) -> Bytes {
    Bytes::from(format!(
        "7|0|6|http://localhost/app/|ABC123|com.example.Greeting|greet|java.lang.String|{}|1|2|3|4|1|5|6|",
        name
    ))
}
