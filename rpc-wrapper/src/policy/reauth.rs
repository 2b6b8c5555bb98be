use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{BoxFuture, FutureExt};
use http::StatusCode;

use crate::disposition::{Proceed, ResponseDisposition};
use crate::listener::RpcListener;
use crate::request::Request;
use crate::response::RpcResponse;
use crate::ClientError;

type Reauthenticate = dyn Fn() -> BoxFuture<'static, Result<(), ClientError>> + Send + Sync;

/// Per-call state of [`ReauthListener`].
#[derive(Debug, Default)]
pub struct ReauthContext {
    attempted: AtomicBool,
}

impl ReauthContext {
    /// Whether this call has already triggered a re-authentication.
    pub fn attempted(&self) -> bool {
        self.attempted.load(Ordering::Acquire)
    }
}

/// Logs in again when the server reports an expired session, then resends.
///
/// On a response with the configured status (`401 Unauthorized` unless
/// changed) the call is parked while the re-authentication routine runs. If
/// it succeeds the call is resent; if it fails, its error is delivered
/// instead of the response. Each call re-authenticates at most once, so a
/// second rejection reaches the application unchanged.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use rpc_wrapper::RpcWrapper;
/// use rpc_wrapper::policy::ReauthListener;
///
/// let session = session.clone();
/// let reauth = ReauthListener::new(move || {
///     let session = session.clone();
///     async move { session.login().await }
/// });
/// let wrapper = RpcWrapper::with_listener(Arc::new(reauth));
/// ```
pub struct ReauthListener {
    reauthenticate: Arc<Reauthenticate>,
    status: StatusCode,
}

impl fmt::Debug for ReauthListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReauthListener")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl ReauthListener {
    /// Create a listener that runs `reauthenticate` when a session expires.
    pub fn new<F, Fut>(reauthenticate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        Self {
            reauthenticate: Arc::new(move || reauthenticate().boxed()),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    /// Set the response status that signals an expired session.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl RpcListener<ReauthContext> for ReauthListener {
    fn new_context(&self) -> ReauthContext {
        ReauthContext::default()
    }

    fn before_response_processing(
        &self,
        call_name: Option<&str>,
        _request: &Request,
        response: &RpcResponse,
        context: &Arc<ReauthContext>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        if response.status() != self.status || context.attempted.swap(true, Ordering::AcqRel) {
            return proceed.proceed(ResponseDisposition::Process);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(call_name, status = %response.status(), "session expired; re-authenticating");
        #[cfg(not(feature = "tracing"))]
        let _ = call_name;

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                return proceed.proceed(ResponseDisposition::ReturnError(ClientError::transport(
                    "no tokio runtime available to re-authenticate",
                )));
            }
        };
        let login = (self.reauthenticate)();
        runtime.spawn(async move {
            match login.await {
                Ok(()) => proceed.proceed(ResponseDisposition::Repeat),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "re-authentication failed");
                    proceed.proceed(ResponseDisposition::ReturnError(e))
                }
            }
        });
    }
}
