//! Transport layer.
//!
//! The wrapper never touches sockets. It hands each attempt to a
//! [`Transport`], which must report back through the callback exactly once:
//! a response or an error.
//!
//! Two implementations are provided:
//!
//! - [`HyperTransport`]: hyper_util's pooled client (HTTP/1.1 and HTTP/2,
//!   HTTPS with the `tls` feature)
//! - [`TowerTransport`]: any `tower` service, so existing middleware stacks
//!   can sit underneath the wrapper
//!
//! Both spawn the exchange on the current tokio runtime and fail the dispatch
//! synchronously when there is none.
//!
//! # Example
//!
//! ```ignore
//! use rpc_wrapper::transport::HyperTransportBuilder;
//! use std::time::Duration;
//!
//! let transport = HyperTransportBuilder::new()
//!     .pool_idle_timeout(Duration::from_secs(60))
//!     .build()?;
//! ```

mod hyper;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use http_body_util::{BodyExt, Full};
use tower::ServiceExt;
use tower_service::Service;

use crate::callback::RequestCallback;
use crate::request::OutgoingRequest;
use crate::response::RpcResponse;
use crate::ClientError;

pub use self::hyper::{HyperTransport, HyperTransportBuilder};

/// Carries attempts to the server.
pub trait Transport: Send + Sync {
    /// Start sending `request`.
    ///
    /// An `Err` means the attempt was never issued and the callback will not
    /// be called. On `Ok`, the transport must later call exactly one of
    /// `callback.on_response` / `callback.on_error`, passing
    /// `request.handle()`.
    ///
    /// Completing from inside `dispatch` is allowed, but then every `Repeat`
    /// runs the next attempt one level deeper on the same stack. A transport
    /// that may face a listener repeating without bound must complete from a
    /// separate task, as the provided ones do.
    fn dispatch(
        &self,
        request: OutgoingRequest,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<(), ClientError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn dispatch(
        &self,
        request: OutgoingRequest,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<(), ClientError> {
        (**self).dispatch(request, callback)
    }
}

impl From<tower::BoxError> for ClientError {
    fn from(err: tower::BoxError) -> Self {
        match err.downcast::<ClientError>() {
            Ok(err) => *err,
            Err(err) => ClientError::Transport(format!("request failed: {}", err)),
        }
    }
}

/// Adapts a `tower` HTTP service into a [`Transport`].
///
/// # Example
///
/// ```ignore
/// use rpc_wrapper::transport::{HyperTransport, TowerTransport};
/// use tower::ServiceBuilder;
///
/// let service = ServiceBuilder::new()
///     .concurrency_limit(8)
///     .service(HyperTransport::new()?);
/// let transport = TowerTransport::new(service);
/// ```
#[derive(Clone)]
pub struct TowerTransport<S> {
    service: S,
}

impl<S> fmt::Debug for TowerTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TowerTransport").finish_non_exhaustive()
    }
}

impl<S> TowerTransport<S> {
    /// Wrap a service.
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S, B> Transport for TowerTransport<S>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<B>>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
    S::Error: Into<ClientError>,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display,
{
    fn dispatch(
        &self,
        request: OutgoingRequest,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<(), ClientError> {
        spawn_exchange(self.service.clone(), request, callback)
    }
}

/// Spawn one attempt on the current runtime and report its outcome.
pub(crate) fn spawn_exchange<S, B>(
    service: S,
    request: OutgoingRequest,
    callback: Arc<dyn RequestCallback>,
) -> Result<(), ClientError>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<B>> + Send + 'static,
    S::Future: Send,
    S::Error: Into<ClientError>,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display,
{
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| ClientError::transport("no tokio runtime available to send the request"))?;
    let limit = request.timeout();
    let (handle, http_request) = request.into_http()?;

    runtime.spawn(async move {
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, exchange(service, http_request))
                .await
                .unwrap_or(Err(ClientError::Timeout(limit))),
            None => exchange(service, http_request).await,
        };
        match outcome {
            Ok(response) => callback.on_response(&handle, response),
            Err(e) => callback.on_error(&handle, e),
        }
    });
    Ok(())
}

async fn exchange<S, B>(
    service: S,
    request: http::Request<Full<Bytes>>,
) -> Result<RpcResponse, ClientError>
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<B>>,
    S::Error: Into<ClientError>,
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    let response = service.oneshot(request).await.map_err(Into::into)?;
    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "failed to read response body");
            ClientError::Transport(format!("failed to read response body: {}", e))
        })?
        .to_bytes();
    Ok(RpcResponse::new(parts.status, parts.headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::ChannelCallback;
    use crate::RequestBuilder;
    use http::{Method, StatusCode};
    use std::time::Duration;

    async fn echo(request: http::Request<Full<Bytes>>) -> Result<http::Response<Full<Bytes>>, ClientError> {
        let body = match request.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Ok(http::Response::builder()
            .status(StatusCode::OK)
            .header("x-echo", "1")
            .body(Full::new(body))
            .unwrap())
    }

    #[tokio::test]
    async fn test_tower_transport_delivers_response() {
        let transport: Arc<dyn Transport> = Arc::new(TowerTransport::new(tower::service_fn(echo)));
        let builder = RequestBuilder::new(transport, Method::POST, "http://localhost/rpc");
        let (callback, rx) = ChannelCallback::new();

        builder.send_request(Bytes::from_static(b"ping"), callback).unwrap();

        let response = rx.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-echo").unwrap(), "1");
        assert_eq!(response.text(), Some("ping"));
    }

    #[tokio::test]
    async fn test_tower_transport_delivers_service_error() {
        let service = tower::service_fn(|_: http::Request<Full<Bytes>>| async {
            Err::<http::Response<Full<Bytes>>, _>(ClientError::transport("connection refused"))
        });
        let transport: Arc<dyn Transport> = Arc::new(TowerTransport::new(service));
        let builder = RequestBuilder::new(transport, Method::POST, "http://localhost/rpc");
        let (callback, rx) = ChannelCallback::new();

        builder.send_request(Bytes::new(), callback).unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_reported_as_error() {
        let service = tower::service_fn(|_: http::Request<Full<Bytes>>| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ClientError>(http::Response::new(Full::new(Bytes::new())))
        });
        let transport: Arc<dyn Transport> = Arc::new(TowerTransport::new(service));
        let mut builder = RequestBuilder::new(transport, Method::POST, "http://localhost/rpc");
        builder.set_timeout(Some(Duration::from_secs(1)));
        let (callback, rx) = ChannelCallback::new();

        builder.send_request(Bytes::new(), callback).unwrap();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[test]
    fn test_dispatch_without_runtime_fails() {
        let transport: Arc<dyn Transport> = Arc::new(TowerTransport::new(tower::service_fn(echo)));
        let builder = RequestBuilder::new(transport, Method::POST, "http://localhost/rpc");
        let (callback, _rx) = ChannelCallback::new();

        let err = builder.send_request(Bytes::new(), callback).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn test_box_error_conversion_keeps_client_error() {
        let boxed: tower::BoxError = Box::new(ClientError::Timeout(Duration::from_secs(2)));
        assert!(matches!(ClientError::from(boxed), ClientError::Timeout(_)));

        let boxed: tower::BoxError = "boom".into();
        assert!(matches!(ClientError::from(boxed), ClientError::Transport(_)));
    }
}
