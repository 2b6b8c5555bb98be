//! RPC client handle.
//!
//! This module provides [`RpcClient`], the service handle applications call
//! through, and the request-construction strategy it delegates to. An
//! unwrapped client uses [`DirectRequestBuilder`]; [`RpcWrapper::wrap`]
//! swaps in an intercepting strategy.
//!
//! [`RpcWrapper::wrap`]: crate::RpcWrapper::wrap

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::builder::RpcClientBuilder;
use crate::callback::{ChannelCallback, RequestCallback};
use crate::request::{Request, RequestBuilder};
use crate::response::RpcResponse;
use crate::transport::Transport;
use crate::ClientError;

/// Strategy that turns a prepared [`RequestBuilder`] into a sendable call.
pub trait RpcRequestBuilder: Send + Sync {
    /// Start a call that will report to `callback`.
    fn create(&self, builder: RequestBuilder, callback: Arc<dyn RequestCallback>) -> Box<dyn PendingCall>;
}

/// A call that has been created but not yet sent.
pub trait PendingCall: Send {
    /// Fix the serialized payload.
    fn set_payload(&mut self, payload: Bytes);

    /// Send the call, returning the handle of its first attempt.
    fn send(self: Box<Self>) -> Result<Request, ClientError>;
}

/// Sends calls unmodified.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectRequestBuilder;

impl RpcRequestBuilder for DirectRequestBuilder {
    fn create(&self, mut builder: RequestBuilder, callback: Arc<dyn RequestCallback>) -> Box<dyn PendingCall> {
        builder.set_callback(callback);
        Box::new(DirectCall { builder })
    }
}

struct DirectCall {
    builder: RequestBuilder,
}

impl PendingCall for DirectCall {
    fn set_payload(&mut self, payload: Bytes) {
        self.builder.set_request_data(payload);
    }

    fn send(self: Box<Self>) -> Result<Request, ClientError> {
        self.builder.send()
    }
}

/// Handle for one remote service endpoint.
///
/// Cloning is cheap; clones share the transport and start out with the same
/// request-construction strategy.
///
/// # Example
///
/// ```ignore
/// use rpc_wrapper::RpcClient;
///
/// let client = RpcClient::builder("http://localhost:3000/app/greet")
///     .content_type("text/x-gwt-rpc; charset=utf-8")
///     .build()?;
///
/// let response = client.call(payload).await?;
/// ```
#[derive(Clone)]
pub struct RpcClient {
    /// URL every call of this handle is sent to.
    entry_point: String,
    transport: Arc<dyn Transport>,
    request_builder: Arc<dyn RpcRequestBuilder>,
    method: Method,
    /// Headers applied to every call before the strategy sees it.
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("entry_point", &self.entry_point)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Create a builder for a client of `entry_point`.
    pub fn builder<S: Into<String>>(entry_point: S) -> RpcClientBuilder {
        RpcClientBuilder::new(entry_point)
    }

    /// Create an unwrapped client.
    ///
    /// This is called by [`RpcClientBuilder::build`]. Prefer using the builder API.
    pub(crate) fn new(
        entry_point: String,
        transport: Arc<dyn Transport>,
        method: Method,
        headers: HeaderMap,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            entry_point,
            transport,
            request_builder: Arc::new(DirectRequestBuilder),
            method,
            headers,
            timeout,
        }
    }

    /// URL every call of this handle is sent to.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Default headers of every call.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Per-attempt timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Replace the request-construction strategy.
    pub fn set_request_builder(&mut self, request_builder: Arc<dyn RpcRequestBuilder>) {
        self.request_builder = request_builder;
    }

    /// A fresh underlying builder carrying this client's settings.
    pub fn request_builder(&self) -> RequestBuilder {
        let mut builder = RequestBuilder::new(self.transport.clone(), self.method.clone(), self.entry_point.clone());
        *builder.headers_mut() = self.headers.clone();
        builder.set_timeout(self.timeout);
        builder
    }

    /// Send `payload` and report the outcome to `callback`.
    ///
    /// An `Err` means nothing was sent and `callback` will not be called.
    pub fn invoke(
        &self,
        payload: impl Into<Bytes>,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<Request, ClientError> {
        let mut call = self.request_builder.create(self.request_builder(), callback);
        call.set_payload(payload.into());
        call.send()
    }

    /// Send `payload` and wait for the final outcome.
    ///
    /// Returns [`ClientError::Canceled`] if the call is abandoned without an
    /// outcome, which happens when a listener drops its decision handle.
    pub async fn call(&self, payload: impl Into<Bytes>) -> Result<RpcResponse, ClientError> {
        let (callback, rx) = ChannelCallback::new();
        self.invoke(payload, callback)?;
        rx.await
            .map_err(|_| ClientError::Canceled("call completed without a response or error".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Outcomes, RecordingTransport};

    fn client(transport: Arc<RecordingTransport>) -> RpcClient {
        RpcClient::builder("http://localhost/app/greet")
            .header("x-app", "demo")
            .timeout(Duration::from_secs(3))
            .transport(transport)
            .build()
            .unwrap()
    }

    #[test]
    fn test_invoke_sends_directly() {
        let transport = RecordingTransport::new();
        let outcomes = Outcomes::new();
        let client = client(transport.clone());

        let handle = client.invoke("payload", outcomes.clone()).unwrap();
        transport.respond(0, RpcResponse::ok("done"));

        let sent = transport.sent(0);
        assert_eq!(sent.handle(), &handle);
        assert_eq!(sent.handle().url(), "http://localhost/app/greet");
        assert_eq!(sent.body(), &Bytes::from_static(b"payload"));
        assert_eq!(sent.headers().get("x-app").unwrap(), "demo");
        assert_eq!(sent.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(outcomes.responses().len(), 1);
    }

    #[test]
    fn test_invoke_reports_refused_dispatch() {
        let transport = RecordingTransport::new();
        transport.refuse_after(0);
        let outcomes = Outcomes::new();

        let err = client(transport).invoke("payload", outcomes.clone()).unwrap_err();

        assert!(matches!(err, ClientError::Transport(_)));
        assert!(outcomes.errors().is_empty());
    }

    #[tokio::test]
    async fn test_call_maps_abandoned_call_to_canceled() {
        struct Dropping;

        impl RpcRequestBuilder for Dropping {
            fn create(&self, builder: RequestBuilder, _callback: Arc<dyn RequestCallback>) -> Box<dyn PendingCall> {
                Box::new(Abandoned(builder))
            }
        }

        struct Abandoned(RequestBuilder);

        impl PendingCall for Abandoned {
            fn set_payload(&mut self, _payload: Bytes) {}

            fn send(self: Box<Self>) -> Result<Request, ClientError> {
                Ok(crate::testing::handle())
            }
        }

        let mut client = client(RecordingTransport::new());
        client.set_request_builder(Arc::new(Dropping));

        let err = client.call("payload").await.unwrap_err();
        assert!(matches!(err, ClientError::Canceled(_)));
    }
}
