//! Client builder.
//!
//! Provides a fluent API for configuring and building an [`RpcClient`].

use std::sync::Arc;
use std::time::Duration;

use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

use crate::client::RpcClient;
use crate::transport::{HyperTransport, Transport};
use crate::ClientError;

/// Builder for creating an [`RpcClient`].
///
/// # Example
///
/// ```ignore
/// use rpc_wrapper::RpcClient;
/// use std::time::Duration;
///
/// let client = RpcClient::builder("http://localhost:3000/app/greet")
///     .content_type("text/x-gwt-rpc; charset=utf-8")
///     .header("x-gwt-permutation", "HostedMode")
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct RpcClientBuilder {
    /// URL of the service endpoint.
    entry_point: String,
    /// HTTP method of every call.
    method: Method,
    /// Default headers, validated in `build`.
    headers: Vec<(String, String)>,
    /// Per-attempt timeout.
    timeout: Option<Duration>,
    /// Transport; a [`HyperTransport`] is created when unset.
    transport: Option<Arc<dyn Transport>>,
}

impl std::fmt::Debug for RpcClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClientBuilder")
            .field("entry_point", &self.entry_point)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl RpcClientBuilder {
    /// Create a new builder for the given endpoint URL.
    pub fn new<S: Into<String>>(entry_point: S) -> Self {
        Self {
            entry_point: entry_point.into(),
            method: Method::POST,
            headers: Vec::new(),
            timeout: None,
            transport: None,
        }
    }

    /// Set the HTTP method. Default is `POST`.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the `content-type` header of every call.
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Add a default header to every call.
    ///
    /// Invalid names or values are reported by [`build`](Self::build).
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the time allowed for each attempt.
    ///
    /// The timeout covers a single physical attempt; a resent call starts a
    /// fresh one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a custom transport instead of the default [`HyperTransport`].
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if the entry point is not a
    /// valid URI or a header is invalid, and [`ClientError::Transport`] if the
    /// default transport cannot be created.
    pub fn build(self) -> Result<RpcClient, ClientError> {
        self.entry_point.parse::<Uri>().map_err(|e| {
            ClientError::invalid_request(format!("invalid entry point {}: {}", self.entry_point, e))
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name: HeaderName = name
                .parse()
                .map_err(|_| ClientError::invalid_request(format!("invalid header name: {}", name)))?;
            let value: HeaderValue = value
                .parse()
                .map_err(|_| ClientError::invalid_request(format!("invalid header value: {}", value)))?;
            headers.insert(name, value);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()?),
        };

        Ok(RpcClient::new(
            self.entry_point,
            transport,
            self.method,
            headers,
            self.timeout,
        ))
    }
}
