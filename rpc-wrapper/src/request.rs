//! Transport-level request building.
//!
//! [`RequestBuilder`] is the plain, unwrapped builder: it knows the HTTP method,
//! URL, headers and payload of a call and hands each physical attempt to a
//! [`Transport`]. Every attempt is identified by a fresh [`Request`] handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use http_body_util::Full;

use crate::callback::RequestCallback;
use crate::transport::Transport;
use crate::ClientError;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for one physical attempt of a call.
///
/// A resend produces a new handle with a new id but the same method and URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    id: u64,
    method: Method,
    url: String,
}

impl Request {
    pub(crate) fn next(method: Method, url: String) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method,
            url,
        }
    }

    /// Process-unique id of this attempt.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// HTTP method of this attempt.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL of this attempt.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Everything a transport needs to put one attempt on the wire.
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    handle: Request,
    headers: HeaderMap,
    body: Bytes,
    timeout: Option<Duration>,
}

impl OutgoingRequest {
    /// The handle the transport must pass back to the callback.
    pub fn handle(&self) -> &Request {
        &self.handle
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Serialized request payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Time allowed for the whole exchange, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Convert into an `http::Request`, returning the attempt handle alongside.
    pub fn into_http(self) -> Result<(Request, http::Request<Full<Bytes>>), ClientError> {
        let mut request = http::Request::builder()
            .method(self.handle.method.clone())
            .uri(self.handle.url.as_str())
            .body(Full::new(self.body))
            .map_err(|e| {
                ClientError::invalid_request(format!("cannot build request for {}: {}", self.handle.url, e))
            })?;
        *request.headers_mut() = self.headers;
        Ok((self.handle, request))
    }
}

/// Builder for plain (unwrapped) requests.
#[derive(Clone)]
pub struct RequestBuilder {
    transport: Arc<dyn Transport>,
    method: Method,
    url: String,
    headers: HeaderMap,
    request_data: Option<Bytes>,
    callback: Option<Arc<dyn RequestCallback>>,
    timeout: Option<Duration>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("request_data_len", &self.request_data.as_ref().map(Bytes::len))
            .field("callback", &self.callback.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    /// Create a builder for `method` requests to `url` over `transport`.
    pub fn new(transport: Arc<dyn Transport>, method: Method, url: impl Into<String>) -> Self {
        Self {
            transport,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            request_data: None,
            callback: None,
            timeout: None,
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Set a header from strings, failing if either part is invalid.
    pub fn try_set_header(&mut self, name: &str, value: &str) -> Result<(), ClientError> {
        let name: HeaderName = name
            .parse()
            .map_err(|_| ClientError::invalid_request(format!("invalid header name: {}", name)))?;
        let value: HeaderValue = value
            .parse()
            .map_err(|_| ClientError::invalid_request(format!("invalid header value: {}", value)))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Payload set with [`set_request_data`](Self::set_request_data).
    pub fn request_data(&self) -> Option<&Bytes> {
        self.request_data.as_ref()
    }

    /// Set the payload used by [`send`](Self::send).
    pub fn set_request_data(&mut self, data: Bytes) {
        self.request_data = Some(data);
    }

    /// Register the callback used by [`send`](Self::send).
    pub fn set_callback(&mut self, callback: Arc<dyn RequestCallback>) {
        self.callback = Some(callback);
    }

    /// Time allowed for each attempt.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set the time allowed for each attempt. `None` waits indefinitely.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Send the stored payload to the stored callback.
    ///
    /// Fails without contacting the transport if no callback was registered.
    /// A missing payload is sent as an empty body.
    pub fn send(&self) -> Result<Request, ClientError> {
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| ClientError::invalid_request("no callback registered"))?;
        let data = self.request_data.clone().unwrap_or_default();
        self.dispatch(data, callback)
    }

    /// Send `data` and deliver the outcome to `callback`.
    pub fn send_request(
        &self,
        data: Bytes,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<Request, ClientError> {
        self.dispatch(data, callback)
    }

    fn dispatch(&self, body: Bytes, callback: Arc<dyn RequestCallback>) -> Result<Request, ClientError> {
        let handle = Request::next(self.method.clone(), self.url.clone());
        let outgoing = OutgoingRequest {
            handle: handle.clone(),
            headers: self.headers.clone(),
            body,
            timeout: self.timeout,
        };
        self.transport.dispatch(outgoing, callback)?;
        Ok(handle)
    }
}
