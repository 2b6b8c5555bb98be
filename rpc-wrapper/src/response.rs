//! Response type delivered to callbacks.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A completed HTTP exchange for one attempt.
///
/// Any HTTP status counts as a response; only failures to complete the
/// exchange are reported on the error path. Whether a 401 or a 503 means the
/// call should be repeated is for the listener to decide.
#[derive(Clone, Debug)]
pub struct RpcResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RpcResponse {
    /// Create a new response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a `200 OK` response with the given body and no headers.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body.into())
    }

    /// HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Response body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Consume the response, returning its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let response = RpcResponse::ok("//OK[1,[],0,7]");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.is_success());
        assert_eq!(response.text(), Some("//OK[1,[],0,7]"));
    }

    #[test]
    fn test_non_utf8_text() {
        let response = RpcResponse::new(
            StatusCode::UNAUTHORIZED,
            HeaderMap::new(),
            Bytes::from_static(&[0xff, 0xfe]),
        );
        assert!(!response.is_success());
        assert!(response.text().is_none());
        assert_eq!(response.into_body().len(), 2);
    }
}
