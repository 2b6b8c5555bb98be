use std::sync::{Arc, PoisonError, RwLock};

use http::header::{HeaderName, HeaderValue};

use crate::listener::RpcListener;
use crate::request::RequestBuilder;
use crate::ClientError;

/// Sets one header on every attempt.
///
/// The value can be changed while calls are in flight; each attempt carries
/// the value current when it is sent, so a resend after a token rotation
/// picks up the new token.
///
/// # Example
///
/// ```
/// use rpc_wrapper::policy::HeaderListener;
///
/// let csrf = HeaderListener::try_new("x-csrf-token", "initial").unwrap();
/// csrf.set_value("rotated").unwrap();
/// assert_eq!(csrf.value(), "rotated");
/// ```
#[derive(Debug)]
pub struct HeaderListener {
    name: HeaderName,
    value: RwLock<HeaderValue>,
}

impl HeaderListener {
    /// Create a header listener, returning an error if the name or value is invalid.
    pub fn try_new(name: &str, value: &str) -> Result<Self, ClientError> {
        let name = name
            .parse()
            .map_err(|_| ClientError::invalid_request(format!("invalid header name: {}", name)))?;
        Ok(Self::from_parts(name, parse_value(value)?))
    }

    /// Create a header listener from pre-parsed values.
    pub fn from_parts(name: HeaderName, value: HeaderValue) -> Self {
        Self {
            name,
            value: RwLock::new(value),
        }
    }

    /// Name of the header.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Value sent with the next attempt.
    pub fn value(&self) -> HeaderValue {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the value sent with later attempts.
    pub fn set_value(&self, value: &str) -> Result<(), ClientError> {
        let value = parse_value(value)?;
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
        Ok(())
    }

    /// Stamp the header onto `request`.
    pub fn apply(&self, request: &mut RequestBuilder) {
        request.set_header(self.name.clone(), self.value());
    }
}

fn parse_value(value: &str) -> Result<HeaderValue, ClientError> {
    value
        .parse()
        .map_err(|_| ClientError::invalid_request(format!("invalid header value: {}", value)))
}

impl<C: Default> RpcListener<C> for HeaderListener {
    fn new_context(&self) -> C {
        C::default()
    }

    fn before_request_send(&self, request: &mut RequestBuilder, _context: &Arc<C>) {
        self.apply(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use http::Method;

    #[test]
    fn test_try_new_rejects_invalid() {
        assert!(HeaderListener::try_new("bad name", "v").is_err());
        assert!(HeaderListener::try_new("x-ok", "bad\nvalue").is_err());
    }

    #[test]
    fn test_sets_current_value_on_each_send() {
        let listener = HeaderListener::try_new("x-csrf-token", "one").unwrap();
        let mut builder = RequestBuilder::new(RecordingTransport::new(), Method::POST, "http://localhost/rpc");
        let context = Arc::new(());

        listener.before_request_send(&mut builder, &context);
        assert_eq!(builder.headers().get("x-csrf-token").unwrap(), "one");

        listener.set_value("two").unwrap();
        listener.before_request_send(&mut builder, &context);
        assert_eq!(builder.headers().get("x-csrf-token").unwrap(), "two");
        assert_eq!(builder.headers().get_all("x-csrf-token").iter().count(), 1);
    }

    #[test]
    fn test_set_value_keeps_old_value_on_error() {
        let listener = HeaderListener::try_new("x-csrf-token", "one").unwrap();
        assert!(listener.set_value("bad\r\n").is_err());
        assert_eq!(listener.value(), "one");
    }
}
