//! Call name derivation.
//!
//! Listeners are told which remote method a call targets (`Service.method`).
//! That name is not carried separately on the wire, so it is recovered from
//! the serialized payload by a [`CallNameResolver`]. Resolvers depend on the
//! exact serialization format and must be re-checked whenever it changes.

/// Derives a human-readable call identifier from a serialized payload.
///
/// Must return the same name for the same payload. `None` means the payload
/// does not carry a recognizable name; listeners then see no call name.
pub trait CallNameResolver: Send + Sync {
    /// Derive the call name for `payload`.
    fn call_name(&self, payload: &[u8]) -> Option<String>;
}

impl<F> CallNameResolver for F
where
    F: Fn(&[u8]) -> Option<String> + Send + Sync,
{
    fn call_name(&self, payload: &[u8]) -> Option<String> {
        self(payload)
    }
}

/// Resolver for `|`-delimited serialized RPC streams.
///
/// The stream layout is
/// `version|flags|string-count|module-base|policy|Service|method|...`, so the
/// call name is fields six and seven joined with a dot.
///
/// # Example
///
/// ```
/// use rpc_wrapper::{CallNameResolver, PipeDelimitedResolver};
///
/// let payload = b"7|0|5|http://host/app/|ABC123|com.example.Greeting|greet|1|2|3|4|0|";
/// assert_eq!(
///     PipeDelimitedResolver.call_name(payload).as_deref(),
///     Some("com.example.Greeting.greet")
/// );
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct PipeDelimitedResolver;

const SERVICE_FIELD: usize = 5;

impl CallNameResolver for PipeDelimitedResolver {
    fn call_name(&self, payload: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(payload).ok()?;
        let mut fields = text.split('|').skip(SERVICE_FIELD);
        let service = fields.next()?;
        let method = fields.next()?;
        if service.is_empty() || method.is_empty() {
            return None;
        }
        Some(format!("{}.{}", service, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_delimited_extracts_service_and_method() {
        let payload = b"7|0|7|http://localhost:8080/app/|29F4EA1240F157649C12466F01F46F60|com.example.client.LoginService|login|java.lang.String/2004016611|alice|secret|1|2|3|4|2|5|5|6|7|";
        assert_eq!(
            PipeDelimitedResolver.call_name(payload).as_deref(),
            Some("com.example.client.LoginService.login")
        );
    }

    #[test]
    fn test_pipe_delimited_ignores_trailing_fields() {
        let payload = b"7|0|4|base|policy|Svc|m";
        assert_eq!(
            PipeDelimitedResolver.call_name(payload).as_deref(),
            Some("Svc.m")
        );
    }

    #[test]
    fn test_pipe_delimited_short_payload() {
        assert!(PipeDelimitedResolver.call_name(b"7|0|4|base|policy|Svc").is_none());
        assert!(PipeDelimitedResolver.call_name(b"").is_none());
        assert!(PipeDelimitedResolver.call_name(b"{\"json\":true}").is_none());
    }

    #[test]
    fn test_pipe_delimited_empty_fields() {
        assert!(PipeDelimitedResolver.call_name(b"7|0|4|base|policy||m|").is_none());
    }

    #[test]
    fn test_pipe_delimited_non_utf8() {
        assert!(PipeDelimitedResolver.call_name(&[0xff, b'|', 0xfe]).is_none());
    }

    #[test]
    fn test_pipe_delimited_is_stable() {
        let payload = b"7|0|4|base|policy|Svc|m|";
        let first = PipeDelimitedResolver.call_name(payload);
        let second = PipeDelimitedResolver.call_name(payload);
        assert_eq!(first, second);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |payload: &[u8]| {
            std::str::from_utf8(payload)
                .ok()
                .and_then(|s| s.split_once(' '))
                .map(|(name, _)| name.to_string())
        };
        assert_eq!(
            resolver.call_name(b"Echo.say hello").as_deref(),
            Some("Echo.say")
        );
    }
}
