//! Listener decisions and the continuation that carries them.
//!
//! When a response or error arrives for a wrapped call, the active
//! [`RpcListener`](crate::RpcListener) is handed a [`Proceed`] handle and must
//! eventually invoke it with a disposition. The disposition decides whether the
//! real callback sees the outcome, the request is sent again, or the outcome is
//! replaced.

use std::fmt;

use crate::ClientError;

/// What to do with a response that arrived for a wrapped call.
#[derive(Clone, Debug)]
pub enum ResponseDisposition {
    /// Deliver the response to the real callback.
    Process,
    /// Discard the response and send the same request again.
    Repeat,
    /// Deliver this error to the real callback instead of the response.
    ReturnError(ClientError),
}

impl ResponseDisposition {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseDisposition::Process => "process",
            ResponseDisposition::Repeat => "repeat",
            ResponseDisposition::ReturnError(_) => "return_error",
        }
    }
}

/// What to do with an error that arrived for a wrapped call.
#[derive(Clone, Debug)]
pub enum ErrorDisposition {
    /// Deliver the original error to the real callback.
    Process,
    /// Discard the error and send the same request again.
    Repeat,
    /// Deliver this error to the real callback instead of the original one.
    ReplaceError(ClientError),
}

impl ErrorDisposition {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorDisposition::Process => "process",
            ErrorDisposition::Repeat => "repeat",
            ErrorDisposition::ReplaceError(_) => "replace_error",
        }
    }
}

/// One-shot continuation handed to a listener's decision hooks.
///
/// Calling [`proceed`](Proceed::proceed) consumes the handle, so a listener
/// can decide at most once per attempt. It may decide synchronously inside the
/// hook or later (after a re-login round trip, say) by moving the handle into
/// a task.
///
/// A handle that is dropped without being invoked stalls the call: the real
/// callback never hears about this attempt. That is a listener bug and is
/// logged at `error` level.
pub struct Proceed<D> {
    hook: &'static str,
    continuation: Option<Box<dyn FnOnce(D) + Send>>,
}

impl<D> Proceed<D> {
    /// Create a continuation for the named hook.
    ///
    /// Listeners never need this; it exists so listener implementations can be
    /// driven directly in tests.
    pub fn new<F>(hook: &'static str, continuation: F) -> Self
    where
        F: FnOnce(D) + Send + 'static,
    {
        Self {
            hook,
            continuation: Some(Box::new(continuation)),
        }
    }

    /// Name of the hook this continuation belongs to.
    pub fn hook(&self) -> &'static str {
        self.hook
    }

    /// Resume the call with the given disposition.
    pub fn proceed(mut self, disposition: D) {
        if let Some(continuation) = self.continuation.take() {
            continuation(disposition);
        }
    }
}

impl<D> Drop for Proceed<D> {
    fn drop(&mut self) {
        if self.continuation.is_some() {
            #[cfg(feature = "tracing")]
            tracing::error!(
                hook = self.hook,
                "listener dropped its proceed handle; the call will never complete"
            );
        }
    }
}

impl<D> fmt::Debug for Proceed<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed")
            .field("hook", &self.hook)
            .field("pending", &self.continuation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_proceed_runs_continuation_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let proceed = Proceed::new("before_response_processing", move |d: ResponseDisposition| {
            seen_clone.lock().unwrap().push(d.name());
        });

        assert_eq!(proceed.hook(), "before_response_processing");
        proceed.proceed(ResponseDisposition::Repeat);

        assert_eq!(*seen.lock().unwrap(), vec!["repeat"]);
    }

    #[test]
    fn test_dropped_proceed_releases_captures() {
        let token = Arc::new(());
        let captured = token.clone();
        let proceed = Proceed::new("before_error_processing", move |_: ErrorDisposition| {
            let _ = &captured;
        });
        assert_eq!(Arc::strong_count(&token), 2);

        drop(proceed);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn test_disposition_names() {
        assert_eq!(ResponseDisposition::Process.name(), "process");
        assert_eq!(
            ResponseDisposition::ReturnError(ClientError::invocation("x")).name(),
            "return_error"
        );
        assert_eq!(ErrorDisposition::Repeat.name(), "repeat");
        assert_eq!(
            ErrorDisposition::ReplaceError(ClientError::invocation("x")).name(),
            "replace_error"
        );
    }
}
