use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use super::RepeatingRequest;
use crate::callback::RequestCallback;
use crate::disposition::{ErrorDisposition, Proceed, ResponseDisposition};
use crate::request::Request;
use crate::response::RpcResponse;
use crate::ClientError;

/// Stands in for the application's callback on a wrapped call.
///
/// Every outcome is first shown to the listener; only what the listener lets
/// through reaches the real callback. Exactly one terminal delivery happens
/// per logical call, after any number of repeats.
pub struct RepeatingCallback<C> {
    request: Arc<RepeatingRequest<C>>,
    real: Arc<dyn RequestCallback>,
    call_name: Mutex<Option<String>>,
}

impl<C> fmt::Debug for RepeatingCallback<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatingCallback")
            .field("call_name", &self.call_name())
            .finish_non_exhaustive()
    }
}

impl<C> RepeatingCallback<C> {
    /// The call name assigned by the paired request.
    pub fn call_name(&self) -> Option<String> {
        self.call_name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_call_name(&self, call_name: Option<String>) {
        *self.call_name.lock().unwrap_or_else(PoisonError::into_inner) = call_name;
    }
}

impl<C> RepeatingCallback<C>
where
    C: Send + Sync + 'static,
{
    /// Pair a callback with `request`, delivering final outcomes to `real`.
    pub(crate) fn new(request: Arc<RepeatingRequest<C>>, real: Arc<dyn RequestCallback>) -> Arc<Self> {
        let call_name = request.call_name();
        Arc::new(Self {
            request,
            real,
            call_name: Mutex::new(call_name),
        })
    }

    /// The request this callback is paired with.
    pub fn request(&self) -> &Arc<RepeatingRequest<C>> {
        &self.request
    }

    fn on_response_disposition(
        self: Arc<Self>,
        request: &Request,
        response: RpcResponse,
        disposition: ResponseDisposition,
    ) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            request_id = request.id(),
            disposition = disposition.name(),
            "response disposition"
        );
        match disposition {
            ResponseDisposition::Process => self.real.clone().on_response(request, response),
            ResponseDisposition::Repeat => self.repeat(request),
            ResponseDisposition::ReturnError(error) => self.real.clone().on_error(request, error),
        }
    }

    fn on_error_disposition(
        self: Arc<Self>,
        request: &Request,
        error: ClientError,
        disposition: ErrorDisposition,
    ) {
        #[cfg(feature = "tracing")]
        tracing::trace!(
            request_id = request.id(),
            disposition = disposition.name(),
            "error disposition"
        );
        match disposition {
            ErrorDisposition::Process => self.real.clone().on_error(request, error),
            ErrorDisposition::Repeat => self.repeat(request),
            ErrorDisposition::ReplaceError(replacement) => {
                self.real.clone().on_error(request, replacement)
            }
        }
    }

    /// Resend through this same callback; a refused resend ends the call.
    fn repeat(self: Arc<Self>, request: &Request) {
        if let Err(e) = self.request.resend(&self) {
            #[cfg(feature = "tracing")]
            tracing::error!(
                request_id = request.id(),
                url = request.url(),
                error = %e,
                "error while re-sending request"
            );
            self.real.clone().on_error(request, ClientError::resend(e));
        }
    }
}

impl<C> RequestCallback for RepeatingCallback<C>
where
    C: Send + Sync + 'static,
{
    fn on_response(self: Arc<Self>, request: &Request, response: RpcResponse) {
        #[cfg(feature = "tracing")]
        tracing::trace!(request_id = request.id(), status = %response.status(), "on_response()");
        let listener = self.request.listener();
        let context = self.request.context().clone();
        let call_name = self.call_name();

        let this = self.clone();
        let handle = request.clone();
        let delivered = response.clone();
        let proceed = Proceed::new("before_response_processing", move |disposition: ResponseDisposition| {
            this.on_response_disposition(&handle, delivered, disposition)
        });
        listener.before_response_processing(
            call_name.as_deref(),
            request,
            &response,
            &context,
            proceed,
        );
    }

    fn on_error(self: Arc<Self>, request: &Request, error: ClientError) {
        #[cfg(feature = "tracing")]
        tracing::trace!(request_id = request.id(), error = %error, "on_error()");
        let listener = self.request.listener();
        let context = self.request.context().clone();

        let this = self.clone();
        let handle = request.clone();
        let original = error.clone();
        let proceed = Proceed::new("before_error_processing", move |disposition: ErrorDisposition| {
            this.on_error_disposition(&handle, original, disposition)
        });
        listener.before_error_processing(request, &error, &context, proceed);
    }
}
