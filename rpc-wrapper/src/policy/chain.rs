use std::sync::Arc;

use crate::disposition::{ErrorDisposition, Proceed, ResponseDisposition};
use crate::listener::RpcListener;
use crate::request::{Request, RequestBuilder};
use crate::response::RpcResponse;
use crate::ClientError;

/// Two listeners sharing one context type, run as one.
///
/// Request hooks run `first`, then `second`. The decision hooks ask `first`;
/// only when it answers `Process` is `second` asked, and its answer stands.
/// The per-call context comes from `first`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use rpc_wrapper::RpcWrapper;
/// use rpc_wrapper::policy::{Chain, HeaderListener, ReauthContext, ReauthListener};
///
/// let csrf = Arc::new(HeaderListener::try_new("x-csrf-token", "none")?);
/// let listener = Chain::new(csrf.clone(), ReauthListener::new(login));
/// let wrapper = RpcWrapper::<ReauthContext>::with_listener(Arc::new(listener));
/// ```
#[derive(Debug)]
pub struct Chain<A, B> {
    first: A,
    second: Arc<B>,
}

impl<A, B> Chain<A, B> {
    /// Run `first`, then `second`.
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second: Arc::new(second),
        }
    }
}

impl<C, A, B> RpcListener<C> for Chain<A, B>
where
    C: Send + Sync + 'static,
    A: RpcListener<C>,
    B: RpcListener<C> + 'static,
{
    fn new_context(&self) -> C {
        self.first.new_context()
    }

    fn before_request_send(&self, request: &mut RequestBuilder, context: &Arc<C>) {
        self.first.before_request_send(request, context);
        self.second.before_request_send(request, context);
    }

    fn before_request_resend(&self, context: &Arc<C>) {
        self.first.before_request_resend(context);
        self.second.before_request_resend(context);
    }

    fn on_request_data_set(&self, context: &Arc<C>, call_name: Option<&str>) {
        self.first.on_request_data_set(context, call_name);
        self.second.on_request_data_set(context, call_name);
    }

    fn before_response_processing(
        &self,
        call_name: Option<&str>,
        request: &Request,
        response: &RpcResponse,
        context: &Arc<C>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        let second = self.second.clone();
        let name = call_name.map(str::to_string);
        let handle = request.clone();
        let seen = response.clone();
        let shared = context.clone();
        let next = Proceed::new(proceed.hook(), move |disposition: ResponseDisposition| {
            match disposition {
                ResponseDisposition::Process => {
                    second.before_response_processing(name.as_deref(), &handle, &seen, &shared, proceed)
                }
                decided => proceed.proceed(decided),
            }
        });
        self.first
            .before_response_processing(call_name, request, response, context, next);
    }

    fn before_error_processing(
        &self,
        request: &Request,
        error: &ClientError,
        context: &Arc<C>,
        proceed: Proceed<ErrorDisposition>,
    ) {
        let second = self.second.clone();
        let handle = request.clone();
        let seen = error.clone();
        let shared = context.clone();
        let next = Proceed::new(proceed.hook(), move |disposition: ErrorDisposition| match disposition {
            ErrorDisposition::Process => second.before_error_processing(&handle, &seen, &shared, proceed),
            decided => proceed.proceed(decided),
        });
        self.first.before_error_processing(request, error, context, next);
    }
}
