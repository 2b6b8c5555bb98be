//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use http::Method;

use crate::callback::RequestCallback;
use crate::disposition::{ErrorDisposition, Proceed, ResponseDisposition};
use crate::listener::RpcListener;
use crate::request::{OutgoingRequest, Request, RequestBuilder};
use crate::response::RpcResponse;
use crate::transport::Transport;
use crate::ClientError;

/// A serialized call to `com.example.Greeting.greet`.
pub(crate) const PAYLOAD: &[u8] =
    b"7|0|5|http://localhost/app/|ABC123|com.example.Greeting|greet|java.lang.String|1|2|3|4|1|5|";

/// A fresh attempt handle.
pub(crate) fn handle() -> Request {
    Request::next(Method::POST, "http://localhost/rpc".to_string())
}

/// A builder over a fresh [`RecordingTransport`].
pub(crate) fn builder() -> RequestBuilder {
    RequestBuilder::new(RecordingTransport::new(), Method::POST, "http://localhost/rpc")
}

/// Transport that records every attempt and completes it only when told to.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(OutgoingRequest, Arc<dyn RequestCallback>)>>,
    refuse_after: Mutex<Option<usize>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of attempts dispatched so far.
    pub(crate) fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn sent(&self, index: usize) -> OutgoingRequest {
        self.sent.lock().unwrap()[index].0.clone()
    }

    /// Refuse every dispatch once `n` attempts have been recorded.
    pub(crate) fn refuse_after(&self, n: usize) {
        *self.refuse_after.lock().unwrap() = Some(n);
    }

    /// Complete attempt `index` with a response.
    pub(crate) fn respond(&self, index: usize, response: RpcResponse) {
        let (request, callback) = self.take(index);
        callback.on_response(request.handle(), response);
    }

    /// Complete attempt `index` with an error.
    pub(crate) fn fail(&self, index: usize, error: ClientError) {
        let (request, callback) = self.take(index);
        callback.on_error(request.handle(), error);
    }

    fn take(&self, index: usize) -> (OutgoingRequest, Arc<dyn RequestCallback>) {
        let sent = self.sent.lock().unwrap();
        let (request, callback) = &sent[index];
        (request.clone(), callback.clone())
    }
}

impl Transport for RecordingTransport {
    fn dispatch(
        &self,
        request: OutgoingRequest,
        callback: Arc<dyn RequestCallback>,
    ) -> Result<(), ClientError> {
        let mut sent = self.sent.lock().unwrap();
        if let Some(limit) = *self.refuse_after.lock().unwrap() {
            if sent.len() >= limit {
                return Err(ClientError::transport("connection closed"));
            }
        }
        sent.push((request, callback));
        Ok(())
    }
}

/// Per-call context of [`RecordingListener`].
#[derive(Debug, Default)]
pub(crate) struct CallContext {
    pub(crate) sends: AtomicU32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Hook {
    NewContext,
    BeforeRequestSend,
    BeforeRequestResend,
    RequestDataSet(Option<String>),
    BeforeResponseProcessing(Option<String>),
    BeforeErrorProcessing,
}

/// Listener that records every hook and answers from a script.
///
/// Each decision hook pops the next scripted disposition; an empty script
/// means `Process`. Every attempt is stamped with an `x-attempt` header.
#[derive(Default)]
pub(crate) struct RecordingListener {
    hooks: Mutex<Vec<Hook>>,
    contexts: Mutex<Vec<Arc<CallContext>>>,
    responses: Mutex<VecDeque<ResponseDisposition>>,
    errors: Mutex<VecDeque<ErrorDisposition>>,
}

impl RecordingListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_responses(responses: Vec<ResponseDisposition>) -> Arc<Self> {
        let listener = Self::default();
        *listener.responses.lock().unwrap() = responses.into();
        Arc::new(listener)
    }

    pub(crate) fn with_errors(errors: Vec<ErrorDisposition>) -> Arc<Self> {
        let listener = Self::default();
        *listener.errors.lock().unwrap() = errors.into();
        Arc::new(listener)
    }

    pub(crate) fn hooks(&self) -> Vec<Hook> {
        self.hooks.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, hook: Hook) -> usize {
        self.hooks.lock().unwrap().iter().filter(|h| **h == hook).count()
    }

    /// Contexts seen by `before_request_send`, in order.
    pub(crate) fn contexts(&self) -> Vec<Arc<CallContext>> {
        self.contexts.lock().unwrap().clone()
    }

    fn record(&self, hook: Hook) {
        self.hooks.lock().unwrap().push(hook);
    }
}

impl RpcListener<CallContext> for RecordingListener {
    fn new_context(&self) -> CallContext {
        self.record(Hook::NewContext);
        CallContext::default()
    }

    fn before_request_send(&self, request: &mut RequestBuilder, context: &Arc<CallContext>) {
        self.record(Hook::BeforeRequestSend);
        self.contexts.lock().unwrap().push(context.clone());
        let attempt = context.sends.fetch_add(1, Ordering::SeqCst) + 1;
        request.try_set_header("x-attempt", &attempt.to_string()).unwrap();
    }

    fn before_request_resend(&self, _context: &Arc<CallContext>) {
        self.record(Hook::BeforeRequestResend);
    }

    fn on_request_data_set(&self, _context: &Arc<CallContext>, call_name: Option<&str>) {
        self.record(Hook::RequestDataSet(call_name.map(str::to_string)));
    }

    fn before_response_processing(
        &self,
        call_name: Option<&str>,
        _request: &Request,
        _response: &RpcResponse,
        _context: &Arc<CallContext>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        self.record(Hook::BeforeResponseProcessing(call_name.map(str::to_string)));
        let disposition = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ResponseDisposition::Process);
        proceed.proceed(disposition);
    }

    fn before_error_processing(
        &self,
        _request: &Request,
        _error: &ClientError,
        _context: &Arc<CallContext>,
        proceed: Proceed<ErrorDisposition>,
    ) {
        self.record(Hook::BeforeErrorProcessing);
        let disposition = self
            .errors
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ErrorDisposition::Process);
        proceed.proceed(disposition);
    }
}

/// Real callback that records what it was handed.
#[derive(Default)]
pub(crate) struct Outcomes {
    responses: Mutex<Vec<(Request, RpcResponse)>>,
    errors: Mutex<Vec<(Request, ClientError)>>,
}

impl Outcomes {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn responses(&self) -> Vec<(Request, RpcResponse)> {
        self.responses.lock().unwrap().clone()
    }

    pub(crate) fn errors(&self) -> Vec<(Request, ClientError)> {
        self.errors.lock().unwrap().clone()
    }
}

impl RequestCallback for Outcomes {
    fn on_response(self: Arc<Self>, request: &Request, response: RpcResponse) {
        self.responses.lock().unwrap().push((request.clone(), response));
    }

    fn on_error(self: Arc<Self>, request: &Request, error: ClientError) {
        self.errors.lock().unwrap().push((request.clone(), error));
    }
}
