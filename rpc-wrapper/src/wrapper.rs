//! The wrapper facade.
//!
//! [`RpcWrapper`] owns the active listener and installs the intercepting
//! request strategy into client handles.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::call_name::{CallNameResolver, PipeDelimitedResolver};
use crate::callback::RequestCallback;
use crate::client::{PendingCall, RpcClient, RpcRequestBuilder};
use crate::listener::{DefaultRpcListener, ListenerSlot, RpcListener};
use crate::repeating::{RepeatingCallback, RepeatingRequest};
use crate::request::{Request, RequestBuilder};
use crate::ClientError;

/// Intercepts every call of the clients it wraps.
///
/// The listener can be replaced at any time. Calls already in flight pick up
/// the new listener at their next hook.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use rpc_wrapper::{RpcClient, RpcWrapper};
/// use rpc_wrapper::policy::{RetryListener, RetryPolicy};
///
/// let wrapper = RpcWrapper::with_listener(Arc::new(RetryListener::new(RetryPolicy::default())));
/// let client = wrapper.wrap(RpcClient::builder("http://localhost:3000/app/greet").build()?);
/// ```
pub struct RpcWrapper<C> {
    listeners: Arc<ListenerSlot<C>>,
    resolver: Arc<dyn CallNameResolver>,
}

impl<C> Clone for RpcWrapper<C> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<C> fmt::Debug for RpcWrapper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcWrapper").finish_non_exhaustive()
    }
}

impl<C> Default for RpcWrapper<C>
where
    C: Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RpcWrapper<C>
where
    C: Default + Send + Sync + 'static,
{
    /// Create a wrapper with the pass-through [`DefaultRpcListener`].
    pub fn new() -> Self {
        Self::with_listener(Arc::new(DefaultRpcListener))
    }
}

impl<C> RpcWrapper<C>
where
    C: Send + Sync + 'static,
{
    /// Create a wrapper with the given listener installed.
    pub fn with_listener(listener: Arc<dyn RpcListener<C>>) -> Self {
        Self {
            listeners: Arc::new(ListenerSlot::new(listener)),
            resolver: Arc::new(PipeDelimitedResolver),
        }
    }

    /// Derive call names with `resolver` instead of [`PipeDelimitedResolver`].
    ///
    /// Affects clients wrapped after this call.
    pub fn call_name_resolver<R: CallNameResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Install a new listener.
    pub fn set_listener(&self, listener: Arc<dyn RpcListener<C>>) {
        #[cfg(feature = "tracing")]
        tracing::debug!("installing rpc listener");
        self.listeners.replace(listener);
    }

    /// The currently installed listener.
    pub fn listener(&self) -> Arc<dyn RpcListener<C>> {
        self.listeners.current()
    }

    /// Route every call of `client` through this wrapper's listener.
    ///
    /// Replaces the client's request strategy, so wrapping an already wrapped
    /// client does not stack interception.
    pub fn wrap(&self, mut client: RpcClient) -> RpcClient {
        #[cfg(feature = "tracing")]
        tracing::debug!(entry_point = client.entry_point(), "wrapping rpc client");
        client.set_request_builder(Arc::new(WrappedRpcBuilder {
            listeners: self.listeners.clone(),
            resolver: self.resolver.clone(),
        }));
        client
    }
}

/// Request strategy installed by [`RpcWrapper::wrap`].
///
/// Creates a [`RepeatingRequest`] and its [`RepeatingCallback`] together for
/// every call.
pub struct WrappedRpcBuilder<C> {
    listeners: Arc<ListenerSlot<C>>,
    resolver: Arc<dyn CallNameResolver>,
}

impl<C> fmt::Debug for WrappedRpcBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedRpcBuilder").finish_non_exhaustive()
    }
}

impl<C> RpcRequestBuilder for WrappedRpcBuilder<C>
where
    C: Send + Sync + 'static,
{
    fn create(&self, builder: RequestBuilder, callback: Arc<dyn RequestCallback>) -> Box<dyn PendingCall> {
        let request = RepeatingRequest::new(builder, self.listeners.clone(), self.resolver.clone());
        let callback = RepeatingCallback::new(request.clone(), callback);
        request.set_callback(&callback);
        Box::new(WrappedCall { request, callback })
    }
}

/// Keeps the callback alive until the first attempt hands it to the transport.
struct WrappedCall<C> {
    request: Arc<RepeatingRequest<C>>,
    callback: Arc<RepeatingCallback<C>>,
}

impl<C> PendingCall for WrappedCall<C>
where
    C: Send + Sync + 'static,
{
    fn set_payload(&mut self, payload: Bytes) {
        self.request.set_payload(payload);
    }

    fn send(self: Box<Self>) -> Result<Request, ClientError> {
        let Self { request, callback: _pending } = *self;
        request.send()
    }
}
