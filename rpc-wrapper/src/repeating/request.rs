use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;

use super::RepeatingCallback;
use crate::call_name::CallNameResolver;
use crate::listener::{ListenerSlot, RpcListener};
use crate::request::{Request, RequestBuilder};
use crate::ClientError;

/// State of one logical call, shared by all of its attempts.
struct PendingRequest<C> {
    builder: RequestBuilder,
    payload: Option<Bytes>,
    call_name: Option<String>,
    callback: Weak<RepeatingCallback<C>>,
}

/// A request builder that can send the same call again.
///
/// Wraps the underlying [`RequestBuilder`] and fires the listener's request
/// hooks around it. The per-call context is created exactly once, when the
/// request is constructed, and is shared by every resend.
pub struct RepeatingRequest<C> {
    listeners: Arc<ListenerSlot<C>>,
    resolver: Arc<dyn CallNameResolver>,
    context: Arc<C>,
    pending: Mutex<PendingRequest<C>>,
}

impl<C> fmt::Debug for RepeatingRequest<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.lock();
        f.debug_struct("RepeatingRequest")
            .field("builder", &pending.builder)
            .field("call_name", &pending.call_name)
            .finish_non_exhaustive()
    }
}

impl<C> RepeatingRequest<C>
where
    C: Send + Sync + 'static,
{
    pub(crate) fn new(
        builder: RequestBuilder,
        listeners: Arc<ListenerSlot<C>>,
        resolver: Arc<dyn CallNameResolver>,
    ) -> Arc<Self> {
        #[cfg(feature = "tracing")]
        tracing::trace!(method = %builder.method(), url = builder.url(), "creating repeating request");
        let context = Arc::new(listeners.current().new_context());
        Arc::new(Self {
            listeners,
            resolver,
            context,
            pending: Mutex::new(PendingRequest {
                builder,
                payload: None,
                call_name: None,
                callback: Weak::new(),
            }),
        })
    }

    /// The listener context of this call.
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// The call name derived from the current payload, if any.
    pub fn call_name(&self) -> Option<String> {
        self.lock().call_name.clone()
    }

    /// The payload every attempt of this call sends.
    pub fn payload(&self) -> Option<Bytes> {
        self.lock().payload.clone()
    }

    pub(crate) fn listener(&self) -> Arc<dyn RpcListener<C>> {
        self.listeners.current()
    }

    /// Register the paired callback used by [`send`](Self::send).
    ///
    /// Only a weak reference is kept; the callback holds the strong reference
    /// back to this request.
    pub fn set_callback(&self, callback: &Arc<RepeatingCallback<C>>) {
        #[cfg(feature = "tracing")]
        tracing::trace!("set_callback()");
        let mut pending = self.lock();
        callback.set_call_name(pending.call_name.clone());
        pending.callback = Arc::downgrade(callback);
    }

    /// Fix the payload of this call.
    ///
    /// Derives the call name, stores both, passes the name on to the paired
    /// callback if one is registered, hands the payload to the underlying
    /// builder and then tells the listener.
    pub fn set_payload(&self, data: Bytes) {
        #[cfg(feature = "tracing")]
        tracing::trace!(len = data.len(), "set_payload()");
        let call_name = self.resolver.call_name(&data);
        let callback = {
            let mut pending = self.lock();
            pending.builder.set_request_data(data.clone());
            pending.payload = Some(data);
            pending.call_name = call_name.clone();
            pending.callback.upgrade()
        };
        if let Some(callback) = callback {
            callback.set_call_name(call_name.clone());
        }
        self.listener()
            .on_request_data_set(&self.context, call_name.as_deref());
    }

    /// Send the stored payload to the registered callback.
    ///
    /// Fires `before_request_send` first and hands the current call name to
    /// the callback. Fails without firing anything if no callback is
    /// registered or it is already gone.
    pub fn send(&self) -> Result<Request, ClientError> {
        #[cfg(feature = "tracing")]
        tracing::trace!("send()");
        let (callback, call_name) = {
            let pending = self.lock();
            (pending.callback.upgrade(), pending.call_name.clone())
        };
        let callback = callback.ok_or_else(|| ClientError::invalid_request("no callback registered"))?;
        callback.set_call_name(call_name);
        let builder = self.prepare_attempt();
        let data = builder.request_data().cloned().unwrap_or_default();
        builder.send_request(data, callback)
    }

    /// Send `data` and deliver the outcome to `callback`.
    ///
    /// Fires `before_request_send`, stores `data` as the payload any resend
    /// will reuse, and passes the current call name on to `callback`.
    pub fn send_with_callback(
        &self,
        data: Bytes,
        callback: &Arc<RepeatingCallback<C>>,
    ) -> Result<Request, ClientError> {
        #[cfg(feature = "tracing")]
        tracing::trace!(len = data.len(), "send_with_callback()");
        let builder = self.prepare_attempt();
        let call_name = {
            let mut pending = self.lock();
            pending.payload = Some(data.clone());
            pending.call_name.clone()
        };
        callback.set_call_name(call_name);
        builder.send_request(data, callback.clone())
    }

    /// Send the same payload again through the same callback.
    ///
    /// Fires `before_request_resend`, then proceeds as
    /// [`send_with_callback`](Self::send_with_callback) with the payload
    /// captured by the most recent `set_payload` or `send_with_callback`.
    ///
    /// `before_request_send` fires before the transport is asked, so a resend
    /// the transport refuses has still been counted by the listener once.
    pub fn resend(&self, callback: &Arc<RepeatingCallback<C>>) -> Result<Request, ClientError> {
        #[cfg(feature = "tracing")]
        tracing::trace!("resend()");
        self.listener().before_request_resend(&self.context);
        let data = self
            .payload()
            .ok_or_else(|| ClientError::invalid_request("no payload captured to resend"))?;
        self.send_with_callback(data, callback)
    }

    /// Fire `before_request_send` on a copy of the builder and keep the result.
    ///
    /// The lock is not held while the hook runs, so the listener may inspect
    /// this request. The transport gets its own copy, so a completion can
    /// re-enter this request without contending for the lock.
    fn prepare_attempt(&self) -> RequestBuilder {
        let listener = self.listener();
        let mut builder = self.lock().builder.clone();
        listener.before_request_send(&mut builder, &self.context);
        self.lock().builder = builder.clone();
        builder
    }
}

impl<C> RepeatingRequest<C> {
    fn lock(&self) -> MutexGuard<'_, PendingRequest<C>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
