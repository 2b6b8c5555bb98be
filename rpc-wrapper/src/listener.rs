//! The policy contract.
//!
//! An [`RpcListener`] is the single extension point of the wrapper. It sees
//! every wrapped call at six points of its lifecycle and, for completed
//! attempts, decides what happens next through a [`Proceed`] handle.
//!
//! All hooks for one call fire in order, one attempt at a time:
//!
//! 1. [`new_context`](RpcListener::new_context) once per logical call
//! 2. [`on_request_data_set`](RpcListener::on_request_data_set) once the payload is fixed
//! 3. [`before_request_send`](RpcListener::before_request_send) before every attempt
//! 4. [`before_response_processing`](RpcListener::before_response_processing) or
//!    [`before_error_processing`](RpcListener::before_error_processing)
//! 5. on `Repeat`: [`before_request_resend`](RpcListener::before_request_resend), then back to 3
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use rpc_wrapper::{Proceed, Request, RpcListener, RpcResponse, ResponseDisposition};
//!
//! /// Repeats a call once if the server answers 503.
//! struct RepeatOnce;
//!
//! impl RpcListener<AtomicU32> for RepeatOnce {
//!     fn new_context(&self) -> AtomicU32 {
//!         AtomicU32::new(0)
//!     }
//!
//!     fn before_response_processing(
//!         &self,
//!         _call_name: Option<&str>,
//!         _request: &Request,
//!         response: &RpcResponse,
//!         resends: &Arc<AtomicU32>,
//!         proceed: Proceed<ResponseDisposition>,
//!     ) {
//!         if response.status() == 503 && resends.fetch_add(1, Ordering::Relaxed) == 0 {
//!             proceed.proceed(ResponseDisposition::Repeat);
//!         } else {
//!             proceed.proceed(ResponseDisposition::Process);
//!         }
//!     }
//! }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use crate::disposition::{ErrorDisposition, Proceed, ResponseDisposition};
use crate::request::{Request, RequestBuilder};
use crate::response::RpcResponse;
use crate::ClientError;

/// Policy invoked around every wrapped call.
///
/// `C` is the per-call context: created once by
/// [`new_context`](Self::new_context), shared by every attempt of the call and
/// never looked at by the wrapper itself. Hooks receive it behind an `Arc` so a
/// listener can keep it across an asynchronous decision; mutate it through
/// interior mutability.
///
/// Every hook except `new_context` has a pass-through default, so a listener
/// only implements the points it cares about.
pub trait RpcListener<C>: Send + Sync {
    /// Create the context for a new logical call.
    fn new_context(&self) -> C;

    /// Called immediately before every attempt, including the first.
    ///
    /// `request` is the underlying builder; headers set here go out with this
    /// attempt and every later one unless changed again.
    fn before_request_send(&self, request: &mut RequestBuilder, context: &Arc<C>) {
        let _ = (request, context);
    }

    /// Called when a resend has been decided, before the resent attempt's
    /// [`before_request_send`](Self::before_request_send).
    fn before_request_resend(&self, context: &Arc<C>) {
        let _ = context;
    }

    /// Called once the payload of the call, and so its call name, is fixed.
    fn on_request_data_set(&self, context: &Arc<C>, call_name: Option<&str>) {
        let _ = (context, call_name);
    }

    /// Called when an attempt completed with a response.
    ///
    /// Must invoke `proceed` exactly once. Until it does, the call is parked.
    fn before_response_processing(
        &self,
        call_name: Option<&str>,
        request: &Request,
        response: &RpcResponse,
        context: &Arc<C>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        let _ = (call_name, request, response, context);
        proceed.proceed(ResponseDisposition::Process);
    }

    /// Called when an attempt failed.
    ///
    /// Must invoke `proceed` exactly once. Until it does, the call is parked.
    fn before_error_processing(
        &self,
        request: &Request,
        error: &ClientError,
        context: &Arc<C>,
        proceed: Proceed<ErrorDisposition>,
    ) {
        let _ = (request, error, context);
        proceed.proceed(ErrorDisposition::Process);
    }
}

impl<C, L> RpcListener<C> for Arc<L>
where
    L: RpcListener<C> + ?Sized,
{
    fn new_context(&self) -> C {
        (**self).new_context()
    }

    fn before_request_send(&self, request: &mut RequestBuilder, context: &Arc<C>) {
        (**self).before_request_send(request, context)
    }

    fn before_request_resend(&self, context: &Arc<C>) {
        (**self).before_request_resend(context)
    }

    fn on_request_data_set(&self, context: &Arc<C>, call_name: Option<&str>) {
        (**self).on_request_data_set(context, call_name)
    }

    fn before_response_processing(
        &self,
        call_name: Option<&str>,
        request: &Request,
        response: &RpcResponse,
        context: &Arc<C>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        (**self).before_response_processing(call_name, request, response, context, proceed)
    }

    fn before_error_processing(
        &self,
        request: &Request,
        error: &ClientError,
        context: &Arc<C>,
        proceed: Proceed<ErrorDisposition>,
    ) {
        (**self).before_error_processing(request, error, context, proceed)
    }
}

/// The pass-through listener.
///
/// Processes every response and error unchanged and creates a default
/// context, so a wrapped client behaves exactly like an unwrapped one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRpcListener;

impl<C: Default> RpcListener<C> for DefaultRpcListener {
    fn new_context(&self) -> C {
        C::default()
    }
}

/// The active listener of a wrapper, shared with every call it creates.
///
/// Hooks always go to whichever listener is installed when they fire.
pub(crate) struct ListenerSlot<C> {
    listener: RwLock<Arc<dyn RpcListener<C>>>,
}

impl<C> ListenerSlot<C> {
    pub(crate) fn new(listener: Arc<dyn RpcListener<C>>) -> Self {
        Self {
            listener: RwLock::new(listener),
        }
    }

    pub(crate) fn current(&self) -> Arc<dyn RpcListener<C>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace(&self, listener: Arc<dyn RpcListener<C>>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }
}
