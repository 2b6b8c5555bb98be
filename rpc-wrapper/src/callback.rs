//! Completion callbacks.
//!
//! A transport reports the outcome of every attempt through exactly one call
//! to a [`RequestCallback`]: either [`on_response`](RequestCallback::on_response)
//! or [`on_error`](RequestCallback::on_error). Both take `self: Arc<Self>` so a
//! callback can hand itself on, which is how a repeating callback resends
//! through the same pairing.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::request::Request;
use crate::response::RpcResponse;
use crate::ClientError;

/// Receiver of the outcome of a sent request.
pub trait RequestCallback: Send + Sync {
    /// Called when the exchange completed with a response.
    fn on_response(self: Arc<Self>, request: &Request, response: RpcResponse);

    /// Called when the exchange failed.
    fn on_error(self: Arc<Self>, request: &Request, error: ClientError);
}

/// A callback built from a closure taking the outcome as a `Result`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rpc_wrapper::{FnCallback, RequestCallback};
///
/// let callback: Arc<dyn RequestCallback> = Arc::new(FnCallback::new(|request, outcome| {
///     match outcome {
///         Ok(response) => println!("{} -> {}", request.url(), response.status()),
///         Err(e) => eprintln!("{} failed: {}", request.url(), e),
///     }
/// }));
/// ```
pub struct FnCallback<F> {
    func: F,
}

impl<F> FnCallback<F>
where
    F: Fn(&Request, Result<RpcResponse, ClientError>) + Send + Sync,
{
    /// Create a new closure callback.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> RequestCallback for FnCallback<F>
where
    F: Fn(&Request, Result<RpcResponse, ClientError>) + Send + Sync,
{
    fn on_response(self: Arc<Self>, request: &Request, response: RpcResponse) {
        (self.func)(request, Ok(response));
    }

    fn on_error(self: Arc<Self>, request: &Request, error: ClientError) {
        (self.func)(request, Err(error));
    }
}

/// A callback that forwards the first outcome into a oneshot channel.
///
/// Used to bridge the callback protocol into `async` code. If the callback is
/// dropped without ever being completed, the receiver observes a closed
/// channel.
#[derive(Debug)]
pub struct ChannelCallback {
    sender: Mutex<Option<oneshot::Sender<Result<RpcResponse, ClientError>>>>,
}

impl ChannelCallback {
    /// Create a callback and the receiver for its outcome.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Result<RpcResponse, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        let callback = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (callback, rx)
    }

    fn complete(&self, outcome: Result<RpcResponse, ClientError>) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            // Receiver gone means the caller stopped waiting.
            let _ = sender.send(outcome);
        }
    }
}

impl RequestCallback for ChannelCallback {
    fn on_response(self: Arc<Self>, _request: &Request, response: RpcResponse) {
        self.complete(Ok(response));
    }

    fn on_error(self: Arc<Self>, _request: &Request, error: ClientError) {
        self.complete(Err(error));
    }
}
