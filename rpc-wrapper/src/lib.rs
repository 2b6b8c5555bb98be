//! Transparent interception for RPC clients.
//!
//! This crate wraps an RPC client so that a single policy object, an
//! [`RpcListener`], sees every call it makes. The policy can stamp headers on
//! outgoing requests and, once a response or error arrives, decide whether
//! the application gets it, gets a different error instead, or whether the
//! same request is silently sent again. The application callback never sees
//! the attempts that were resent.
//!
//! Typical policies are CSRF token injection, re-login after the session
//! expired, and retrying transient failures. A wrapped client with the
//! default listener behaves exactly like an unwrapped one.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rpc_wrapper::{RpcClient, RpcWrapper};
//! use rpc_wrapper::policy::{RetryListener, RetryPolicy};
//!
//! let client = RpcClient::builder("http://localhost:3000/app/greet")
//!     .content_type("text/x-gwt-rpc; charset=utf-8")
//!     .build()?;
//!
//! let wrapper = RpcWrapper::with_listener(Arc::new(RetryListener::new(RetryPolicy::default())?));
//! let client = wrapper.wrap(client);
//!
//! let response = client.call(payload).await?;
//! ```
//!
//! ## Writing a listener
//!
//! Every hook except [`RpcListener::new_context`] has a pass-through default.
//! The decision hooks receive a [`Proceed`] handle which must be invoked
//! exactly once, either inside the hook or later from a task:
//!
//! ```ignore
//! fn before_response_processing(&self, _name: Option<&str>, _req: &Request,
//!     response: &RpcResponse, _ctx: &Arc<()>, proceed: Proceed<ResponseDisposition>)
//! {
//!     if response.status() == 401 {
//!         proceed.proceed(ResponseDisposition::ReturnError(ClientError::invocation("login required")));
//!     } else {
//!         proceed.proceed(ResponseDisposition::Process);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `tls` (default): HTTPS support in [`HyperTransport`](transport::HyperTransport)
//! - `tracing` (default): lifecycle logging through `tracing`

mod builder;
mod call_name;
mod callback;
mod client;
mod disposition;
mod error;
mod listener;
pub mod policy;
mod repeating;
mod request;
mod response;
pub mod transport;
mod wrapper;

#[cfg(test)]
mod testing;

pub use builder::RpcClientBuilder;
pub use call_name::{CallNameResolver, PipeDelimitedResolver};
pub use callback::{ChannelCallback, FnCallback, RequestCallback};
pub use client::{DirectRequestBuilder, PendingCall, RpcClient, RpcRequestBuilder};
pub use disposition::{ErrorDisposition, Proceed, ResponseDisposition};
pub use error::ClientError;
pub use listener::{DefaultRpcListener, RpcListener};
pub use repeating::{RepeatingCallback, RepeatingRequest};
pub use request::{OutgoingRequest, Request, RequestBuilder};
pub use response::RpcResponse;
pub use wrapper::{RpcWrapper, WrappedRpcBuilder};

// Re-export types that appear in the public API
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};
