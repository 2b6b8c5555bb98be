//! Ready-made listeners.
//!
//! These cover the policies most wrapped clients need:
//! - [`HeaderListener`]: stamps a header on every attempt (CSRF tokens)
//! - [`RetryListener`]: resends transient failures with exponential backoff
//! - [`ReauthListener`]: logs in again when the session has expired, then
//!   resends
//!
//! Each is an ordinary [`RpcListener`](crate::RpcListener). [`Chain`] runs
//! two listeners that share a context type as one; nest it for more.

mod chain;
mod header;
mod reauth;
mod retry;

pub use chain::Chain;
pub use header::HeaderListener;
pub use reauth::{ReauthContext, ReauthListener};
pub use retry::{defaults, ExponentialBackoff, RetryContext, RetryListener, RetryPolicy};
