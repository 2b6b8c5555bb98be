//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type delivered on the error
//! path of a [`RequestCallback`](crate::RequestCallback) and returned by
//! send-time operations.

use std::time::Duration;

/// Errors produced while issuing or completing a wrapped RPC call.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (connection refused, reset, body read failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The per-request timeout elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A resend requested by the listener could not be issued.
    ///
    /// Wraps the underlying failure so policies can tell a failed resend apart
    /// from the error that triggered the repeat in the first place.
    #[error("error while re-sending request: {0}")]
    Resend(Box<ClientError>),

    /// The request could not be built or sent as configured.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Application or policy level failure, typically supplied by a listener.
    #[error("{0}")]
    Invocation(String),

    /// The call was abandoned without a response or error being delivered.
    #[error("call canceled: {0}")]
    Canceled(String),
}

impl ClientError {
    /// Create an invocation error with the given message.
    pub fn invocation<S: Into<String>>(message: S) -> Self {
        ClientError::Invocation(message.into())
    }

    /// Create a transport error with the given message.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        ClientError::Transport(message.into())
    }

    /// Create an invalid request error with the given message.
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        ClientError::InvalidRequest(message.into())
    }

    /// Wrap a failure that occurred while re-sending a request.
    pub fn resend(cause: ClientError) -> Self {
        ClientError::Resend(Box::new(cause))
    }

    /// Returns whether this error is a failed resend.
    pub fn is_resend(&self) -> bool {
        matches!(self, ClientError::Resend(_))
    }

    /// Returns whether this error indicates a transient condition that may
    /// be resolved by sending the same request again.
    ///
    /// Transport failures and timeouts are retryable. A failed resend is not:
    /// the policy already tried and the transport refused.
    ///
    /// # Example
    ///
    /// ```
    /// use rpc_wrapper::ClientError;
    ///
    /// assert!(ClientError::transport("connection reset").is_retryable());
    /// assert!(!ClientError::invocation("session expired").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_))
    }
}
