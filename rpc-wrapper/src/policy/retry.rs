//! Retry with exponential backoff.
//!
//! [`RetryListener`] resends a call when an attempt fails with a retryable
//! error (see [`ClientError::is_retryable`]) or answers with one of a set of
//! HTTP statuses, waiting an exponentially growing, jittered delay between
//! attempts. Unlike the wrapper itself it enforces a ceiling: once
//! [`RetryPolicy::max_retries`] resends have been made, the last outcome is
//! delivered as is.
//!
//! Delays follow the
//! [gRPC connection backoff specification](https://github.com/grpc/grpc/blob/master/doc/connection-backoff.md).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rpc_wrapper::RpcWrapper;
//! use rpc_wrapper::policy::{RetryListener, RetryPolicy};
//!
//! let policy = RetryPolicy::new()
//!     .max_retries(5)
//!     .base_delay(Duration::from_millis(100));
//! let wrapper = RpcWrapper::with_listener(Arc::new(RetryListener::new(policy)?));
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use http::StatusCode;

use crate::disposition::{ErrorDisposition, Proceed, ResponseDisposition};
use crate::listener::RpcListener;
use crate::request::Request;
use crate::response::RpcResponse;
use crate::ClientError;

/// Default configuration values based on gRPC connection backoff spec.
/// See: https://github.com/grpc/grpc/blob/master/doc/connection-backoff.md
pub mod defaults {
    use std::time::Duration;

    /// Default initial delay before the first retry.
    pub const BASE_DELAY: Duration = Duration::from_secs(1);

    /// Default multiplier for exponential backoff.
    pub const MULTIPLIER: f64 = 1.6;

    /// Default jitter factor (0.2 means +/- 20%).
    pub const JITTER: f64 = 0.2;

    /// Default maximum delay between retries.
    pub const MAX_DELAY: Duration = Duration::from_secs(120);

    /// Default maximum number of retry attempts.
    pub const MAX_RETRIES: u32 = 3;
}

/// Configuration for retry behavior.
///
/// # Default Values
///
/// - `base_delay`: 1 second
/// - `multiplier`: 1.6
/// - `jitter`: 0.2 (20%)
/// - `max_delay`: 120 seconds
/// - `max_retries`: 3
///
/// # Example
///
/// ```
/// use rpc_wrapper::policy::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .base_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Initial delay before the first retry.
    pub base_delay: Duration,

    /// Multiplier for exponential backoff. Should be >= 1.0.
    pub multiplier: f64,

    /// Jitter factor for randomizing delays. Value between 0.0 and 1.0.
    /// A value of 0.2 means the actual delay will be within +/- 20% of the calculated delay.
    pub jitter: f64,

    /// Maximum delay between retries. The delay will never exceed this value.
    pub max_delay: Duration,

    /// Maximum number of resends (not counting the initial attempt).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a retry policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Short delays for latency-sensitive calls.
    /// - Base delay: 50ms
    /// - Max delay: 1 second
    /// - Max retries: 5
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            max_retries: 5,
            ..Default::default()
        }
    }

    /// Long delays for background calls.
    /// - Base delay: 2 seconds
    /// - Max delay: 5 minutes
    /// - Max retries: 10
    pub fn patient() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(300),
            max_retries: 10,
            ..Default::default()
        }
    }

    /// Set the maximum number of resends.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is less than 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier >= 1.0, "multiplier must be >= 1.0");
        self.multiplier = multiplier;
        self
    }

    /// Set the jitter factor.
    ///
    /// # Panics
    ///
    /// Panics if `jitter` is not between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&jitter),
            "jitter must be between 0.0 and 1.0"
        );
        self.jitter = jitter;
        self
    }

    /// Validate the policy configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay");
        }
        if self.multiplier < 1.0 {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// Create an ExponentialBackoff iterator from this policy.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// Exponential backoff with jitter.
///
/// Yields base * multiplier^attempt, +/- jitter, clamped to the maximum.
///
/// # Example
///
/// ```
/// use rpc_wrapper::policy::RetryPolicy;
/// use std::time::Duration;
///
/// let mut backoff = RetryPolicy::new().jitter(0.0).multiplier(2.0).backoff();
/// assert_eq!(backoff.next_delay(), Duration::from_secs(1));
/// assert_eq!(backoff.next_delay(), Duration::from_secs(2));
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    /// Current delay without jitter, stored as f64 to avoid rounding errors.
    current_delay_secs: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a new ExponentialBackoff from a RetryPolicy.
    pub fn new(policy: RetryPolicy) -> Self {
        let current_delay_secs = policy.base_delay.as_secs_f64();
        Self {
            policy,
            current_delay_secs,
            attempts: 0,
        }
    }

    /// Number of delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Check if more retries are allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_retries
    }

    /// Get the next delay and advance.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay_secs;

        // delay * (1 + jitter * random(-1, 1))
        let jittered = if self.policy.jitter > 0.0 {
            let jitter_range = self.policy.jitter * 2.0;
            let random_factor = rand::random::<f64>() * jitter_range - self.policy.jitter;
            delay * (1.0 + random_factor)
        } else {
            delay
        };

        let clamped = jittered.min(self.policy.max_delay.as_secs_f64());

        self.current_delay_secs = (self.current_delay_secs * self.policy.multiplier)
            .min(self.policy.max_delay.as_secs_f64());
        self.attempts += 1;

        Duration::from_secs_f64(clamped.max(0.0))
    }
}

/// Per-call state of [`RetryListener`].
#[derive(Debug)]
pub struct RetryContext {
    backoff: Mutex<ExponentialBackoff>,
}

impl RetryContext {
    fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff: Mutex::new(backoff),
        }
    }

    /// Number of resends made for this call so far.
    pub fn retries(&self) -> u32 {
        self.backoff.lock().unwrap_or_else(PoisonError::into_inner).attempts()
    }

    /// Delay before the next resend, or `None` once the ceiling is reached.
    fn next_delay(&self) -> Option<Duration> {
        let mut backoff = self.backoff.lock().unwrap_or_else(PoisonError::into_inner);
        backoff.can_retry().then(|| backoff.next_delay())
    }
}

/// Resends transient failures with exponential backoff.
///
/// Retryable errors are always resent. Responses are resent when their status
/// is one of [`retry_statuses`](Self::retry_statuses), by default
/// `503 Service Unavailable` and `429 Too Many Requests`.
#[derive(Clone, Debug)]
pub struct RetryListener {
    policy: RetryPolicy,
    statuses: Vec<StatusCode>,
}

impl RetryListener {
    /// Create a listener for `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if the policy does not validate.
    pub fn new(policy: RetryPolicy) -> Result<Self, ClientError> {
        policy.validate().map_err(ClientError::invalid_request)?;
        Ok(Self {
            policy,
            statuses: vec![StatusCode::SERVICE_UNAVAILABLE, StatusCode::TOO_MANY_REQUESTS],
        })
    }

    /// Replace the response statuses that trigger a resend.
    pub fn retry_statuses(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl RpcListener<RetryContext> for RetryListener {
    fn new_context(&self) -> RetryContext {
        RetryContext::new(self.policy.backoff())
    }

    fn before_response_processing(
        &self,
        _call_name: Option<&str>,
        _request: &Request,
        response: &RpcResponse,
        context: &Arc<RetryContext>,
        proceed: Proceed<ResponseDisposition>,
    ) {
        if !self.statuses.contains(&response.status()) {
            return proceed.proceed(ResponseDisposition::Process);
        }
        match context.next_delay() {
            Some(delay) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    status = %response.status(),
                    attempt = context.retries(),
                    delay_ms = delay.as_millis(),
                    "retrying after retryable status"
                );
                resume_after(delay, proceed, ResponseDisposition::Repeat);
            }
            None => proceed.proceed(ResponseDisposition::Process),
        }
    }

    fn before_error_processing(
        &self,
        _request: &Request,
        error: &ClientError,
        context: &Arc<RetryContext>,
        proceed: Proceed<ErrorDisposition>,
    ) {
        if !error.is_retryable() {
            return proceed.proceed(ErrorDisposition::Process);
        }
        match context.next_delay() {
            Some(delay) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    error = %error,
                    attempt = context.retries(),
                    delay_ms = delay.as_millis(),
                    "retrying after transient error"
                );
                resume_after(delay, proceed, ErrorDisposition::Repeat);
            }
            None => proceed.proceed(ErrorDisposition::Process),
        }
    }
}

/// Invoke `proceed` with `disposition` once `delay` has passed.
///
/// Without a tokio runtime there is nothing to wait on, so the call resumes
/// immediately.
fn resume_after<D: Send + 'static>(delay: Duration, proceed: Proceed<D>, disposition: D) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                proceed.proceed(disposition);
            });
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("no tokio runtime; resending without backoff delay");
            proceed.proceed(disposition);
        }
    }
}
