//! Resilient request transport.
//!
//! [`ResilientTransport`] sends a request through a [`Dispatch`]
//! implementation and retries it on transient failures and on retryable status
//! codes, sleeping between attempts:
//!
//! - `429 Too Many Requests`: the policy's rate limit timeout
//! - anything else: an exponential backoff of `factor * 2^(n-1)` seconds,
//!   floored to whole seconds (1s, 2s, 4s with the default factor of 2)
//!
//! When the last attempt fails, the failure is recorded in the connector's
//! [`ConnectorState`] and returned as [`SendError::RetryExhausted`].

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use http::StatusCode;
use tracing::{debug, error, warn};

mod dispatch;
pub use self::dispatch::{Dispatch, DispatchError, HttpDispatcher, OutgoingRequest, Response};

mod state;
pub use self::state::ConnectorState;

#[cfg(test)]
pub(crate) mod testing;

const DEFAULT_RETRYABLE_STATUS_CODES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

// Keeps the exponential schedule from overflowing a `Duration`.
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// When and how long to wait before retrying a request.
///
/// # Default Configuration
///
/// - **Max retries**: 3 (4 attempts in total)
/// - **Backoff factor**: 2.0 (1s, 2s, 4s)
/// - **Rate limit timeout**: 5 seconds
/// - **Retryable status codes**: 429, 500, 502, 503, 504
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use apiconnector_core::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_rate_limit_timeout(Duration::from_secs(30));
///
/// assert_eq!(policy.delay_before_retry(0, None), Some(Duration::from_secs(1)));
/// assert_eq!(policy.delay_before_retry(5, None), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff_factor: f32,
    rate_limit_timeout: Duration,
    retryable_status_codes: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            rate_limit_timeout: Duration::from_secs(5),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES
                .iter()
                .map(StatusCode::as_u16)
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Sets how many times a failed attempt is retried.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff factor; negative or non-finite factors disable the backoff.
    pub fn with_backoff_factor(mut self, backoff_factor: f32) -> Self {
        self.backoff_factor = if backoff_factor.is_finite() && backoff_factor > 0.0 {
            backoff_factor
        } else {
            0.0
        };
        self
    }

    /// Sets the delay after a `429 Too Many Requests` response.
    pub fn with_rate_limit_timeout(mut self, rate_limit_timeout: Duration) -> Self {
        self.rate_limit_timeout = rate_limit_timeout;
        self
    }

    /// Replaces the set of status codes that trigger a retry.
    pub fn with_retryable_status_codes(
        mut self,
        status_codes: impl IntoIterator<Item = StatusCode>,
    ) -> Self {
        self.retryable_status_codes = status_codes.into_iter().map(|code| code.as_u16()).collect();
        self
    }

    /// How many times a failed attempt is retried.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// The backoff factor.
    pub fn backoff_factor(&self) -> f32 {
        self.backoff_factor
    }

    /// The delay after a `429 Too Many Requests` response.
    pub fn rate_limit_timeout(&self) -> Duration {
        self.rate_limit_timeout
    }

    /// Whether a response with this status is retried.
    pub fn is_retryable(&self, status: StatusCode) -> bool {
        self.retryable_status_codes.contains(&status.as_u16())
    }

    /// The delay to wait after the failed attempt `attempt` (0-based).
    ///
    /// `status` is the response status when the attempt got one. Returns `None`
    /// when `attempt` was the last one allowed.
    pub fn delay_before_retry(&self, attempt: usize, status: Option<StatusCode>) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        if status == Some(StatusCode::TOO_MANY_REQUESTS) {
            return Some(self.rate_limit_timeout);
        }
        self.backoff()
            .nth(attempt)
            .map(|delay| Duration::from_secs(delay.as_secs()))
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        let min_delay =
            Duration::try_from_secs_f32(self.backoff_factor / 2.0).unwrap_or(Duration::ZERO);
        ExponentialBuilder::default()
            .with_min_delay(min_delay)
            .with_factor(2.0)
            .with_max_delay(MAX_BACKOFF_DELAY)
            .with_max_times(self.max_retries)
            .build()
    }
}

/// The transport gave up on a request.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum SendError {
    /// Every attempt failed with a retryable error.
    #[display("{message}")]
    RetryExhausted {
        /// `Maximum retries exceeded (<max>) <last failure>`
        message: String,
    },

    /// The request failed in a way retrying cannot fix.
    #[display("Request rejected: {message}")]
    Rejected {
        /// The dispatch error.
        message: String,
    },

    /// The overall deadline elapsed before a response was obtained.
    #[display("{message}")]
    DeadlineElapsed {
        /// `Deadline elapsed after <deadline>`
        message: String,
    },
}

/// Why an attempt will be retried.
enum RetryReason {
    Status(StatusCode),
    Transient(String),
}

impl RetryReason {
    fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transient(_) => None,
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(
                f,
                "Response status code: {} ({})",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
            Self::Transient(message) => f.write_str(message),
        }
    }
}

/// Retries requests according to a [`RetryPolicy`], recording the final
/// failure in a [`ConnectorState`].
///
/// The transport is shared: any number of [`send`](Self::send) calls may be in
/// flight at once.
#[derive(Debug, Clone)]
pub struct ResilientTransport<D = HttpDispatcher> {
    dispatcher: D,
    policy: RetryPolicy,
    deadline: Option<Duration>,
    state: ConnectorState,
}

impl<D> ResilientTransport<D>
where
    D: Dispatch,
{
    /// Wraps `dispatcher`, writing failures into `state`.
    pub fn new(dispatcher: D, policy: RetryPolicy, state: ConnectorState) -> Self {
        Self {
            dispatcher,
            policy,
            deadline: None,
            state,
        }
    }

    /// Bounds each [`send`](Self::send) call, backoff included.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// The retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The shared error slot.
    pub fn state(&self) -> &ConnectorState {
        &self.state
    }

    /// Sends `request`, retrying retryable failures.
    ///
    /// Any response whose status is not retryable is returned unmodified,
    /// including 4xx responses.
    ///
    /// # Errors
    ///
    /// - [`SendError::RetryExhausted`] when the last allowed attempt failed
    /// - [`SendError::Rejected`] when an attempt failed with a fatal error
    /// - [`SendError::DeadlineElapsed`] when the deadline elapsed first
    pub async fn send(&self, request: &OutgoingRequest) -> Result<Response, SendError> {
        let Some(deadline) = self.deadline else {
            return self.send_with_retries(request).await;
        };

        match tokio::time::timeout(deadline, self.send_with_retries(request)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                let message = format!("Deadline elapsed after {deadline:?}");
                error!(url = %request.url, %message, "giving up");
                self.state.record_error(message.clone()).await;
                Err(SendError::DeadlineElapsed { message })
            }
        }
    }

    async fn send_with_retries(&self, request: &OutgoingRequest) -> Result<Response, SendError> {
        let mut attempt = 0;
        loop {
            let reason = match self.dispatcher.dispatch(request).await {
                Ok(response) if self.policy.is_retryable(response.status()) => {
                    RetryReason::Status(response.status())
                }
                Ok(response) => {
                    debug!(attempt, status = %response.status(), "response received");
                    return Ok(response);
                }
                Err(DispatchError::Transient { message }) => RetryReason::Transient(message),
                Err(DispatchError::Fatal { message }) => {
                    error!(url = %request.url, %message, "request rejected");
                    return Err(SendError::Rejected { message });
                }
            };

            let Some(delay) = self.policy.delay_before_retry(attempt, reason.status()) else {
                let message = format!(
                    "Maximum retries exceeded ({}) {reason}",
                    self.policy.max_retries()
                );
                error!(url = %request.url, attempt, %message, "giving up");
                self.state.record_error(message.clone()).await;
                return Err(SendError::RetryExhausted { message });
            };

            warn!(url = %request.url, attempt, ?delay, %reason, "retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio::time::Instant;
    use url::Url;

    use super::testing::ScriptedDispatcher;
    use super::*;

    fn request() -> OutgoingRequest {
        let url = Url::parse("http://model.test/predict").expect("url");
        OutgoingRequest::new(http::Method::POST, url)
    }

    fn transport(dispatcher: ScriptedDispatcher) -> ResilientTransport<ScriptedDispatcher> {
        ResilientTransport::new(dispatcher, RetryPolicy::default(), ConnectorState::new())
    }

    #[test]
    fn test_default_backoff_schedule() {
        let policy = RetryPolicy::default();

        let delays: Vec<_> = (0..=3)
            .map(|attempt| policy.delay_before_retry(attempt, None))
            .collect();

        assert_eq!(
            delays,
            [
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(2)),
                Some(Duration::from_secs(4)),
                None,
            ]
        );
    }

    #[rstest]
    #[case::factor_3(3.0, [1, 3, 6])]
    #[case::factor_1(1.0, [0, 1, 2])]
    #[case::factor_0(0.0, [0, 0, 0])]
    #[case::negative(-1.0, [0, 0, 0])]
    fn test_backoff_is_floored(#[case] factor: f32, #[case] expected: [u64; 3]) {
        let policy = RetryPolicy::default().with_backoff_factor(factor);

        let delays: Vec<_> = (0..3)
            .filter_map(|attempt| policy.delay_before_retry(attempt, None))
            .map(|delay| delay.as_secs())
            .collect();

        assert_eq!(delays, expected);
    }

    #[test]
    fn test_rate_limit_delay() {
        let policy = RetryPolicy::default().with_rate_limit_timeout(Duration::from_secs(7));
        let too_many = Some(StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(
            policy.delay_before_retry(0, too_many),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            policy.delay_before_retry(2, too_many),
            Some(Duration::from_secs(7))
        );
        assert_eq!(policy.delay_before_retry(3, too_many), None);
    }

    #[test]
    fn test_no_retries() {
        let policy = RetryPolicy::default().with_max_retries(0);

        assert_eq!(policy.delay_before_retry(0, None), None);
    }

    #[test]
    fn test_large_retry_count_does_not_overflow() {
        let policy = RetryPolicy::default().with_max_retries(200);

        assert_eq!(
            policy.delay_before_retry(150, None),
            Some(MAX_BACKOFF_DELAY)
        );
    }

    #[rstest]
    #[case(429, true)]
    #[case(500, true)]
    #[case(502, true)]
    #[case(503, true)]
    #[case(504, true)]
    #[case(200, false)]
    #[case(400, false)]
    #[case(404, false)]
    #[case(501, false)]
    fn test_default_retryable_statuses(#[case] status: u16, #[case] retryable: bool) {
        let status = StatusCode::from_u16(status).expect("status");

        assert_eq!(RetryPolicy::default().is_retryable(status), retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let dispatcher = ScriptedDispatcher::statuses([503, 500, 200]);
        let transport = transport(dispatcher.clone());
        let start = Instant::now();

        let response = transport.send(&request()).await.expect("success");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(dispatcher.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2));
        assert_eq!(transport.state().last_error().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_all_attempts() {
        let dispatcher = ScriptedDispatcher::statuses([503]);
        let transport = transport(dispatcher.clone());
        let start = Instant::now();

        let error = transport.send(&request()).await.expect_err("exhausted");

        assert_eq!(dispatcher.calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(1 + 2 + 4));
        insta::assert_snapshot!(error, @"Maximum retries exceeded (3) Response status code: 503 (Service Unavailable)");
        assert_eq!(
            transport.state().last_error().await,
            Some(error.to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timing() {
        let dispatcher = ScriptedDispatcher::statuses([502]);
        let transport = transport(dispatcher.clone());

        let _ = transport.send(&request()).await;

        let gaps: Vec<_> = dispatcher
            .instants()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect();
        assert_eq!(
            gaps,
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_waits_rate_limit_timeout() {
        let dispatcher = ScriptedDispatcher::statuses([429, 429, 200]);
        let transport = transport(dispatcher.clone());
        let start = Instant::now();

        let response = transport.send(&request()).await.expect("success");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(start.elapsed(), Duration::from_secs(5 + 5));
    }

    #[rstest]
    #[case::bad_request(400)]
    #[case::not_found(404)]
    #[case::created(201)]
    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_status_is_returned(#[case] status: u16) {
        let dispatcher = ScriptedDispatcher::statuses([status, 200]);
        let transport = transport(dispatcher.clone());

        let response = transport.send(&request()).await.expect("response");

        assert_eq!(response.status().as_u16(), status);
        assert_eq!(dispatcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let dispatcher = ScriptedDispatcher::new([Err(DispatchError::Transient {
            message: "connection refused".to_string(),
        })]);
        let transport = transport(dispatcher.clone());

        let error = transport.send(&request()).await.expect_err("exhausted");

        assert_eq!(dispatcher.calls(), 4);
        insta::assert_snapshot!(error, @"Maximum retries exceeded (3) connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_errors_are_not_retried() {
        let dispatcher = ScriptedDispatcher::new([Err(DispatchError::Fatal {
            message: "builder error".to_string(),
        })]);
        let transport = transport(dispatcher.clone());

        let error = transport.send(&request()).await.expect_err("rejected");

        assert_eq!(dispatcher.calls(), 1);
        assert!(matches!(error, SendError::Rejected { .. }));
        assert_eq!(transport.state().last_error().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapsed() {
        let dispatcher = ScriptedDispatcher::statuses([503]);
        let transport = transport(dispatcher.clone()).with_deadline(Some(Duration::from_secs(2)));

        let error = transport.send(&request()).await.expect_err("deadline");

        // attempts at 0s and 1s, the third one would start at 3s
        assert_eq!(dispatcher.calls(), 2);
        insta::assert_snapshot!(error, @"Deadline elapsed after 2s");
        assert_eq!(
            transport.state().last_error().await.as_deref(),
            Some("Deadline elapsed after 2s")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retryable_statuses() {
        let dispatcher = ScriptedDispatcher::statuses([503, 200]);
        let policy =
            RetryPolicy::default().with_retryable_status_codes([StatusCode::TOO_MANY_REQUESTS]);
        let transport = ResilientTransport::new(dispatcher.clone(), policy, ConnectorState::new());

        let response = transport.send(&request()).await.expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(dispatcher.calls(), 1);
    }
}
