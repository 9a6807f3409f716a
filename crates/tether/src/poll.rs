//! Polling: retry lookup + predicate until success, fatal failure, or timeout.
//!
//! Every fragment verification runs through a [`Poller`]. One attempt
//! re-resolves the UI from scratch and evaluates a predicate; the attempt
//! reports back either a value or a [`Condition`]:
//!
//! ```text
//! Attempt ──► Ok(value) ─────────────────────────────► Polled { value, attempts, elapsed }
//!    │
//!    ├──► Unsatisfied / Stale / NotInteractable / Transient
//!    │        └─► deadline passed? ──yes──► TetherError::Timeout(report)
//!    │                  └─no──► sleep(min(interval, remaining)) ──► Attempt
//!    │
//!    └──► Fatal(err) ─────────────────────────────────► err (no retry)
//! ```
//!
//! The deadline is fixed when the loop starts, at least one attempt is always
//! made, and a [`CancelToken`] aborts a sleeping loop immediately.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::driver::DriverError;
use crate::report::FailureReport;
use crate::result::{TetherError, TetherResult};

/// Default overall timeout for polling (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default interval between poll attempts (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Intervals are never shorter than this, so a zero interval cannot spin
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// OBSERVATIONS AND CONDITIONS
// =============================================================================

/// The last concrete thing an attempt saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    /// No attempt produced an observation
    Nothing,
    /// Number of matching elements
    Count(usize),
    /// Text of the resolved element
    Text(String),
    /// Texts of all resolved elements
    Texts(Vec<String>),
    /// Attribute value (`None` when absent)
    Value(Option<String>),
    /// Displayed state of the resolved element
    Displayed(bool),
    /// A transient error message
    Error(String),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nothing => write!(f, "nothing"),
            Self::Count(1) => write!(f, "1 match"),
            Self::Count(n) => write!(f, "{n} matches"),
            Self::Text(text) => write!(f, "text {text:?}"),
            Self::Texts(texts) => write!(f, "texts {texts:?}"),
            Self::Value(Some(value)) => write!(f, "value {value:?}"),
            Self::Value(None) => write!(f, "no value"),
            Self::Displayed(true) => write!(f, "displayed"),
            Self::Displayed(false) => write!(f, "not displayed"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Why a single attempt did not succeed.
///
/// Everything except [`Condition::Fatal`] is retryable.
#[derive(Debug)]
pub enum Condition {
    /// The check ran but its predicate is not satisfied yet
    Unsatisfied(Observation),
    /// An element went stale mid-attempt
    Stale(String),
    /// An element could not receive an interaction yet
    NotInteractable(String),
    /// Transient driver or connectivity failure
    Transient(String),
    /// Programmer or driver error; propagates on first occurrence
    Fatal(TetherError),
}

impl Condition {
    /// Whether the poller should try again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }

    /// Convert into the observation recorded for timeout reports
    #[must_use]
    pub fn into_observation(self) -> Observation {
        match self {
            Self::Unsatisfied(observation) => observation,
            other => Observation::Error(other.to_string()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsatisfied(observation) => write!(f, "not satisfied, observed {observation}"),
            Self::Stale(message) => write!(f, "stale element: {message}"),
            Self::NotInteractable(message) => write!(f, "not interactable: {message}"),
            Self::Transient(message) => write!(f, "transient failure: {message}"),
            Self::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl From<DriverError> for Condition {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Stale(m) => Self::Stale(m),
            DriverError::NotInteractable(m) => Self::NotInteractable(m),
            DriverError::Disconnected(m) => Self::Transient(m),
            DriverError::InvalidSelector(m) => {
                Self::Fatal(TetherError::invalid_criteria(format!("invalid selector: {m}")))
            }
            DriverError::Other(message) => Self::Fatal(TetherError::Driver { message }),
        }
    }
}

impl From<TetherError> for Condition {
    fn from(err: TetherError) -> Self {
        Self::Fatal(err)
    }
}

impl From<Condition> for TetherError {
    fn from(condition: Condition) -> Self {
        match condition {
            Condition::Fatal(err) => err,
            other => Self::StaleElement(Box::new(FailureReport::new(
                "resolve",
                "a stable element set",
                Duration::ZERO,
                1,
                other.into_observation(),
            ))),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// How the interval grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Constant interval
    #[default]
    Fixed,
    /// Multiply the interval by `factor` after each attempt, up to a cap
    Exponential {
        /// Growth factor per attempt
        factor: f64,
        /// Upper bound for the interval in milliseconds
        max_interval_ms: u64,
    },
}

impl Backoff {
    /// Interval to use after `current`
    #[must_use]
    pub fn next(&self, current: Duration) -> Duration {
        match *self {
            Self::Fixed => current,
            Self::Exponential {
                factor,
                max_interval_ms,
            } => {
                let cap = Duration::from_millis(max_interval_ms).max(MIN_POLL_INTERVAL);
                // an unrepresentable product saturates at the cap
                Duration::try_from_secs_f64(current.as_secs_f64() * factor.max(1.0))
                    .map_or(cap, |next| next.min(cap))
            }
        }
    }
}

/// Timing for one poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Overall time budget, measured from loop entry
    pub timeout: Duration,
    /// Initial pause between attempts
    pub poll_interval: Duration,
    /// Interval growth
    pub backoff: Backoff,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            backoff: Backoff::Fixed,
        }
    }
}

impl PollConfig {
    /// Create a config with the given timeout and default interval
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the backoff strategy
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// External cancellation signal shared between a test run and its poll loops
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Create an un-cancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel, waking every loop currently sleeping on this token
    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Whether the token has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; returns `true` if cancelled before or during
    /// the wait
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// =============================================================================
// POLLER
// =============================================================================

/// Result of a successful poll
#[derive(Debug, Clone, PartialEq)]
pub struct Polled<T> {
    /// The value produced by the satisfying attempt
    pub value: T,
    /// Number of attempts made, including the satisfying one
    pub attempts: usize,
    /// Time from loop entry to success
    pub elapsed: Duration,
}

/// Retry-until-success-or-timeout engine
pub struct Poller<'a> {
    config: PollConfig,
    operation: String,
    describe: Box<dyn Fn() -> String + 'a>,
    cancel: Option<CancelToken>,
}

impl fmt::Debug for Poller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("operation", &self.operation)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Poller<'a> {
    /// Create a poller with the given timing
    #[must_use]
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            operation: "poll".to_string(),
            describe: Box::new(|| "condition".to_string()),
            cancel: None,
        }
    }

    /// Name the operation for failure reports
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = name.into();
        self
    }

    /// Set a fixed failure description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.describe = Box::new(move || description.clone());
        self
    }

    /// Set a lazy failure description, evaluated only if the poll fails
    #[must_use]
    pub fn describe_with(mut self, describe: impl Fn() -> String + 'a) -> Self {
        self.describe = Box::new(describe);
        self
    }

    /// Abort promptly when `token` is cancelled
    #[must_use]
    pub fn with_cancel_token(mut self, token: Option<CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Get the timing config
    #[must_use]
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run `attempt` until it succeeds, fails fatally, or the deadline passes.
    ///
    /// A timeout too large to represent as an [`Instant`] (such as
    /// [`Duration::MAX`]) means no deadline.
    ///
    /// # Errors
    ///
    /// - the fatal error, unchanged, on the first [`Condition::Fatal`]
    /// - [`TetherError::Timeout`] carrying the last observation on timeout
    /// - [`TetherError::Cancelled`] when the cancel token fires
    pub fn until<T>(
        &self,
        mut attempt: impl FnMut() -> Result<T, Condition>,
    ) -> TetherResult<Polled<T>> {
        let start = Instant::now();
        let deadline = start.checked_add(self.config.timeout);
        let mut interval = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut attempts = 0;
        let mut last = Observation::Nothing;

        loop {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(self.cancelled(start));
            }

            attempts += 1;
            match attempt() {
                Ok(value) => {
                    debug!(
                        operation = %self.operation,
                        attempts,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "poll satisfied"
                    );
                    return Ok(Polled {
                        value,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Err(Condition::Fatal(err)) => {
                    debug!(operation = %self.operation, attempts, error = %err, "poll aborted");
                    return Err(err);
                }
                Err(condition) => {
                    trace!(operation = %self.operation, attempt = attempts, %condition, "retrying");
                    last = condition.into_observation();
                }
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                let report = FailureReport::new(
                    self.operation.clone(),
                    (self.describe)(),
                    start.elapsed(),
                    attempts,
                    last,
                );
                warn!(
                    operation = %self.operation,
                    attempts,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    last = %report.last_observation,
                    "poll timed out: {}",
                    report.description
                );
                return Err(TetherError::Timeout(Box::new(report)));
            }

            let pause = deadline.map_or(interval, |deadline| {
                interval.min(deadline.saturating_duration_since(now))
            });
            if self.pause(pause) {
                return Err(self.cancelled(start));
            }
            interval = self.config.backoff.next(interval).max(MIN_POLL_INTERVAL);
        }
    }

    /// Run `attempt` exactly once, with the same error mapping as [`until`]
    ///
    /// [`until`]: Poller::until
    pub fn once<T>(&self, attempt: impl FnOnce() -> Result<T, Condition>) -> TetherResult<T> {
        let start = Instant::now();
        attempt().map_err(|condition| match condition {
            Condition::Fatal(err) => err,
            other => TetherError::Timeout(Box::new(FailureReport::new(
                self.operation.clone(),
                (self.describe)(),
                start.elapsed(),
                1,
                other.into_observation(),
            ))),
        })
    }

    /// Sleep between attempts; `true` means cancelled
    fn pause(&self, duration: Duration) -> bool {
        match &self.cancel {
            Some(token) => token.wait_timeout(duration),
            None => {
                std::thread::sleep(duration);
                false
            }
        }
    }

    fn cancelled(&self, start: Instant) -> TetherError {
        TetherError::Cancelled {
            description: (self.describe)(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Poll `attempt` with the given config and a fixed description
///
/// # Errors
///
/// See [`Poller::until`]
pub fn poll_until<T>(
    config: PollConfig,
    description: impl Into<String>,
    attempt: impl FnMut() -> Result<T, Condition>,
) -> TetherResult<T> {
    Poller::new(config)
        .description(description)
        .until(attempt)
        .map(|polled| polled.value)
}
