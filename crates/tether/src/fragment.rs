//! Fragments: lazy, immutable handles on a named piece of UI.
//!
//! A [`Fragment`] pairs [`SearchCriteria`] with a driver and a
//! [`SyncConfig`]. Building and narrowing a fragment never touches the
//! browser; every public operation resolves the criteria afresh, so a
//! fragment can never hold a stale element.
//!
//! ```
//! use std::sync::Arc;
//! use tether::mock::{MockDriver, MockNode};
//! use tether::{Fragment, SyncConfig};
//!
//! let driver = MockDriver::new();
//! let list = driver.add(MockNode::new("ul"));
//! driver.add_child(list, MockNode::new("li").text("Draft"));
//! driver.add_child(list, MockNode::new("li").text("Paid").appears_after(3));
//!
//! let rows = Fragment::new(Arc::new(driver), "ul")
//!     .with_config(SyncConfig::new().with_poll_interval_ms(5))
//!     .child_of_each("li");
//!
//! rows.verify_size(2).unwrap();
//! rows.with_index(1).verify_text("Paid").unwrap();
//! ```
//!
//! Verifications poll until their condition holds or the timeout passes.
//! Actions resolve once per attempt and retry stale or not-yet-interactable
//! elements within a small budget; they do not wait for presence unless
//! [`SyncConfig::action_waits_for_presence`] is set.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{self, SyncConfig};
use crate::criteria::{SearchCriteria, TextMatcher};
use crate::driver::{Driver, DriverError, Element};
use crate::poll::{CancelToken, Condition, Observation, Poller};
use crate::port::DriverPort;
use crate::report::FailureReport;
use crate::result::{TetherError, TetherResult};

/// Lazy, immutable descriptor of a UI element or element group
pub struct Fragment<D: Driver> {
    driver: Arc<D>,
    criteria: SearchCriteria,
    config: SyncConfig,
    cancel: Option<CancelToken>,
}

impl<D: Driver> Clone for Fragment<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            criteria: self.criteria.clone(),
            config: self.config,
            cancel: self.cancel.clone(),
        }
    }
}

impl<D: Driver> fmt::Debug for Fragment<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("criteria", &self.criteria)
            .field("config", &self.config)
            .field("cancellable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> fmt::Display for Fragment<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.criteria)
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Timed-out value checks that never saw an element are reported as missing
fn value_mismatch(report: Box<FailureReport>) -> TetherError {
    if report.last_observation == Observation::Count(0) {
        TetherError::NotFound(report)
    } else {
        TetherError::ValueMismatch(report)
    }
}

impl<D: Driver> Fragment<D> {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Create a fragment using the process-wide default config. No I/O.
    #[must_use]
    pub fn new(driver: Arc<D>, criteria: impl Into<SearchCriteria>) -> Self {
        Self {
            driver,
            criteria: criteria.into(),
            config: config::defaults(),
            cancel: None,
        }
    }

    /// Create a fragment that owns `driver`
    #[must_use]
    pub fn from_driver(driver: D, criteria: impl Into<SearchCriteria>) -> Self {
        Self::new(Arc::new(driver), criteria)
    }

    /// A root-scoped fragment sharing this fragment's driver and config
    #[must_use]
    pub fn locate(&self, criteria: impl Into<SearchCriteria>) -> Self {
        self.with_criteria(criteria.into())
    }

    fn with_criteria(&self, criteria: SearchCriteria) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            criteria,
            config: self.config,
            cancel: self.cancel.clone(),
        }
    }

    /// Get the search criteria
    #[must_use]
    pub const fn criteria(&self) -> &SearchCriteria {
        &self.criteria
    }

    /// Get the driver
    #[must_use]
    pub const fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Get the effective config
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Get the cancel token, if any
    #[must_use]
    pub const fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    // =========================================================================
    // NARROWING
    // =========================================================================

    /// Only the n-th (0-based) match.
    ///
    /// An index past the end of a non-empty match set fails immediately with
    /// [`TetherError::InvalidCriteria`]. Over an empty match set the index
    /// resolves to nothing, so a polled operation keeps waiting for the set
    /// to fill instead of failing on an element that has not rendered yet.
    #[must_use]
    pub fn with_index(&self, n: usize) -> Self {
        self.with_criteria(self.criteria.with_index(n))
    }

    /// Only the first match
    #[must_use]
    pub fn first(&self) -> Self {
        self.with_criteria(self.criteria.first())
    }

    /// Matches whose text satisfies `matcher`; plain strings match exactly
    #[must_use]
    pub fn with_text(&self, matcher: impl Into<TextMatcher>) -> Self {
        self.with_criteria(self.criteria.with_text(matcher))
    }

    /// Matches whose text contains `text`
    #[must_use]
    pub fn containing_text(&self, text: impl Into<String>) -> Self {
        self.with_text(TextMatcher::contains(text))
    }

    /// Matches whose text matches a regular expression
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::InvalidCriteria`] if the pattern does not compile
    pub fn matching_text(&self, pattern: &str) -> TetherResult<Self> {
        Ok(self.with_text(TextMatcher::pattern(pattern)?))
    }

    /// Displayed matches only
    #[must_use]
    pub fn displayed(&self) -> Self {
        self.with_criteria(self.criteria.displayed())
    }

    /// Matches of `child` inside the first element this fragment resolves to
    #[must_use]
    pub fn child(&self, child: impl Into<SearchCriteria>) -> Self {
        self.with_criteria(self.criteria.child(child))
    }

    /// Matches of `child` inside every element this fragment resolves to,
    /// in parent order
    #[must_use]
    pub fn child_of_each(&self, child: impl Into<SearchCriteria>) -> Self {
        self.with_criteria(self.criteria.child_of_each(child))
    }

    /// Scope prebuilt criteria under the first match
    #[must_use]
    pub fn child_criteria(&self, child: &SearchCriteria) -> Self {
        self.child(child)
    }

    /// Scope prebuilt criteria under every match
    #[must_use]
    pub fn child_criteria_of_each(&self, child: &SearchCriteria) -> Self {
        self.child_of_each(child)
    }

    // =========================================================================
    // OVERRIDES
    // =========================================================================

    /// Use a different timeout for this fragment's operations
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.config.timeout_ms = saturating_millis(timeout);
        next
    }

    /// Use a different poll interval
    #[must_use]
    pub fn with_poll_interval(&self, interval: Duration) -> Self {
        let mut next = self.clone();
        next.config.poll_interval_ms = saturating_millis(interval);
        next
    }

    /// Use a different action attempt budget (at least one attempt is
    /// always made)
    #[must_use]
    pub fn with_action_retries(&self, retries: usize) -> Self {
        let mut next = self.clone();
        next.config.action_retries = retries;
        next
    }

    /// Replace the whole config
    #[must_use]
    pub fn with_config(&self, config: SyncConfig) -> Self {
        let mut next = self.clone();
        next.config = config;
        next
    }

    /// Abort polling when `token` is cancelled
    #[must_use]
    pub fn with_cancel_token(&self, token: CancelToken) -> Self {
        let mut next = self.clone();
        next.cancel = Some(token);
        next
    }

    // =========================================================================
    // ONE-SHOT QUERIES
    // =========================================================================

    fn resolve(&self) -> Result<Vec<D::Element>, Condition> {
        self.driver.resolve(&self.criteria)
    }

    fn resolve_first(&self) -> Result<D::Element, Condition> {
        self.resolve()?
            .into_iter()
            .next()
            .ok_or(Condition::Unsatisfied(Observation::Count(0)))
    }

    /// Resolve once, without polling. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// - [`TetherError::InvalidCriteria`] or [`TetherError::Driver`] for
    ///   fatal failures
    /// - [`TetherError::StaleElement`] with a one-attempt report when the
    ///   lookup hit a stale or transient failure that a polled operation
    ///   would have retried
    pub fn find_all_instantly(&self) -> TetherResult<Vec<D::Element>> {
        let start = Instant::now();
        self.resolve().map_err(|condition| match condition {
            Condition::Fatal(err) => err,
            retryable => self.attach_screenshot(TetherError::StaleElement(Box::new(
                FailureReport::new(
                    "find_all_instantly",
                    format!("{} to resolve", self.criteria),
                    start.elapsed(),
                    1,
                    retryable.into_observation(),
                ),
            ))),
        })
    }

    /// Number of matches right now
    ///
    /// # Errors
    ///
    /// See [`Fragment::find_all_instantly`]
    pub fn count_instantly(&self) -> TetherResult<usize> {
        Ok(self.find_all_instantly()?.len())
    }

    /// Whether anything matches right now
    ///
    /// # Errors
    ///
    /// See [`Fragment::find_all_instantly`]
    pub fn exists_instantly(&self) -> TetherResult<bool> {
        Ok(self.count_instantly()? > 0)
    }

    // =========================================================================
    // POLLED VERIFICATIONS
    // =========================================================================

    fn poll<T>(
        &self,
        operation: &str,
        describe: impl Fn() -> String,
        retag: impl FnOnce(Box<FailureReport>) -> TetherError,
        attempt: impl FnMut() -> Result<T, Condition>,
    ) -> TetherResult<T> {
        Poller::new(self.config.poll_config())
            .operation(operation)
            .describe_with(describe)
            .with_cancel_token(self.cancel.clone())
            .until(attempt)
            .map(|polled| polled.value)
            .map_err(|err| self.attach_screenshot(err.on_timeout(retag)))
    }

    fn attach_screenshot(&self, mut err: TetherError) -> TetherError {
        if !self.config.capture_screenshots {
            return err;
        }
        if let Some(report) = err.report_mut() {
            match self.driver.screenshot() {
                Ok(Some(shot)) => report.screenshot = Some(shot),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "screenshot capture failed"),
            }
        }
        err
    }

    /// Wait until at least one element matches
    ///
    /// # Errors
    ///
    /// [`TetherError::NotFound`] on timeout; fatal errors immediately
    pub fn verify_present(&self) -> TetherResult<()> {
        self.poll(
            "verify_present",
            || format!("{} to be present", self.criteria),
            TetherError::NotFound,
            || match self.resolve()?.len() {
                0 => Err(Condition::Unsatisfied(Observation::Count(0))),
                _ => Ok(()),
            },
        )
    }

    /// Wait until nothing matches
    ///
    /// # Errors
    ///
    /// [`TetherError::StillPresent`] on timeout; fatal errors immediately
    pub fn verify_absent(&self) -> TetherResult<()> {
        self.poll(
            "verify_absent",
            || format!("{} to be absent", self.criteria),
            TetherError::StillPresent,
            || match self.resolve()?.len() {
                0 => Ok(()),
                n => Err(Condition::Unsatisfied(Observation::Count(n))),
            },
        )
    }

    fn verify_count(
        &self,
        operation: &str,
        expectation: &str,
        accept: impl Fn(usize) -> bool,
    ) -> TetherResult<()> {
        self.poll(
            operation,
            || format!("{} to have {expectation}", self.criteria),
            TetherError::CountMismatch,
            || {
                let count = self.resolve()?.len();
                if accept(count) {
                    Ok(())
                } else {
                    Err(Condition::Unsatisfied(Observation::Count(count)))
                }
            },
        )
    }

    /// Wait until exactly `n` elements match
    ///
    /// # Errors
    ///
    /// [`TetherError::CountMismatch`] reporting the last count on timeout
    pub fn verify_size(&self, n: usize) -> TetherResult<()> {
        self.verify_count("verify_size", &format!("exactly {n} match(es)"), |c| c == n)
    }

    /// Wait until at least `n` elements match
    ///
    /// # Errors
    ///
    /// [`TetherError::CountMismatch`] on timeout
    pub fn verify_size_at_least(&self, n: usize) -> TetherResult<()> {
        self.verify_count(
            "verify_size_at_least",
            &format!("at least {n} match(es)"),
            |c| c >= n,
        )
    }

    /// Wait until the number of matches is within `min..=max`
    ///
    /// # Errors
    ///
    /// [`TetherError::InvalidCriteria`] immediately if `min > max`,
    /// [`TetherError::CountMismatch`] on timeout
    pub fn verify_size_between(&self, min: usize, max: usize) -> TetherResult<()> {
        if min > max {
            return Err(TetherError::invalid_criteria(format!(
                "empty count range {min}..={max}"
            )));
        }
        self.verify_count(
            "verify_size_between",
            &format!("between {min} and {max} matches"),
            |c| (min..=max).contains(&c),
        )
    }

    /// Wait until the first match's text satisfies `expected`
    ///
    /// # Errors
    ///
    /// [`TetherError::ValueMismatch`] reporting the last text on timeout, or
    /// [`TetherError::NotFound`] if nothing ever matched
    pub fn verify_text(&self, expected: impl Into<TextMatcher>) -> TetherResult<()> {
        let matcher = expected.into();
        self.poll(
            "verify_text",
            || format!("{} to have {matcher}", self.criteria),
            value_mismatch,
            || {
                let text = self.resolve_first()?.text()?;
                if matcher.matches(&text) {
                    Ok(())
                } else {
                    Err(Condition::Unsatisfied(Observation::Text(text)))
                }
            },
        )
    }

    /// Wait until the first match's text contains `text`
    ///
    /// # Errors
    ///
    /// See [`Fragment::verify_text`]
    pub fn verify_text_contains(&self, text: impl Into<String>) -> TetherResult<()> {
        self.verify_text(TextMatcher::contains(text))
    }

    /// Wait until the first match's text matches a regular expression
    ///
    /// # Errors
    ///
    /// [`TetherError::InvalidCriteria`] for a bad pattern, otherwise see
    /// [`Fragment::verify_text`]
    pub fn verify_text_matches(&self, pattern: &str) -> TetherResult<()> {
        self.verify_text(TextMatcher::pattern(pattern)?)
    }

    /// Wait until the trimmed texts of all matches equal `expected`, in order
    ///
    /// # Errors
    ///
    /// [`TetherError::ValueMismatch`] reporting the last texts on timeout
    pub fn verify_texts<I>(&self, expected: I) -> TetherResult<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        self.poll(
            "verify_texts",
            || format!("{} to have texts {expected:?}", self.criteria),
            TetherError::ValueMismatch,
            || {
                let texts = self
                    .resolve()?
                    .iter()
                    .map(|e| e.text().map(|t| t.trim().to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                if texts == expected {
                    Ok(())
                } else {
                    Err(Condition::Unsatisfied(Observation::Texts(texts)))
                }
            },
        )
    }

    /// Wait until the first match is displayed
    ///
    /// # Errors
    ///
    /// [`TetherError::ValueMismatch`] on timeout, or [`TetherError::NotFound`]
    /// if nothing ever matched
    pub fn verify_displayed(&self) -> TetherResult<()> {
        self.poll(
            "verify_displayed",
            || format!("{} to be displayed", self.criteria),
            value_mismatch,
            || {
                if self.resolve_first()?.is_displayed()? {
                    Ok(())
                } else {
                    Err(Condition::Unsatisfied(Observation::Displayed(false)))
                }
            },
        )
    }

    /// Wait until no match is displayed (absent counts as hidden)
    ///
    /// # Errors
    ///
    /// [`TetherError::ValueMismatch`] on timeout
    pub fn verify_hidden(&self) -> TetherResult<()> {
        self.poll(
            "verify_hidden",
            || format!("{} to be hidden or absent", self.criteria),
            TetherError::ValueMismatch,
            || {
                for element in self.resolve()? {
                    if element.is_displayed()? {
                        return Err(Condition::Unsatisfied(Observation::Displayed(true)));
                    }
                }
                Ok(())
            },
        )
    }

    /// Wait until the first match's attribute `name` satisfies `expected`
    ///
    /// # Errors
    ///
    /// [`TetherError::ValueMismatch`] reporting the last value on timeout, or
    /// [`TetherError::NotFound`] if nothing ever matched
    pub fn verify_attribute(
        &self,
        name: &str,
        expected: impl Into<TextMatcher>,
    ) -> TetherResult<()> {
        let matcher = expected.into();
        self.poll(
            "verify_attribute",
            || format!("{} to have attribute `{name}` with {matcher}", self.criteria),
            value_mismatch,
            || match self.resolve_first()?.attribute(name)? {
                Some(value) if matcher.matches(&value) => Ok(()),
                other => Err(Condition::Unsatisfied(Observation::Value(other))),
            },
        )
    }

    /// Poll a custom check over the freshly resolved matches.
    ///
    /// `check` receives the current matches (possibly empty) and returns a
    /// value or a [`Condition`]; driver errors convert with `?`.
    ///
    /// # Errors
    ///
    /// [`TetherError::Timeout`] on timeout; fatal conditions immediately
    pub fn poll_until<T>(
        &self,
        description: impl Into<String>,
        mut check: impl FnMut(Vec<D::Element>) -> Result<T, Condition>,
    ) -> TetherResult<T> {
        let description = description.into();
        self.poll(
            "poll_until",
            || description.clone(),
            TetherError::Timeout,
            || check(self.resolve()?),
        )
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Text of the first match, waiting for it to appear
    ///
    /// # Errors
    ///
    /// [`TetherError::NotFound`] on timeout
    pub fn text(&self) -> TetherResult<String> {
        self.poll(
            "text",
            || format!("{} to be present to read its text", self.criteria),
            TetherError::NotFound,
            || Ok(self.resolve_first()?.text()?),
        )
    }

    /// Trimmed texts of all current matches (possibly none)
    ///
    /// # Errors
    ///
    /// [`TetherError::Timeout`] if matches keep going stale until timeout
    pub fn texts(&self) -> TetherResult<Vec<String>> {
        self.poll(
            "texts",
            || format!("{} to be readable", self.criteria),
            TetherError::Timeout,
            || {
                Ok(self
                    .resolve()?
                    .iter()
                    .map(|e| e.text().map(|t| t.trim().to_string()))
                    .collect::<Result<Vec<_>, _>>()?)
            },
        )
    }

    /// Attribute of the first match, waiting for it to appear
    ///
    /// # Errors
    ///
    /// [`TetherError::NotFound`] on timeout
    pub fn attribute(&self, name: &str) -> TetherResult<Option<String>> {
        self.poll(
            "attribute",
            || format!("{} to be present to read `{name}`", self.criteria),
            TetherError::NotFound,
            || Ok(self.resolve_first()?.attribute(name)?),
        )
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Click the first match
    ///
    /// # Errors
    ///
    /// [`TetherError::NotFound`] if nothing matches on the first attempt,
    /// [`TetherError::StaleElement`] once the retry budget is exhausted
    pub fn click(&self) -> TetherResult<()> {
        self.act("click", Element::click)
    }

    /// Type into the first match
    ///
    /// # Errors
    ///
    /// See [`Fragment::click`]
    pub fn send_keys(&self, text: &str) -> TetherResult<()> {
        self.act("send_keys", |e| e.send_keys(text))
    }

    /// Clear the first match, then type into it
    ///
    /// # Errors
    ///
    /// See [`Fragment::click`]
    pub fn clear_and_type(&self, text: &str) -> TetherResult<()> {
        self.act("clear_and_type", |e| {
            e.clear()?;
            e.send_keys(text)
        })
    }

    /// Resolve and act, re-resolving after each stale or not-interactable
    /// failure until the attempt budget runs out.
    ///
    /// Only the first attempt fails fast on an empty match set. Once an
    /// action has been tried, the element may be mid re-render, so an empty
    /// resolve on a later attempt is retried like a stale handle.
    fn act(
        &self,
        operation: &str,
        action: impl Fn(&D::Element) -> Result<(), DriverError>,
    ) -> TetherResult<()> {
        if self.config.action_waits_for_presence {
            self.verify_present()?;
        }

        let start = Instant::now();
        let budget = self.config.action_retries.max(1);
        let describe = || format!("{} to accept {operation}", self.criteria);
        let mut last = Observation::Nothing;

        for attempt in 1..=budget {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(self.cancelled(describe(), start));
            }

            let outcome = match self.resolve() {
                Ok(elements) => match elements.first() {
                    Some(element) => action(element).map_err(Condition::from),
                    None if attempt > 1 => Err(Condition::Unsatisfied(Observation::Count(0))),
                    None => {
                        let report = FailureReport::new(
                            operation,
                            format!("{} to be present", self.criteria),
                            start.elapsed(),
                            attempt,
                            Observation::Count(0),
                        );
                        return Err(self.attach_screenshot(TetherError::NotFound(Box::new(report))));
                    }
                },
                Err(condition) => Err(condition),
            };

            match outcome {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "action recovered after retry");
                    }
                    return Ok(());
                }
                Err(Condition::Fatal(err)) => return Err(err),
                Err(condition) => {
                    debug!(operation, attempt, %condition, "action failed, re-resolving");
                    last = condition.into_observation();
                }
            }

            if attempt < budget && self.pause(self.config.action_retry_delay()) {
                return Err(self.cancelled(describe(), start));
            }
        }

        let report = FailureReport::new(operation, describe(), start.elapsed(), budget, last);
        warn!(operation, attempts = budget, "action retries exhausted: {}", report.description);
        Err(self.attach_screenshot(TetherError::StaleElement(Box::new(report))))
    }

    /// Sleep between action attempts; `true` means cancelled
    fn pause(&self, duration: Duration) -> bool {
        match &self.cancel {
            Some(token) => token.wait_timeout(duration),
            None => {
                std::thread::sleep(duration);
                false
            }
        }
    }

    fn cancelled(&self, description: String, start: Instant) -> TetherError {
        TetherError::Cancelled {
            description,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}
