//! Driver abstraction consumed by fragments.
//!
//! Tether does not talk to a browser itself. A driver collaborator (a
//! WebDriver client, a CDP session, an in-memory DOM for tests, ...) supplies
//! the single primitive the core needs: find the elements matching a
//! [`Selector`], either in the whole document or inside one element.
//!
//! ```text
//! ┌──────────────┐  resolve(criteria)  ┌──────────────┐  find_all(scope, selector)  ┌──────────┐
//! │   Fragment   │ ──────────────────► │  DriverPort  │ ──────────────────────────► │  Driver  │
//! └──────────────┘                     └──────────────┘                             └──────────┘
//! ```
//!
//! Every call may fail with a [`DriverError`]; stale and not-interactable
//! failures are transient and get retried by the poller.

use std::fmt::Debug;
use thiserror::Error;

use crate::criteria::Selector;
use crate::report::Screenshot;

/// Errors reported by a driver collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The handle no longer refers to a live node
    #[error("stale element: {0}")]
    Stale(String),

    /// The element exists but cannot receive the interaction right now
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// Transient connectivity failure talking to the browser
    #[error("driver disconnected: {0}")]
    Disconnected(String),

    /// The driver cannot interpret the selector
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Any other driver failure
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Whether the poller should swallow this failure and try again
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Stale(_) | Self::NotInteractable(_) | Self::Disconnected(_)
        )
    }

    /// Whether this is a stale-element failure
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// A live, possibly invalidated, reference to a DOM node.
///
/// Handles are only ever held for the duration of a single attempt; fragments
/// never keep one across operations.
pub trait Element: Clone + Debug + Send + Sync {
    /// Visible text content
    fn text(&self) -> Result<String, DriverError>;

    /// Attribute value, `None` when the attribute is absent
    fn attribute(&self, name: &str) -> Result<Option<String>, DriverError>;

    /// Whether the element is rendered and visible
    fn is_displayed(&self) -> Result<bool, DriverError>;

    /// Click the element
    fn click(&self) -> Result<(), DriverError>;

    /// Type text into the element
    fn send_keys(&self, text: &str) -> Result<(), DriverError>;

    /// Clear an editable element
    fn clear(&self) -> Result<(), DriverError>;
}

/// Primitive element lookup supplied by the browser collaborator.
///
/// Implementations must return matches in a deterministic order (document
/// order, or whatever order the underlying lookup yields) and must return an
/// empty vector, not an error, when nothing matches.
pub trait Driver: Send + Sync {
    /// Handle type produced by this driver
    type Element: Element;

    /// Find all elements matching `selector`, inside `scope` when given
    fn find_all(
        &self,
        scope: Option<&Self::Element>,
        selector: &Selector,
    ) -> Result<Vec<Self::Element>, DriverError>;

    /// Capture a screenshot for failure reports; drivers without the
    /// capability keep the default
    fn screenshot(&self) -> Result<Option<Screenshot>, DriverError> {
        Ok(None)
    }
}
