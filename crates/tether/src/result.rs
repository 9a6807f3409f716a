//! Result and error types for Tether.
//!
//! Every verification or action either succeeds or fails with one of the
//! [`TetherError`] variants below. Timed-out synchronization failures carry a
//! [`FailureReport`] so a failing run can be diagnosed without re-running it.

use serde::Serialize;
use thiserror::Error;

use crate::report::FailureReport;

/// Result type for Tether operations
pub type TetherResult<T> = Result<T, TetherError>;

/// Stable, data-free classification of a [`TetherError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Expected presence, timed out with zero matches
    NotFound,
    /// Expected absence, timed out with matches still present
    StillPresent,
    /// Expected count never reached
    CountMismatch,
    /// Text or attribute never matched
    ValueMismatch,
    /// Action retry budget exhausted, or a one-shot query hit a stale or
    /// transient driver failure
    StaleElement,
    /// Generic poll timeout
    Timeout,
    /// Malformed criteria (never retried)
    InvalidCriteria,
    /// Poll loop aborted through a cancel token
    Cancelled,
    /// Fatal driver failure
    Driver,
    /// Configuration error
    Config,
    /// I/O or (de)serialization failure
    Io,
}

/// Errors that can occur in Tether
#[derive(Debug, Error)]
pub enum TetherError {
    /// Expected presence, timed out with zero matches
    #[error("element not found: {0}")]
    NotFound(Box<FailureReport>),

    /// Expected absence, timed out with at least one match
    #[error("element still present: {0}")]
    StillPresent(Box<FailureReport>),

    /// Expected an exact or ranged count, timed out with a different one
    #[error("element count mismatch: {0}")]
    CountMismatch(Box<FailureReport>),

    /// Text or attribute value never matched
    #[error("value mismatch: {0}")]
    ValueMismatch(Box<FailureReport>),

    /// Element kept going stale while an action was attempted, or a
    /// one-shot query hit a stale or transient failure it does not retry
    #[error("stale element: {0}")]
    StaleElement(Box<FailureReport>),

    /// A custom poll timed out
    #[error("timed out: {0}")]
    Timeout(Box<FailureReport>),

    /// Malformed criteria, e.g. an out-of-range index or an empty selector
    #[error("invalid criteria: {message}")]
    InvalidCriteria {
        /// Error message
        message: String,
    },

    /// Poll loop aborted by an external cancellation signal
    #[error("cancelled after {elapsed_ms}ms while waiting for {description}")]
    Cancelled {
        /// What was being waited for
        description: String,
        /// Time spent before cancellation
        elapsed_ms: u64,
    },

    /// Fatal driver failure (session gone, unsupported operation, ...)
    #[error("driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Invalid configuration value
    #[error("configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TetherError {
    /// Create an invalid-criteria error
    #[must_use]
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Get the data-free kind of this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StillPresent(_) => ErrorKind::StillPresent,
            Self::CountMismatch(_) => ErrorKind::CountMismatch,
            Self::ValueMismatch(_) => ErrorKind::ValueMismatch,
            Self::StaleElement(_) => ErrorKind::StaleElement,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidCriteria { .. } => ErrorKind::InvalidCriteria,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Driver { .. } => ErrorKind::Driver,
            Self::Config { .. } => ErrorKind::Config,
            Self::Io(_) | Self::Yaml(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    /// The structured failure report, if this error carries one
    #[must_use]
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::NotFound(r)
            | Self::StillPresent(r)
            | Self::CountMismatch(r)
            | Self::ValueMismatch(r)
            | Self::StaleElement(r)
            | Self::Timeout(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn report_mut(&mut self) -> Option<&mut FailureReport> {
        match self {
            Self::NotFound(r)
            | Self::StillPresent(r)
            | Self::CountMismatch(r)
            | Self::ValueMismatch(r)
            | Self::StaleElement(r)
            | Self::Timeout(r) => Some(r),
            _ => None,
        }
    }

    /// Re-tag a generic poll timeout as a more specific error.
    ///
    /// Errors other than [`TetherError::Timeout`] pass through unchanged.
    #[must_use]
    pub fn on_timeout(self, retag: impl FnOnce(Box<FailureReport>) -> Self) -> Self {
        match self {
            Self::Timeout(report) => retag(report),
            other => other,
        }
    }

    /// Whether this error is a timed-out synchronization failure
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::StillPresent(_)
                | Self::CountMismatch(_)
                | Self::ValueMismatch(_)
                | Self::Timeout(_)
        )
    }
}
