//! Structured failure reports.
//!
//! A [`FailureReport`] is what a test-framework integration attaches to its
//! own report when a fragment operation fails: what was expected, how long
//! the wait took, and the last concrete observation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::poll::Observation;
use crate::result::TetherResult;

/// Screenshot data with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Screenshot {
    /// Raw PNG data, serialized as base64
    #[serde(serialize_with = "serialize_base64")]
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Capture time
    pub captured_at: DateTime<Utc>,
}

impl Screenshot {
    /// Create a new screenshot
    #[must_use]
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            captured_at: Utc::now(),
        }
    }

    /// Get the size in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Check if screenshot is valid (has data)
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty() && self.width > 0 && self.height > 0
    }

    /// PNG data as a base64 string
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

/// Failure details surfaced by every unrecovered fragment failure
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Unique id, for correlating with external artifacts
    pub id: Uuid,
    /// Operation that failed (`verify_present`, `click`, ...)
    pub operation: String,
    /// Human-readable description of what was expected
    pub description: String,
    /// Time spent waiting
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Number of attempts made
    pub attempts: usize,
    /// Last concrete observation
    pub last_observation: Observation,
    /// When the failure was surfaced
    pub occurred_at: DateTime<Utc>,
    /// Screenshot captured at failure time, if enabled and available
    pub screenshot: Option<Screenshot>,
}

impl FailureReport {
    /// Create a report without a screenshot
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        description: impl Into<String>,
        elapsed: Duration,
        attempts: usize,
        last_observation: Observation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation: operation.into(),
            description: description.into(),
            elapsed,
            attempts,
            last_observation,
            occurred_at: Utc::now(),
            screenshot: None,
        }
    }

    /// Attach a screenshot
    #[must_use]
    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    /// Serialize to pretty JSON for attaching to a test report
    pub fn to_json(&self) -> TetherResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}; last observed {} after {} attempt(s) in {:.2}s",
            self.operation,
            self.description,
            self.last_observation,
            self.attempts,
            self.elapsed.as_secs_f64()
        )?;
        if self.screenshot.is_some() {
            write!(f, " [screenshot attached]")?;
        }
        Ok(())
    }
}
