//! Synchronization configuration.
//!
//! [`SyncConfig`] holds the timing knobs every fragment operation uses. A
//! process-wide default is read once (YAML file, environment, or built-in
//! values) and never changes afterwards; per-call overrides live on the
//! fragment itself.
//!
//! ```yaml
//! timeout_ms: 10000
//! poll_interval_ms: 50
//! backoff:
//!   kind: exponential
//!   factor: 2.0
//!   max_interval_ms: 1000
//! action_retries: 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

use crate::poll::{Backoff, PollConfig, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::result::{TetherError, TetherResult};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default number of attempts for an action hitting stale elements
pub const DEFAULT_ACTION_RETRIES: usize = 3;

/// Default pause between action attempts (50ms)
pub const DEFAULT_ACTION_RETRY_DELAY_MS: u64 = 50;

/// Environment variable overriding [`SyncConfig::timeout_ms`]
pub const ENV_TIMEOUT_MS: &str = "TETHER_TIMEOUT_MS";
/// Environment variable overriding [`SyncConfig::poll_interval_ms`]
pub const ENV_POLL_INTERVAL_MS: &str = "TETHER_POLL_INTERVAL_MS";
/// Environment variable overriding [`SyncConfig::action_retries`]
pub const ENV_ACTION_RETRIES: &str = "TETHER_ACTION_RETRIES";
/// Environment variable overriding [`SyncConfig::capture_screenshots`]
pub const ENV_CAPTURE_SCREENSHOTS: &str = "TETHER_CAPTURE_SCREENSHOTS";

// =============================================================================
// SYNC CONFIG
// =============================================================================

/// Timing and retry configuration for fragment operations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Overall timeout for polled operations in milliseconds
    pub timeout_ms: u64,
    /// Initial pause between poll attempts in milliseconds
    pub poll_interval_ms: u64,
    /// Poll interval growth
    pub backoff: Backoff,
    /// Attempts an action makes before giving up on a stale element
    pub action_retries: usize,
    /// Pause between action attempts in milliseconds
    pub action_retry_delay_ms: u64,
    /// Wait for presence before acting instead of failing on the first miss
    pub action_waits_for_presence: bool,
    /// Attach a driver screenshot to failure reports
    pub capture_screenshots: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: Backoff::Fixed,
            action_retries: DEFAULT_ACTION_RETRIES,
            action_retry_delay_ms: DEFAULT_ACTION_RETRY_DELAY_MS,
            action_waits_for_presence: false,
            capture_screenshots: true,
        }
    }
}

impl SyncConfig {
    /// Create a config with built-in defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set backoff strategy
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the action attempt budget
    #[must_use]
    pub const fn with_action_retries(mut self, retries: usize) -> Self {
        self.action_retries = retries;
        self
    }

    /// Set the pause between action attempts in milliseconds
    #[must_use]
    pub const fn with_action_retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.action_retry_delay_ms = delay_ms;
        self
    }

    /// Wait for presence before acting
    #[must_use]
    pub const fn with_action_waits_for_presence(mut self, wait: bool) -> Self {
        self.action_waits_for_presence = wait;
        self
    }

    /// Enable or disable screenshots on failure
    #[must_use]
    pub const fn with_capture_screenshots(mut self, capture: bool) -> Self {
        self.capture_screenshots = capture;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get action retry delay as Duration
    #[must_use]
    pub const fn action_retry_delay(&self) -> Duration {
        Duration::from_millis(self.action_retry_delay_ms)
    }

    /// Timing for a poll loop
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: self.timeout(),
            poll_interval: self.poll_interval(),
            backoff: self.backoff,
        }
    }

    /// Check values that would make every operation fail.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Config`] for a zero action budget or a
    /// non-finite or shrinking backoff factor
    pub fn validate(&self) -> TetherResult<()> {
        if self.action_retries == 0 {
            return Err(TetherError::config("action_retries must be at least 1"));
        }
        if let Backoff::Exponential { factor, .. } = self.backoff {
            if !factor.is_finite() || factor < 1.0 {
                return Err(TetherError::config(format!(
                    "backoff factor must be a finite number >= 1.0, got {factor}"
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a YAML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or fails validation
    pub fn from_yaml_str(yaml: &str) -> TetherResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> TetherResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Serialize to YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_yaml(&self) -> TetherResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `TETHER_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Config`] if a variable is set to an invalid value
    pub fn with_env_overrides(self) -> TetherResult<Self> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::Config`] if a variable is set to an invalid value
    pub fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> TetherResult<Self> {
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = parse_var(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_var(ENV_POLL_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_ACTION_RETRIES) {
            self.action_retries = parse_var(ENV_ACTION_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_CAPTURE_SCREENSHOTS) {
            self.capture_screenshots = parse_flag(ENV_CAPTURE_SCREENSHOTS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> TetherResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TetherError::config(format!("{name}={value:?}: {e}")))
}

fn parse_flag(name: &str, value: &str) -> TetherResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TetherError::config(format!(
            "{name}={value:?}: expected true or false"
        ))),
    }
}

// =============================================================================
// PROCESS-WIDE DEFAULTS
// =============================================================================

static DEFAULTS: OnceLock<SyncConfig> = OnceLock::new();

/// Install the process-wide defaults. Must happen before the first fragment
/// reads them.
///
/// # Errors
///
/// Returns [`TetherError::Config`] if the config is invalid or defaults were
/// already initialized
pub fn install(config: SyncConfig) -> TetherResult<()> {
    config.validate()?;
    DEFAULTS
        .set(config)
        .map_err(|_| TetherError::config("process-wide defaults are already initialized"))
}

/// The process-wide defaults: the installed config, or built-in values with
/// environment overrides applied on first use
#[must_use]
pub fn defaults() -> SyncConfig {
    *DEFAULTS.get_or_init(|| {
        SyncConfig::default()
            .with_env_overrides()
            .unwrap_or_else(|err| {
                warn!(error = %err, "ignoring invalid environment overrides");
                SyncConfig::default()
            })
    })
}
