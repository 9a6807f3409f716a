//! Subscriber setup for test binaries.
//!
//! The library only emits `tracing` events. Test suites that want to see poll
//! attempts call [`init`] (or [`init_json`] for machine-readable logs) once;
//! the filter comes from `TETHER_LOG`, e.g. `TETHER_LOG=tether=trace`.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TETHER_LOG";

/// Filter used when `TETHER_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "warn";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber writing to the test writer.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_test_writer()
        .try_init()
        .is_ok()
}

/// Install a JSON subscriber writing to stderr.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_json() -> bool {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
