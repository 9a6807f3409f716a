//! Tether: lazy, self-resynchronizing element fragments for browser automation.
//!
//! Any element reference can go stale between the moment it is located and
//! the moment it is used, and the moment an expected UI state becomes true
//! is not knowable in advance. Tether never holds on to elements. A
//! [`Fragment`] is a recipe ([`SearchCriteria`]) plus a driver; every
//! operation re-resolves the recipe and polls until the expected state shows
//! up or the timeout passes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              TETHER                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  narrow   ┌──────────────┐                         │
//! │  │  Fragment    │ ────────► │  Fragment    │  (new value, no I/O)    │
//! │  └──────┬───────┘           └──────────────┘                         │
//! │         │ verify_* / click / text                                    │
//! │         ▼                                                            │
//! │  ┌──────────────┐  attempt  ┌──────────────┐  find_all  ┌────────┐   │
//! │  │   Poller     │ ────────► │  DriverPort  │ ─────────► │ Driver │   │
//! │  │ (retry loop) │ ◄──────── │  (resolve)   │ ◄───────── │        │   │
//! │  └──────────────┘ Condition └──────────────┘  elements  └────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tether::mock::{MockDriver, MockNode};
//! use tether::prelude::*;
//!
//! let driver = MockDriver::new();
//! let form = driver.add(MockNode::new("form"));
//! let input = driver.add_child(form, MockNode::new("input"));
//! driver.add_child(form, MockNode::new("button").text("Send").appears_after(2));
//!
//! let form = Fragment::new(Arc::new(driver.clone()), "form")
//!     .with_config(SyncConfig::new().with_poll_interval_ms(5));
//!
//! form.child("input").clear_and_type("hello")?;
//! form.child("button").verify_text("Send")?;
//! form.child("button").click()?;
//!
//! assert_eq!(driver.attribute(input, "value").as_deref(), Some("hello"));
//! # Ok::<(), tether::TetherError>(())
//! ```

#![warn(missing_docs)]

mod capability;
mod criteria;
mod driver;
mod fragment;
mod poll;
mod port;
mod region;
mod report;
mod result;

/// Synchronization configuration and process-wide defaults
pub mod config;

/// Subscriber setup for test binaries
pub mod logging;

/// In-memory driver for tests
pub mod mock;

pub use capability::{AsFragment, Attributed, Clickable, Countable, Displayed, Texted, Typeable};
pub use config::SyncConfig;
pub use criteria::{Filter, Scope, SearchCriteria, Selector, TextMatcher};
pub use driver::{Driver, DriverError, Element};
pub use fragment::Fragment;
pub use poll::{
    poll_until, Backoff, CancelToken, Condition, Observation, PollConfig, Polled, Poller,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS,
};
pub use port::DriverPort;
pub use region::Region;
pub use report::{FailureReport, Screenshot};
pub use result::{ErrorKind, TetherError, TetherResult};

// Re-export the derive macro when the `derive` feature is enabled
#[cfg(feature = "derive")]
pub use tether_derive::Fragment;

/// Everything needed to write fragment-based tests
pub mod prelude {
    pub use super::capability::*;
    pub use super::config::SyncConfig;
    pub use super::criteria::{SearchCriteria, Selector, TextMatcher};
    pub use super::driver::{Driver, DriverError, Element};
    pub use super::fragment::Fragment;
    pub use super::poll::{Backoff, CancelToken, Condition, Observation};
    pub use super::port::DriverPort;
    pub use super::region::Region;
    pub use super::result::{ErrorKind, TetherError, TetherResult};

    #[cfg(feature = "derive")]
    pub use tether_derive::Fragment;
}
