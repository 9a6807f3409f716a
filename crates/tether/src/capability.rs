//! Capability traits for concrete fragment types.
//!
//! A concrete fragment type (a save button, an order table, a login form)
//! wraps a [`Fragment`] and opts into the operation sets that make sense for
//! it. Every capability is a trait with default methods over
//! [`AsFragment`], so opting in is an empty impl:
//!
//! ```
//! use tether::mock::MockDriver;
//! use tether::{AsFragment, Clickable, Fragment, Texted};
//!
//! struct SaveButton(Fragment<MockDriver>);
//!
//! impl AsFragment for SaveButton {
//!     type Driver = MockDriver;
//!
//!     fn fragment(&self) -> &Fragment<MockDriver> {
//!         &self.0
//!     }
//! }
//!
//! impl Clickable for SaveButton {}
//! impl Texted for SaveButton {}
//! ```
//!
//! With the `derive` feature the impls above are generated by
//! `#[derive(Fragment)]`.

use crate::criteria::TextMatcher;
use crate::driver::Driver;
use crate::fragment::Fragment;
use crate::result::TetherResult;

/// Access to the fragment behind a concrete fragment type
pub trait AsFragment {
    /// Driver the fragment resolves against
    type Driver: Driver;

    /// The underlying fragment
    fn fragment(&self) -> &Fragment<Self::Driver>;
}

impl<D: Driver> AsFragment for Fragment<D> {
    type Driver = D;

    fn fragment(&self) -> &Self {
        self
    }
}

/// Can be clicked
pub trait Clickable: AsFragment {
    /// See [`Fragment::click`]
    ///
    /// # Errors
    ///
    /// `NotFound` or `StaleElement`
    fn click(&self) -> TetherResult<()> {
        self.fragment().click()
    }
}

/// Has text content
pub trait Texted: AsFragment {
    /// See [`Fragment::text`]
    ///
    /// # Errors
    ///
    /// `NotFound` on timeout
    fn text(&self) -> TetherResult<String> {
        self.fragment().text()
    }

    /// See [`Fragment::verify_text`]
    ///
    /// # Errors
    ///
    /// `ValueMismatch` or `NotFound` on timeout
    fn verify_text(&self, expected: impl Into<TextMatcher>) -> TetherResult<()> {
        self.fragment().verify_text(expected)
    }

    /// See [`Fragment::verify_text_contains`]
    ///
    /// # Errors
    ///
    /// `ValueMismatch` or `NotFound` on timeout
    fn verify_text_contains(&self, text: impl Into<String>) -> TetherResult<()> {
        self.fragment().verify_text_contains(text)
    }

    /// See [`Fragment::verify_text_matches`]
    ///
    /// # Errors
    ///
    /// `InvalidCriteria` for a bad pattern, otherwise as `verify_text`
    fn verify_text_matches(&self, pattern: &str) -> TetherResult<()> {
        self.fragment().verify_text_matches(pattern)
    }
}

/// Is a list whose size matters
pub trait Countable: AsFragment {
    /// See [`Fragment::count_instantly`]
    ///
    /// # Errors
    ///
    /// Fatal resolution errors
    fn count_instantly(&self) -> TetherResult<usize> {
        self.fragment().count_instantly()
    }

    /// See [`Fragment::verify_size`]
    ///
    /// # Errors
    ///
    /// `CountMismatch` on timeout
    fn verify_size(&self, n: usize) -> TetherResult<()> {
        self.fragment().verify_size(n)
    }

    /// See [`Fragment::verify_size_at_least`]
    ///
    /// # Errors
    ///
    /// `CountMismatch` on timeout
    fn verify_size_at_least(&self, n: usize) -> TetherResult<()> {
        self.fragment().verify_size_at_least(n)
    }

    /// See [`Fragment::verify_size_between`]
    ///
    /// # Errors
    ///
    /// `CountMismatch` on timeout
    fn verify_size_between(&self, min: usize, max: usize) -> TetherResult<()> {
        self.fragment().verify_size_between(min, max)
    }

    /// See [`Fragment::texts`]
    ///
    /// # Errors
    ///
    /// `Timeout` if rows keep going stale
    fn texts(&self) -> TetherResult<Vec<String>> {
        self.fragment().texts()
    }
}

/// Accepts typed input
pub trait Typeable: AsFragment {
    /// See [`Fragment::send_keys`]
    ///
    /// # Errors
    ///
    /// `NotFound` or `StaleElement`
    fn send_keys(&self, text: &str) -> TetherResult<()> {
        self.fragment().send_keys(text)
    }

    /// See [`Fragment::clear_and_type`]
    ///
    /// # Errors
    ///
    /// `NotFound` or `StaleElement`
    fn clear_and_type(&self, text: &str) -> TetherResult<()> {
        self.fragment().clear_and_type(text)
    }
}

/// Can be shown or hidden
pub trait Displayed: AsFragment {
    /// See [`Fragment::verify_displayed`]
    ///
    /// # Errors
    ///
    /// `ValueMismatch` or `NotFound` on timeout
    fn verify_displayed(&self) -> TetherResult<()> {
        self.fragment().verify_displayed()
    }

    /// See [`Fragment::verify_hidden`]
    ///
    /// # Errors
    ///
    /// `ValueMismatch` on timeout
    fn verify_hidden(&self) -> TetherResult<()> {
        self.fragment().verify_hidden()
    }
}

/// Has attributes worth checking
pub trait Attributed: AsFragment {
    /// See [`Fragment::attribute`]
    ///
    /// # Errors
    ///
    /// `NotFound` on timeout
    fn attribute(&self, name: &str) -> TetherResult<Option<String>> {
        self.fragment().attribute(name)
    }

    /// See [`Fragment::verify_attribute`]
    ///
    /// # Errors
    ///
    /// `ValueMismatch` or `NotFound` on timeout
    fn verify_attribute(&self, name: &str, expected: impl Into<TextMatcher>) -> TetherResult<()> {
        self.fragment().verify_attribute(name, expected)
    }
}

impl<D: Driver> Clickable for Fragment<D> {}
impl<D: Driver> Texted for Fragment<D> {}
impl<D: Driver> Countable for Fragment<D> {}
impl<D: Driver> Typeable for Fragment<D> {}
impl<D: Driver> Displayed for Fragment<D> {}
impl<D: Driver> Attributed for Fragment<D> {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::mock::{MockDriver, MockNode};
    use crate::result::ErrorKind;

    struct SaveButton(Fragment<MockDriver>);

    impl AsFragment for SaveButton {
        type Driver = MockDriver;

        fn fragment(&self) -> &Fragment<MockDriver> {
            &self.0
        }
    }

    impl Clickable for SaveButton {}
    impl Texted for SaveButton {}

    struct Rows(Fragment<MockDriver>);

    impl AsFragment for Rows {
        type Driver = MockDriver;

        fn fragment(&self) -> &Fragment<MockDriver> {
            &self.0
        }
    }

    impl Countable for Rows {}

    fn config() -> SyncConfig {
        SyncConfig::new().with_timeout_ms(100).with_poll_interval_ms(5)
    }

    #[test]
    fn test_capabilities_delegate() {
        let driver = MockDriver::new();
        let id = driver.add(MockNode::new("button").text("Save"));
        let button = SaveButton(Fragment::from_driver(driver.clone(), "button").with_config(config()));
        button.verify_text("Save").unwrap();
        button.click().unwrap();
        assert_eq!(driver.clicks(id), 1);
    }

    #[test]
    fn test_countable() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("tr").text("a"));
        driver.add(MockNode::new("tr").text("b"));
        let rows = Rows(Fragment::from_driver(driver, "tr").with_config(config()));
        assert_eq!(rows.count_instantly().unwrap(), 2);
        rows.verify_size(2).unwrap();
        assert_eq!(rows.texts().unwrap(), vec!["a", "b"]);
        assert_eq!(rows.verify_size(3).unwrap_err().kind(), ErrorKind::CountMismatch);
    }

    #[test]
    fn test_generic_over_capability() {
        fn press<C: Clickable>(target: &C) -> TetherResult<()> {
            target.click()
        }

        let driver = MockDriver::new();
        let id = driver.add(MockNode::new("button"));
        let fragment = Fragment::from_driver(driver.clone(), "button").with_config(config());
        press(&fragment).unwrap();
        press(&SaveButton(fragment)).unwrap();
        assert_eq!(driver.clicks(id), 2);
    }
}
