//! Regions: a root fragment plus named child fragments.
//!
//! A region models a page section (a dialog, a form, a table) whose parts
//! are all located inside one root element. Children are scoped to the
//! root's first match and kept in insertion order.

use std::time::Instant;

use crate::capability::AsFragment;
use crate::config::SyncConfig;
use crate::criteria::SearchCriteria;
use crate::driver::Driver;
use crate::fragment::Fragment;
use crate::result::{TetherError, TetherResult};

#[derive(Debug)]
struct Part<D: Driver> {
    name: String,
    fragment: Fragment<D>,
    required: bool,
}

impl<D: Driver> Clone for Part<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fragment: self.fragment.clone(),
            required: self.required,
        }
    }
}

/// Root fragment with ordered, named children
#[derive(Debug)]
pub struct Region<D: Driver> {
    root: Fragment<D>,
    parts: Vec<Part<D>>,
}

impl<D: Driver> Clone for Region<D> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            parts: self.parts.clone(),
        }
    }
}

impl<D: Driver> Region<D> {
    /// Create a region with no children
    #[must_use]
    pub fn new(root: Fragment<D>) -> Self {
        Self {
            root,
            parts: Vec::new(),
        }
    }

    fn with_part(mut self, name: impl Into<String>, criteria: SearchCriteria, required: bool) -> Self {
        let part = Part {
            name: name.into(),
            fragment: self.root.child(criteria),
            required,
        };
        match self.parts.iter_mut().find(|p| p.name == part.name) {
            Some(existing) => *existing = part,
            None => self.parts.push(part),
        }
        self
    }

    /// Add a child that must be present for the region to count as loaded.
    /// Re-using a name replaces the earlier child in place.
    #[must_use]
    pub fn with_child(self, name: impl Into<String>, criteria: impl Into<SearchCriteria>) -> Self {
        self.with_part(name, criteria.into(), true)
    }

    /// Add a child that may legitimately be absent
    #[must_use]
    pub fn with_optional_child(
        self,
        name: impl Into<String>,
        criteria: impl Into<SearchCriteria>,
    ) -> Self {
        self.with_part(name, criteria.into(), false)
    }

    /// Apply a config to the root and every child
    #[must_use]
    pub fn with_config(&self, config: SyncConfig) -> Self {
        Self {
            root: self.root.with_config(config),
            parts: self
                .parts
                .iter()
                .map(|p| Part {
                    fragment: p.fragment.with_config(config),
                    ..p.clone()
                })
                .collect(),
        }
    }

    /// Get the root fragment
    #[must_use]
    pub const fn root(&self) -> &Fragment<D> {
        &self.root
    }

    /// Get a child by name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Fragment<D>> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.fragment)
    }

    /// Get a child by name, failing for an unknown name
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::InvalidCriteria`] if no child has that name
    pub fn expect_child(&self, name: &str) -> TetherResult<&Fragment<D>> {
        self.child(name).ok_or_else(|| {
            TetherError::invalid_criteria(format!(
                "region {} has no child named `{name}`",
                self.root
            ))
        })
    }

    /// Child names in insertion order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.parts.iter().map(|p| p.name.as_str()).collect()
    }

    /// Number of children
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the region has no children
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Wait for the root and then every required child, in insertion order.
    ///
    /// The whole check shares the root's timeout: each child only gets what
    /// is left of it, and still makes at least one lookup.
    ///
    /// # Errors
    ///
    /// The first `NotFound` (or fatal error) encountered
    pub fn verify_loaded(&self) -> TetherResult<()> {
        let start = Instant::now();
        let budget = self.root.config().timeout();
        self.root.verify_present()?;
        for part in self.parts.iter().filter(|p| p.required) {
            let remaining = budget.saturating_sub(start.elapsed());
            part.fragment.with_timeout(remaining).verify_present()?;
        }
        Ok(())
    }
}

impl<D: Driver> AsFragment for Region<D> {
    type Driver = D;

    fn fragment(&self) -> &Fragment<D> {
        &self.root
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockNode};
    use crate::result::ErrorKind;
    use std::time::Duration;

    fn login(driver: &MockDriver) -> Region<MockDriver> {
        let root = Fragment::from_driver(driver.clone(), "form.login");
        Region::new(root)
            .with_child("user", "input.user")
            .with_child("submit", SearchCriteria::test_id("submit"))
            .with_optional_child("error", "p.error")
            .with_config(SyncConfig::new().with_timeout_ms(80).with_poll_interval_ms(5))
    }

    #[test]
    fn test_names_keep_order() {
        let driver = MockDriver::new();
        assert_eq!(login(&driver).names(), vec!["user", "submit", "error"]);
        assert_eq!(login(&driver).len(), 3);
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let driver = MockDriver::new();
        let region = login(&driver).with_child("user", "input.email");
        assert_eq!(region.names(), vec!["user", "submit", "error"]);
        assert_eq!(
            region.child("user").unwrap().criteria().selector().value(),
            "input.email"
        );
    }

    #[test]
    fn test_children_are_scoped_to_root() {
        let driver = MockDriver::new();
        let form = driver.add(MockNode::new("form.login"));
        driver.add(MockNode::new("input.user"));
        let inside = driver.add_child(form, MockNode::new("input.user"));
        let found = login(&driver).child("user").unwrap().find_all_instantly().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), inside);
    }

    #[test]
    fn test_verify_loaded() {
        let driver = MockDriver::new();
        let form = driver.add(MockNode::new("form.login"));
        driver.add_child(form, MockNode::new("input.user"));
        let region = login(&driver);
        assert_eq!(region.verify_loaded().unwrap_err().kind(), ErrorKind::NotFound);

        driver.add_child(form, MockNode::new("button").test_id("submit"));
        region.verify_loaded().unwrap();
    }

    #[test]
    fn test_verify_loaded_shares_one_deadline() {
        let driver = MockDriver::new();
        driver.add(MockNode::new("form.login").appears_after(10));
        let region = login(&driver).with_config(
            SyncConfig::new()
                .with_timeout_ms(100)
                .with_poll_interval_ms(5),
        );

        let err = region.verify_loaded().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let report = err.report().unwrap();
        assert_eq!(report.operation, "verify_present");
        assert!(report.elapsed < Duration::from_millis(100), "{report}");
    }

    #[test]
    fn test_expect_child() {
        let driver = MockDriver::new();
        let region = login(&driver);
        assert!(region.expect_child("submit").is_ok());
        assert_eq!(
            region.expect_child("nope").unwrap_err().kind(),
            ErrorKind::InvalidCriteria
        );
    }
}
