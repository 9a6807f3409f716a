//! In-memory driver for unit and integration tests.
//!
//! [`MockDriver`] holds a tiny DOM: a tree of nodes, each labelled with one
//! or more selector strings. It does not parse CSS: a `Css` selector matches a
//! node carrying exactly that label, a `TestId` selector matches the node's
//! `data-testid` attribute, and `XPath` is rejected as an invalid selector.
//!
//! The DOM can be mutated while fragments poll it, from the same thread
//! (scripted by lookup count) or from another thread (the driver is a cheap
//! cloneable handle):
//!
//! ```
//! use tether::mock::{MockDriver, MockNode};
//!
//! let driver = MockDriver::new();
//! let list = driver.add(MockNode::new("ul"));
//! let row = driver.add_child(list, MockNode::new("li").text("Paid").appears_after(2));
//!
//! // re-render: handles to the old node now report a stale element
//! let fresh = driver.replace(row);
//! assert_ne!(row, fresh);
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::criteria::Selector;
use crate::driver::{Driver, DriverError, Element};
use crate::report::Screenshot;

/// Identifier of a node in a [`MockDriver`] DOM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Description of a node to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNode {
    labels: Vec<String>,
    text: String,
    attributes: BTreeMap<String, String>,
    displayed: bool,
    appears_after: usize,
    disappears_after: Option<usize>,
}

impl MockNode {
    /// Create a node matched by the CSS selector `label`
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            labels: vec![label.into()],
            text: String::new(),
            attributes: BTreeMap::new(),
            displayed: true,
            appears_after: 0,
            disappears_after: None,
        }
    }

    /// Also match the CSS selector `label`
    #[must_use]
    pub fn also(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Set the text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the `data-testid` attribute
    #[must_use]
    pub fn test_id(self, id: impl Into<String>) -> Self {
        self.attr("data-testid", id)
    }

    /// Render the node but report it as not displayed
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Keep the node out of the DOM for the first `lookups` driver lookups
    #[must_use]
    pub const fn appears_after(mut self, lookups: usize) -> Self {
        self.appears_after = lookups;
        self
    }

    /// Detach the node once `lookups` driver lookups have been made
    #[must_use]
    pub const fn disappears_after(mut self, lookups: usize) -> Self {
        self.disappears_after = Some(lookups);
        self
    }

    fn matches(&self, selector: &Selector) -> Result<bool, DriverError> {
        match selector {
            Selector::Css(css) => Ok(self.labels.iter().any(|l| l == css)),
            Selector::TestId(id) => Ok(self.attributes.get("data-testid") == Some(id)),
            Selector::XPath(xpath) => Err(DriverError::InvalidSelector(format!(
                "mock driver cannot evaluate xpath `{xpath}`"
            ))),
        }
    }
}

#[derive(Debug)]
struct NodeData {
    node: MockNode,
    parent: Option<NodeId>,
    /// Document-order key; a replacement inherits the key of the node it
    /// replaces
    order: usize,
    attached: bool,
    clicks: usize,
    action_failures: VecDeque<DriverError>,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: Vec<NodeData>,
    lookups: usize,
    lookup_failures: VecDeque<DriverError>,
    screenshot: Option<Screenshot>,
    history: Vec<String>,
}

impl MockState {
    fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    fn data_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0)
    }

    /// Whether `id` and all of its ancestors are in the DOM at lookup `at`
    fn is_present(&self, id: NodeId, at: usize) -> bool {
        let Some(data) = self.data(id) else {
            return false;
        };
        let scripted = at >= data.node.appears_after
            && data.node.disappears_after.map_or(true, |gone| at < gone);
        data.attached && scripted && data.parent.map_or(true, |p| self.is_present(p, at))
    }

    fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.data(id).and_then(|d| d.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.data(parent).and_then(|d| d.parent);
        }
        false
    }

    fn insert(&mut self, parent: Option<NodeId>, node: MockNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            node,
            parent,
            order: id.0,
            attached: true,
            clicks: 0,
            action_failures: VecDeque::new(),
        });
        id
    }

    /// Live node data for an element operation
    fn live(&mut self, id: NodeId) -> Result<&mut NodeData, DriverError> {
        let at = self.lookups;
        if !self.is_present(id, at) {
            return Err(DriverError::Stale(format!("node {id} is no longer attached")));
        }
        self.data_mut(id)
            .ok_or_else(|| DriverError::Stale(format!("unknown node {id}")))
    }

    /// Live node data for an action, consuming a queued failure first
    fn actionable(&mut self, id: NodeId, action: &str) -> Result<&mut NodeData, DriverError> {
        self.history.push(format!("{action}:{id}"));
        let data = self.live(id)?;
        if let Some(err) = data.action_failures.pop_front() {
            return Err(err);
        }
        if !data.node.displayed {
            return Err(DriverError::NotInteractable(format!("node {id} is not displayed")));
        }
        Ok(data)
    }
}

/// Cloneable handle to an in-memory DOM
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create an empty DOM
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a top-level node
    pub fn add(&self, node: MockNode) -> NodeId {
        self.state().insert(None, node)
    }

    /// Append a node under `parent`
    pub fn add_child(&self, parent: NodeId, node: MockNode) -> NodeId {
        self.state().insert(Some(parent), node)
    }

    /// Detach a node and its subtree
    pub fn remove(&self, id: NodeId) {
        if let Some(data) = self.state().data_mut(id) {
            data.attached = false;
        }
    }

    /// Re-render a node: the old node is detached (its handles go stale) and
    /// an identical node takes its place in document order. Children move
    /// to the new node.
    pub fn replace(&self, id: NodeId) -> NodeId {
        let mut state = self.state();
        let Some(old) = state.data_mut(id) else {
            return id;
        };
        old.attached = false;
        let mut node = old.node.clone();
        node.appears_after = 0;
        node.disappears_after = None;
        let (parent, order) = (old.parent, old.order);

        let fresh = state.insert(parent, node);
        if let Some(data) = state.data_mut(fresh) {
            data.order = order;
        }
        for data in &mut state.nodes {
            if data.parent == Some(id) {
                data.parent = Some(fresh);
            }
        }
        fresh
    }

    /// Change a node's text
    pub fn set_text(&self, id: NodeId, text: impl Into<String>) {
        if let Some(data) = self.state().data_mut(id) {
            data.node.text = text.into();
        }
    }

    /// Change a node's attribute
    pub fn set_attribute(&self, id: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(data) = self.state().data_mut(id) {
            data.node.attributes.insert(name.into(), value.into());
        }
    }

    /// Show or hide a node
    pub fn set_displayed(&self, id: NodeId, displayed: bool) {
        if let Some(data) = self.state().data_mut(id) {
            data.node.displayed = displayed;
        }
    }

    /// Make the next action on `id` fail with `err`; failures queue up
    pub fn fail_next_action(&self, id: NodeId, err: DriverError) {
        if let Some(data) = self.state().data_mut(id) {
            data.action_failures.push_back(err);
        }
    }

    /// Make the next lookup fail with `err`; failures queue up
    pub fn fail_next_lookup(&self, err: DriverError) {
        self.state().lookup_failures.push_back(err);
    }

    /// Screenshot returned to failure reports
    pub fn set_screenshot(&self, screenshot: Screenshot) {
        self.state().screenshot = Some(screenshot);
    }

    /// Number of successful clicks on `id`
    #[must_use]
    pub fn clicks(&self, id: NodeId) -> usize {
        self.state().data(id).map_or(0, |d| d.clicks)
    }

    /// Current attribute value of `id`
    #[must_use]
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.state()
            .data(id)
            .and_then(|d| d.node.attributes.get(name).cloned())
    }

    /// Number of lookups made so far
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.state().lookups
    }

    /// Driver calls in order, as `operation:argument`
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if an operation was called
    #[must_use]
    pub fn was_called(&self, operation: &str) -> bool {
        self.state()
            .history
            .iter()
            .any(|c| c.split(':').next() == Some(operation))
    }
}

impl Driver for MockDriver {
    type Element = MockElement;

    fn find_all(
        &self,
        scope: Option<&MockElement>,
        selector: &Selector,
    ) -> Result<Vec<MockElement>, DriverError> {
        let mut state = self.state();
        state.history.push(format!("find_all:{selector}"));
        if let Some(err) = state.lookup_failures.pop_front() {
            return Err(err);
        }
        let at = state.lookups;
        state.lookups += 1;

        if let Some(scope) = scope {
            if !state.is_present(scope.id, at) {
                return Err(DriverError::Stale(format!(
                    "scope node {} is no longer attached",
                    scope.id
                )));
            }
        }

        let mut found = Vec::new();
        for (index, data) in state.nodes.iter().enumerate() {
            let id = NodeId(index);
            if !state.is_present(id, at) || !data.node.matches(selector)? {
                continue;
            }
            if scope.is_some_and(|s| !state.is_descendant(id, s.id)) {
                continue;
            }
            found.push((data.order, id));
        }
        found.sort_unstable();

        Ok(found
            .into_iter()
            .map(|(_, id)| MockElement {
                id,
                state: Arc::clone(&self.state),
            })
            .collect())
    }

    fn screenshot(&self) -> Result<Option<Screenshot>, DriverError> {
        let mut state = self.state();
        state.history.push("screenshot".to_string());
        Ok(state.screenshot.clone())
    }
}

/// Handle to a node of a [`MockDriver`] DOM
#[derive(Clone)]
pub struct MockElement {
    id: NodeId,
    state: Arc<Mutex<MockState>>,
}

impl MockElement {
    /// The node this handle points at
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for MockElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockElement")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for MockElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for MockElement {}

impl Element for MockElement {
    fn text(&self) -> Result<String, DriverError> {
        Ok(self.state().live(self.id)?.node.text.clone())
    }

    fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        Ok(self.state().live(self.id)?.node.attributes.get(name).cloned())
    }

    fn is_displayed(&self) -> Result<bool, DriverError> {
        Ok(self.state().live(self.id)?.node.displayed)
    }

    fn click(&self) -> Result<(), DriverError> {
        self.state().actionable(self.id, "click")?.clicks += 1;
        Ok(())
    }

    fn send_keys(&self, text: &str) -> Result<(), DriverError> {
        let mut state = self.state();
        let data = state.actionable(self.id, "send_keys")?;
        data.node
            .attributes
            .entry("value".to_string())
            .or_default()
            .push_str(text);
        Ok(())
    }

    fn clear(&self) -> Result<(), DriverError> {
        let mut state = self.state();
        let data = state.actionable(self.id, "clear")?;
        data.node.attributes.insert("value".to_string(), String::new());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ids(elements: &[MockElement]) -> Vec<NodeId> {
        elements.iter().map(MockElement::id).collect()
    }

    mod lookup_tests {
        use super::*;

        #[test]
        fn test_document_order() {
            let driver = MockDriver::new();
            let a = driver.add(MockNode::new("li"));
            let _ = driver.add(MockNode::new("p"));
            let b = driver.add(MockNode::new("li"));
            let found = driver.find_all(None, &Selector::css("li")).unwrap();
            assert_eq!(ids(&found), vec![a, b]);
        }

        #[test]
        fn test_scoped_lookup_finds_descendants_only() {
            let driver = MockDriver::new();
            let form = driver.add(MockNode::new("form"));
            let inner = driver.add_child(form, MockNode::new("div"));
            let nested = driver.add_child(inner, MockNode::new("input"));
            let _outside = driver.add(MockNode::new("input"));

            let scope = driver.find_all(None, &Selector::css("form")).unwrap();
            let found = driver.find_all(scope.first(), &Selector::css("input")).unwrap();
            assert_eq!(ids(&found), vec![nested]);
        }

        #[test]
        fn test_test_id() {
            let driver = MockDriver::new();
            let save = driver.add(MockNode::new("button").test_id("save"));
            let found = driver.find_all(None, &Selector::test_id("save")).unwrap();
            assert_eq!(ids(&found), vec![save]);
        }

        #[test]
        fn test_xpath_is_invalid() {
            let driver = MockDriver::new();
            driver.add(MockNode::new("a"));
            let err = driver.find_all(None, &Selector::xpath("//a")).unwrap_err();
            assert!(matches!(err, DriverError::InvalidSelector(_)));
        }

        #[test]
        fn test_appears_after() {
            let driver = MockDriver::new();
            driver.add(MockNode::new("li").appears_after(2));
            let sel = Selector::css("li");
            assert!(driver.find_all(None, &sel).unwrap().is_empty());
            assert!(driver.find_all(None, &sel).unwrap().is_empty());
            assert_eq!(driver.find_all(None, &sel).unwrap().len(), 1);
            assert_eq!(driver.lookups(), 3);
        }

        #[test]
        fn test_disappears_after() {
            let driver = MockDriver::new();
            driver.add(MockNode::new("spinner").disappears_after(1));
            let sel = Selector::css("spinner");
            assert_eq!(driver.find_all(None, &sel).unwrap().len(), 1);
            assert!(driver.find_all(None, &sel).unwrap().is_empty());
        }

        #[test]
        fn test_removed_subtree_is_gone() {
            let driver = MockDriver::new();
            let form = driver.add(MockNode::new("form"));
            driver.add_child(form, MockNode::new("input"));
            driver.remove(form);
            assert!(driver.find_all(None, &Selector::css("input")).unwrap().is_empty());
        }

        #[test]
        fn test_queued_lookup_failure() {
            let driver = MockDriver::new();
            driver.fail_next_lookup(DriverError::Disconnected("reset".into()));
            assert!(driver.find_all(None, &Selector::css("x")).is_err());
            assert!(driver.find_all(None, &Selector::css("x")).is_ok());
        }
    }

    mod element_tests {
        use super::*;

        #[test]
        fn test_replace_makes_old_handles_stale() {
            let driver = MockDriver::new();
            let row = driver.add(MockNode::new("li").text("Paid"));
            let old = driver.find_all(None, &Selector::css("li")).unwrap();
            let fresh = driver.replace(row);

            assert!(old[0].text().unwrap_err().is_stale());
            let found = driver.find_all(None, &Selector::css("li")).unwrap();
            assert_eq!(ids(&found), vec![fresh]);
            assert_eq!(found[0].text().unwrap(), "Paid");
        }

        #[test]
        fn test_replace_keeps_document_order() {
            let driver = MockDriver::new();
            let first = driver.add(MockNode::new("li"));
            let second = driver.add(MockNode::new("li"));
            let fresh = driver.replace(first);
            let found = driver.find_all(None, &Selector::css("li")).unwrap();
            assert_eq!(ids(&found), vec![fresh, second]);
        }

        #[test]
        fn test_actions_are_recorded() {
            let driver = MockDriver::new();
            let input = driver.add(MockNode::new("input").attr("value", "old"));
            let el = &driver.find_all(None, &Selector::css("input")).unwrap()[0];
            el.clear().unwrap();
            el.send_keys("new").unwrap();
            el.click().unwrap();
            assert_eq!(driver.attribute(input, "value").as_deref(), Some("new"));
            assert_eq!(driver.clicks(input), 1);
            assert!(driver.was_called("send_keys"));
            assert!(driver.was_called("find_all"));
            assert!(!driver.was_called("screenshot"));
        }

        #[test]
        fn test_queued_action_failure() {
            let driver = MockDriver::new();
            let button = driver.add(MockNode::new("button"));
            driver.fail_next_action(button, DriverError::Stale("re-rendered".into()));
            let el = &driver.find_all(None, &Selector::css("button")).unwrap()[0];
            assert!(el.click().unwrap_err().is_stale());
            assert!(el.click().is_ok());
            assert_eq!(driver.clicks(button), 1);
        }

        #[test]
        fn test_hidden_is_not_interactable() {
            let driver = MockDriver::new();
            driver.add(MockNode::new("button").hidden());
            let el = &driver.find_all(None, &Selector::css("button")).unwrap()[0];
            assert!(!el.is_displayed().unwrap());
            assert!(matches!(el.click(), Err(DriverError::NotInteractable(_))));
        }
    }
}
