//! Search criteria: immutable recipes for locating elements.
//!
//! A [`SearchCriteria`] describes *how* to find zero or more elements, never
//! *which* live elements were found. Narrowing always returns a new value:
//!
//! ```
//! use tether::SearchCriteria;
//!
//! let rows = SearchCriteria::css("table.orders tr");
//! let second = rows.with_index(1);
//! let paid = rows.with_text("Paid");
//!
//! assert_eq!(rows, SearchCriteria::css("table.orders tr"));
//! assert_ne!(second, paid);
//! ```
//!
//! Construction and narrowing perform no I/O. The only fallible constructor
//! is [`TextMatcher::pattern`], which rejects an invalid regular expression.

use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::result::{TetherError, TetherResult};

/// Selector type for locating elements.
///
/// The core treats the value as opaque; interpreting it is the driver's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::XPath(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// The raw selector expression
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) | Self::TestId(s) => s,
        }
    }

    /// Whether the expression is empty or whitespace
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.value().trim().is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css `{s}`"),
            Self::XPath(s) => write!(f, "xpath `{s}`"),
            Self::TestId(s) => write!(f, "test-id `{s}`"),
        }
    }
}

/// Predicate over an element's text content
#[derive(Debug, Clone)]
pub enum TextMatcher {
    /// Trimmed text equals the value
    Exact(String),
    /// Text contains the value
    Contains(String),
    /// Text matches the regular expression
    Pattern(Regex),
}

impl TextMatcher {
    /// Match trimmed text exactly
    #[must_use]
    pub fn exact(text: impl Into<String>) -> Self {
        Self::Exact(text.into())
    }

    /// Match a substring
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    /// Match a regular expression
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::InvalidCriteria`] if the pattern does not compile
    pub fn pattern(pattern: &str) -> TetherResult<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| TetherError::invalid_criteria(format!("bad text pattern: {e}")))
    }

    /// Check a text value against this matcher
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Exact(expected) => text.trim() == expected,
            Self::Contains(needle) => text.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

impl PartialEq for TextMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) | (Self::Contains(a), Self::Contains(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for TextMatcher {
    fn from(text: &str) -> Self {
        Self::exact(text)
    }
}

impl From<String> for TextMatcher {
    fn from(text: String) -> Self {
        Self::Exact(text)
    }
}

impl From<Regex> for TextMatcher {
    fn from(re: Regex) -> Self {
        Self::Pattern(re)
    }
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "text = {s:?}"),
            Self::Contains(s) => write!(f, "text contains {s:?}"),
            Self::Pattern(re) => write!(f, "text =~ /{}/", re.as_str()),
        }
    }
}

/// A narrowing step, applied in the order it was added
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Keep elements whose text matches
    Text(TextMatcher),
    /// Keep only the n-th (0-based) element
    Index(usize),
    /// Keep elements that are displayed
    Displayed,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(m) => write!(f, "[{m}]"),
            Self::Index(n) => write!(f, "[#{n}]"),
            Self::Displayed => write!(f, "[displayed]"),
        }
    }
}

/// Where a criteria's selector is searched
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    /// The whole document
    Root,
    /// Inside the first element the parent resolves to
    FirstOf(Arc<SearchCriteria>),
    /// Inside every element the parent resolves to, results concatenated in
    /// parent order
    EachOf(Arc<SearchCriteria>),
}

impl Scope {
    /// The parent criteria, if scoped
    #[must_use]
    pub fn parent(&self) -> Option<&SearchCriteria> {
        match self {
            Self::Root => None,
            Self::FirstOf(parent) | Self::EachOf(parent) => Some(parent),
        }
    }
}

/// Immutable, composable descriptor of how to find elements
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    selector: Selector,
    filters: Vec<Filter>,
    scope: Scope,
}

impl SearchCriteria {
    /// Create root-scoped criteria for a selector
    #[must_use]
    pub fn new(selector: Selector) -> Self {
        Self {
            selector,
            filters: Vec::new(),
            scope: Scope::Root,
        }
    }

    /// Root-scoped CSS criteria
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Selector::css(selector))
    }

    /// Root-scoped XPath criteria
    #[must_use]
    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(Selector::xpath(selector))
    }

    /// Root-scoped test ID criteria
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::new(Selector::test_id(id))
    }

    /// Get the selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Get the filters, in application order
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Get the scope
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Get the parent criteria, if scoped
    #[must_use]
    pub fn parent(&self) -> Option<&SearchCriteria> {
        self.scope.parent()
    }

    /// Number of scoping levels above this criteria
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parent().map_or(0, |p| p.depth() + 1)
    }

    fn with_filter(&self, filter: Filter) -> Self {
        let mut next = self.clone();
        next.filters.push(filter);
        next
    }

    /// Select only the n-th (0-based) of the current matches.
    ///
    /// An out-of-range index is reported when the criteria is resolved, and
    /// only against a non-empty match set: past the end of one or more
    /// matches is an immediate `InvalidCriteria`, while an empty set resolves
    /// to nothing so polling can wait for it to render.
    #[must_use]
    pub fn with_index(&self, n: usize) -> Self {
        self.with_filter(Filter::Index(n))
    }

    /// Select only the first of the current matches
    #[must_use]
    pub fn first(&self) -> Self {
        self.with_index(0)
    }

    /// Keep matches whose text satisfies `matcher`; plain strings match exactly
    #[must_use]
    pub fn with_text(&self, matcher: impl Into<TextMatcher>) -> Self {
        self.with_filter(Filter::Text(matcher.into()))
    }

    /// Keep displayed matches only
    #[must_use]
    pub fn displayed(&self) -> Self {
        self.with_filter(Filter::Displayed)
    }

    /// Scope `child` under the first element this criteria resolves to.
    ///
    /// Accepts a selector, a `&str` (CSS), or prebuilt criteria. Prebuilt
    /// criteria keep their own scope chain; its root is re-parented here.
    #[must_use]
    pub fn child(&self, child: impl Into<SearchCriteria>) -> Self {
        let child: SearchCriteria = child.into();
        child.rescoped(&Scope::FirstOf(Arc::new(self.clone())))
    }

    /// Scope `child` under every element this criteria resolves to; results
    /// are the union across parent matches, in parent order.
    #[must_use]
    pub fn child_of_each(&self, child: impl Into<SearchCriteria>) -> Self {
        let child: SearchCriteria = child.into();
        child.rescoped(&Scope::EachOf(Arc::new(self.clone())))
    }

    fn rescoped(&self, root: &Scope) -> Self {
        let scope = match &self.scope {
            Scope::Root => root.clone(),
            Scope::FirstOf(parent) => Scope::FirstOf(Arc::new(parent.rescoped(root))),
            Scope::EachOf(parent) => Scope::EachOf(Arc::new(parent.rescoped(root))),
        };
        Self {
            selector: self.selector.clone(),
            filters: self.filters.clone(),
            scope,
        }
    }
}

impl From<Selector> for SearchCriteria {
    fn from(selector: Selector) -> Self {
        Self::new(selector)
    }
}

impl From<&str> for SearchCriteria {
    fn from(css: &str) -> Self {
        Self::css(css)
    }
}

impl From<String> for SearchCriteria {
    fn from(css: String) -> Self {
        Self::css(css)
    }
}

impl From<&SearchCriteria> for SearchCriteria {
    fn from(criteria: &SearchCriteria) -> Self {
        criteria.clone()
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Root => {}
            Scope::FirstOf(parent) => write!(f, "{parent} >> ")?,
            Scope::EachOf(parent) => write!(f, "{parent} >>* ")?,
        }
        write!(f, "{}", self.selector)?;
        for filter in &self.filters {
            write!(f, " {filter}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod selector_tests {
        use super::*;

        #[test]
        fn test_selector_display() {
            assert_eq!(Selector::css("button").to_string(), "css `button`");
            assert_eq!(Selector::xpath("//a").to_string(), "xpath `//a`");
            assert_eq!(Selector::test_id("save").to_string(), "test-id `save`");
        }

        #[test]
        fn test_selector_blank() {
            assert!(Selector::css("").is_blank());
            assert!(Selector::css("   ").is_blank());
            assert!(!Selector::test_id("x").is_blank());
        }
    }

    mod matcher_tests {
        use super::*;

        #[test]
        fn test_exact_trims_actual_text() {
            let m = TextMatcher::exact("Save");
            assert!(m.matches("  Save\n"));
            assert!(!m.matches("Save draft"));
        }

        #[test]
        fn test_contains() {
            let m = TextMatcher::contains("draft");
            assert!(m.matches("Save draft"));
            assert!(!m.matches("Save"));
        }

        #[test]
        fn test_pattern() {
            let m = TextMatcher::pattern(r"^\d+ items?$").unwrap();
            assert!(m.matches("3 items"));
            assert!(m.matches("1 item"));
            assert!(!m.matches("no items"));
        }

        #[test]
        fn test_bad_pattern_is_invalid_criteria() {
            let err = TextMatcher::pattern("(unclosed").unwrap_err();
            assert!(matches!(err, TetherError::InvalidCriteria { .. }));
        }

        #[test]
        fn test_pattern_equality_by_source() {
            assert_eq!(
                TextMatcher::pattern("a+").unwrap(),
                TextMatcher::pattern("a+").unwrap()
            );
            assert_ne!(TextMatcher::exact("a+"), TextMatcher::pattern("a+").unwrap());
        }
    }

    mod narrowing_tests {
        use super::*;

        #[test]
        fn test_narrowing_leaves_receiver_unchanged() {
            let base = SearchCriteria::css("li");
            let snapshot = base.clone();
            let _ = base.with_index(2);
            let _ = base.with_text("x");
            let _ = base.displayed();
            let _ = base.child("a");
            let _ = base.child_of_each("a");
            assert_eq!(base, snapshot);
        }

        #[test]
        fn test_filters_keep_order() {
            let c = SearchCriteria::css("li").with_text("Paid").with_index(1);
            assert_eq!(
                c.filters(),
                &[Filter::Text(TextMatcher::exact("Paid")), Filter::Index(1)]
            );
        }

        #[test]
        fn test_child_scopes() {
            let form = SearchCriteria::css("form");
            let first = form.child("input");
            let each = form.child_of_each("input");
            assert!(matches!(first.scope(), Scope::FirstOf(_)));
            assert!(matches!(each.scope(), Scope::EachOf(_)));
            assert_eq!(first.parent(), Some(&form));
            assert_eq!(first.depth(), 1);
        }

        #[test]
        fn test_child_criteria_is_rebased() {
            let row = SearchCriteria::css("tr").child(Selector::css("td"));
            let table = SearchCriteria::css("table");
            let cell = table.child(&row);
            assert_eq!(cell.depth(), 2);
            assert_eq!(cell.parent().unwrap().parent(), Some(&table));
            // the original child criteria is untouched
            assert_eq!(row.depth(), 1);
        }

        #[test]
        fn test_display() {
            let c = SearchCriteria::css("form")
                .child_of_each("li")
                .with_text(TextMatcher::contains("Paid"))
                .with_index(0);
            assert_eq!(
                c.to_string(),
                r#"css `form` >>* css `li` [text contains "Paid"] [#0]"#
            );
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn selector_strategy() -> impl Strategy<Value = String> {
            "[a-z]{1,8}(\\.[a-z]{1,6})?"
        }

        proptest! {
            #[test]
            fn prop_narrowing_is_pure(
                sel in selector_strategy(),
                child in selector_strategy(),
                index in 0usize..20,
                text in "[A-Za-z ]{0,12}",
            ) {
                let base = SearchCriteria::css(sel.clone()).with_text(text.as_str());
                let before = base.clone();
                let narrowed = base.with_index(index).child(child.as_str()).displayed();
                prop_assert_eq!(&base, &before);
                prop_assert_ne!(&narrowed, &base);
                prop_assert_eq!(narrowed.depth(), base.depth() + 1);
            }
        }
    }
}
