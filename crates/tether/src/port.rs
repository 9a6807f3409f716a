//! Criteria resolution on top of a driver's primitive lookup.
//!
//! [`DriverPort::resolve`] turns a [`SearchCriteria`] into an ordered list of
//! live handles: resolve the parent scope, search inside it, then apply the
//! filters in the order they were added. Every driver gets it for free.

use crate::criteria::{Filter, Scope, SearchCriteria};
use crate::driver::{Driver, Element};
use crate::poll::Condition;
use crate::result::TetherError;

/// Resolve criteria against the live document
pub trait DriverPort: Driver {
    /// Resolve `criteria` into matching handles, in document order.
    ///
    /// Nothing matching is an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// A retryable [`Condition`] for stale or transient driver failures, and
    /// [`Condition::Fatal`] for malformed criteria (blank selector, index past
    /// the end of a non-empty match set) or fatal driver errors.
    fn resolve(&self, criteria: &SearchCriteria) -> Result<Vec<Self::Element>, Condition>;
}

impl<D: Driver + ?Sized> DriverPort for D {
    fn resolve(&self, criteria: &SearchCriteria) -> Result<Vec<Self::Element>, Condition> {
        let selector = criteria.selector();
        if selector.is_blank() {
            return Err(TetherError::invalid_criteria(format!("empty selector in {criteria}")).into());
        }

        let candidates = match criteria.scope() {
            Scope::Root => self.find_all(None, selector)?,
            Scope::FirstOf(parent) => match self.resolve(parent)?.first() {
                Some(scope) => self.find_all(Some(scope), selector)?,
                None => Vec::new(),
            },
            Scope::EachOf(parent) => {
                let mut all = Vec::new();
                for scope in self.resolve(parent)? {
                    all.extend(self.find_all(Some(&scope), selector)?);
                }
                all
            }
        };

        apply_filters(criteria, candidates)
    }
}

fn apply_filters<E: Element>(
    criteria: &SearchCriteria,
    mut elements: Vec<E>,
) -> Result<Vec<E>, Condition> {
    for filter in criteria.filters() {
        elements = match filter {
            Filter::Text(matcher) => {
                let mut kept = Vec::with_capacity(elements.len());
                for element in elements {
                    if matcher.matches(&element.text()?) {
                        kept.push(element);
                    }
                }
                kept
            }
            Filter::Displayed => {
                let mut kept = Vec::with_capacity(elements.len());
                for element in elements {
                    if element.is_displayed()? {
                        kept.push(element);
                    }
                }
                kept
            }
            // Empty stays empty so "not rendered yet" remains retryable
            Filter::Index(_) if elements.is_empty() => elements,
            Filter::Index(n) if *n >= elements.len() => {
                return Err(TetherError::invalid_criteria(format!(
                    "index {n} out of range for {criteria}: only {} element(s) matched",
                    elements.len()
                ))
                .into());
            }
            Filter::Index(n) => vec![elements.swap_remove(*n)],
        };
    }
    Ok(elements)
}
