//! Accessor resolution.
//!
//! UI bindings ("accessors") register under a selector with a precomputed
//! specificity. When a widget needs its binding, the caller supplies the
//! matching predicate and the registry picks the most specific match.
//! Selector parsing is the caller's business.

use std::fmt;

use tracing::trace;

use crate::control::AbstractControl;
use crate::error::{ControlError, Result};

/// Selector weight as `(ids, classes, elements)`, compared left to right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Specificity(pub u32, pub u32, pub u32);

impl Specificity {
    pub fn new(ids: u32, classes: u32, elements: u32) -> Self {
        Self(ids, classes, elements)
    }
}

impl fmt::Display for Specificity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

/// A binding that exposes the control it drives.
pub trait ControlAccessor {
    fn control(&self) -> AbstractControl;
}

struct Registered<B> {
    selector: String,
    specificity: Specificity,
    binding: B,
}

/// Selector-keyed bindings.
pub struct AccessorRegistry<B> {
    entries: Vec<Registered<B>>,
}

impl<B> AccessorRegistry<B> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        selector: impl Into<String>,
        specificity: Specificity,
        binding: B,
    ) -> Result<()> {
        let selector = selector.into();
        if self.entries.iter().any(|entry| entry.selector == selector) {
            return Err(ControlError::DuplicateSelector { selector });
        }
        self.entries.push(Registered {
            selector,
            specificity,
            binding,
        });
        Ok(())
    }

    pub fn unregister(&mut self, selector: &str) -> Option<B> {
        let index = self.entries.iter().position(|entry| entry.selector == selector)?;
        Some(self.entries.remove(index).binding)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.selector.as_str())
    }

    /// Pick the most specific binding whose selector `matches`.
    ///
    /// Two matches sharing the top specificity are an error rather than a
    /// registration-order tie break.
    pub fn resolve<M>(&self, matches: M) -> Result<&B>
    where
        M: Fn(&str) -> bool,
    {
        let candidates: Vec<&Registered<B>> = self
            .entries
            .iter()
            .filter(|entry| matches(&entry.selector))
            .collect();

        let best = candidates
            .iter()
            .map(|entry| entry.specificity)
            .max()
            .ok_or(ControlError::NoAccessor)?;

        let mut top = candidates.into_iter().filter(|entry| entry.specificity == best);
        let Some(winner) = top.next() else {
            return Err(ControlError::NoAccessor);
        };
        let rest: Vec<String> = top.map(|entry| entry.selector.clone()).collect();
        if !rest.is_empty() {
            let mut selectors = vec![winner.selector.clone()];
            selectors.extend(rest);
            return Err(ControlError::AmbiguousAccessor { selectors });
        }

        trace!(selector = %winner.selector, specificity = %best, "accessor resolved");
        Ok(&winner.binding)
    }
}

impl<B> Default for AccessorRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for AccessorRegistry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|entry| (&entry.selector, entry.specificity)))
            .finish()
    }
}
