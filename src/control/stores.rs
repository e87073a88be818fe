//! Per-source stores for errors, pending flags and validators.
//!
//! Each contributor (a control, a directive, an async validator) owns one
//! entry keyed by its [`ControlId`]. Stores keep insertion order and updating
//! an entry keeps its position, so merges are deterministic: later sources
//! win on key conflicts.

use std::fmt;

use super::validators::Validator;
use crate::types::{ControlId, ValidationErrors, Value};

/// Insertion-ordered map from source id to that source's contribution.
#[derive(Clone, PartialEq)]
pub struct SourceStore<T> {
    entries: Vec<(ControlId, T)>,
}

pub type ErrorsStore = SourceStore<ValidationErrors>;
pub type PendingStore = SourceStore<bool>;
pub type ValidatorStore = SourceStore<Validator>;

impl<T> SourceStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, source: &ControlId) -> Option<&T> {
        self.entries
            .iter()
            .find(|(id, _)| id == source)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, source: &ControlId) -> bool {
        self.get(source).is_some()
    }

    /// Set a source's entry. An existing entry keeps its position.
    pub fn insert(&mut self, source: ControlId, value: T) -> Option<T> {
        match self.entries.iter_mut().find(|(id, _)| *id == source) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((source, value));
                None
            }
        }
    }

    pub fn remove(&mut self, source: &ControlId) -> Option<T> {
        let index = self.entries.iter().position(|(id, _)| id == source)?;
        Some(self.entries.remove(index).1)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ControlId, &T)> {
        self.entries.iter().map(|(id, value)| (id, value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn sources(&self) -> impl Iterator<Item = &ControlId> {
        self.entries.iter().map(|(id, _)| id)
    }
}

impl<T> Default for SourceStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(ControlId, T)> for SourceStore<T> {
    fn from_iter<I: IntoIterator<Item = (ControlId, T)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (source, value) in iter {
            store.insert(source, value);
        }
        store
    }
}

impl<T: fmt::Debug> fmt::Debug for SourceStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, value)| (id.to_string(), value)))
            .finish()
    }
}

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Treat an empty error object as "no errors".
pub fn normalize_errors(errors: Option<ValidationErrors>) -> Option<ValidationErrors> {
    errors.filter(|errors| !errors.is_empty())
}

/// Right-biased shallow merge of every entry, in store order.
pub fn merge_errors(store: &ErrorsStore) -> Option<ValidationErrors> {
    let mut merged = ValidationErrors::new();
    for errors in store.values() {
        for (key, value) in errors {
            merged.insert(key.clone(), value.clone());
        }
    }
    normalize_errors(Some(merged))
}

/// Merge `patch` into an existing entry. `null` values delete keys.
pub fn patch_errors(existing: Option<&ValidationErrors>, patch: &ValidationErrors) -> ValidationErrors {
    let mut merged = existing.cloned().unwrap_or_default();
    for (key, value) in patch {
        if value.is_null() {
            merged.remove(key);
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// A control is pending while any source reports `true`.
pub fn any_pending(store: &PendingStore) -> bool {
    store.values().any(|pending| *pending)
}

/// Run every stored validator against `value` and merge the results.
pub fn run_validators(store: &ValidatorStore, value: &Value) -> Option<ValidationErrors> {
    let mut merged = ValidationErrors::new();
    for validator in store.values() {
        if let Some(errors) = validator.validate(value) {
            merged.extend(errors);
        }
    }
    normalize_errors(Some(merged))
}

// =============================================================================
// TESTS
// =============================================================================
