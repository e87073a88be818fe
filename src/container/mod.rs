//! Container Module - Groups and arrays of controls
//!
//! A container is an ordinary control node that also owns a key→child map.
//! Everything a container knows about its children is derived by the pure
//! functions in this module:
//!
//! - **value** - every child's value, as an object (groups) or array (arrays)
//! - **enabled value** - the same with disabled children left out
//! - **invalid** - any enabled child is invalid
//! - **pending** - any child is pending
//! - **child flags** - flags held by at least one enabled child
//! - **children flags** - flags held by every enabled child
//!   (`DISABLED`: every child is disabled)
//!
//! Structural changes always travel as one `ControlsStore` event carrying the
//! complete new map; the convenience methods on [`FormGroup`] and
//! [`FormArray`] only compute that map.

mod array;
mod group;

pub use array::FormArray;
pub use group::FormGroup;

use crate::control::AbstractControl;
use crate::error::{ControlError, Result};
use crate::event::StateChange;
use crate::types::{ControlFlags, ControlKey, ControlKind, Value};

/// Complete key→child mapping of a container, in order.
pub type ControlsStore = Vec<(ControlKey, AbstractControl)>;

// =============================================================================
// AGGREGATES
// =============================================================================

/// Child-derived state of a container. Always empty for leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Aggregate {
    /// Flags held by at least one enabled child (`DISABLED`: by any child).
    pub any: ControlFlags,
    /// Flags held by every enabled child (`DISABLED`: by every child).
    pub all: ControlFlags,
    pub invalid: bool,
    pub pending: bool,
}

/// Which aggregates a child event can have invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    None,
    Value,
    State,
    All,
}

impl Scope {
    pub fn for_change(change: &StateChange) -> Scope {
        match change.innermost() {
            StateChange::Value(_) => Scope::Value,
            StateChange::Disabled(_) | StateChange::ControlsStore(_) => Scope::All,
            StateChange::Touched(_)
            | StateChange::Changed(_)
            | StateChange::Readonly(_)
            | StateChange::Submitted(_)
            | StateChange::Errors(_)
            | StateChange::ErrorsStore(_)
            | StateChange::Pending(_)
            | StateChange::PendingStore(_)
            | StateChange::Validators(_)
            | StateChange::ValidatorStore(_) => Scope::State,
            StateChange::Focus(_) | StateChange::Custom { .. } | StateChange::Child(_) => {
                Scope::None
            }
        }
    }

    pub fn includes_value(&self) -> bool {
        matches!(self, Scope::Value | Scope::All)
    }

    pub fn includes_state(&self) -> bool {
        matches!(self, Scope::State | Scope::All)
    }
}

/// Build `(value, enabled_value)` from the children.
pub(crate) fn aggregate_value(kind: ControlKind, entries: &ControlsStore) -> (Value, Value) {
    match kind {
        ControlKind::Array => {
            let mut value = Vec::with_capacity(entries.len());
            let mut enabled = Vec::with_capacity(entries.len());
            for (_, child) in entries {
                value.push(child.value());
                if !child.disabled() {
                    enabled.push(child.enabled_value());
                }
            }
            (Value::Array(value), Value::Array(enabled))
        }
        _ => {
            let mut value = serde_json::Map::new();
            let mut enabled = serde_json::Map::new();
            for (key, child) in entries {
                let name = key.to_string();
                value.insert(name.clone(), child.value());
                if !child.disabled() {
                    enabled.insert(name, child.enabled_value());
                }
            }
            (Value::Object(value), Value::Object(enabled))
        }
    }
}

/// Derive flags, validity and pending from the children.
pub(crate) fn aggregate_state(entries: &ControlsStore) -> Aggregate {
    let mut aggregate = Aggregate::default();
    let mut every_enabled = ControlFlags::CHILD_LEVEL;
    let mut enabled_count = 0;
    let mut disabled_count = 0;

    for (_, child) in entries {
        let flags = child.flags();
        aggregate.pending |= child.pending();

        if flags.contains(ControlFlags::DISABLED) {
            disabled_count += 1;
            aggregate.any |= ControlFlags::DISABLED;
            continue;
        }

        enabled_count += 1;
        aggregate.any |= flags & ControlFlags::CHILD_LEVEL;
        every_enabled &= flags;
        aggregate.invalid |= child.invalid();
    }

    if enabled_count > 0 {
        aggregate.all = every_enabled & ControlFlags::CHILD_LEVEL;
    }
    if disabled_count > 0 && disabled_count == entries.len() {
        aggregate.all |= ControlFlags::DISABLED;
    }
    aggregate
}

// =============================================================================
// SHAPE CHECKS
// =============================================================================

/// Rekey array children by position; group keys are kept as given.
pub(crate) fn normalize_keys(kind: ControlKind, entries: ControlsStore) -> ControlsStore {
    match kind {
        ControlKind::Array => entries
            .into_iter()
            .enumerate()
            .map(|(index, (_, child))| (ControlKey::Index(index), child))
            .collect(),
        _ => entries,
    }
}

/// Verify `value` against the container's current key shape.
///
/// `exact` requires every child key to be present and nothing else; otherwise
/// only the provided keys are checked. Nested containers are checked
/// recursively in partial mode, since they receive patches.
pub(crate) fn check_shape(control: &AbstractControl, value: &Value, exact: bool) -> Result<()> {
    let entries = control.controls();
    let mismatch = |reason: String| ControlError::ShapeMismatch {
        control: control.id(),
        reason,
    };

    match (control.kind(), value) {
        (ControlKind::Control, _) => Ok(()),
        (ControlKind::Group, Value::Object(map)) => {
            if exact {
                for (key, _) in &entries {
                    if !map.contains_key(&key.to_string()) {
                        return Err(mismatch(format!("missing value for `{}`", key)));
                    }
                }
            }
            for (name, child_value) in map {
                let key = ControlKey::Name(name.clone());
                let child = entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, child)| child)
                    .ok_or_else(|| ControlError::MissingControl {
                        control: control.id(),
                        key: key.clone(),
                    })?;
                check_shape(child, child_value, false)?;
            }
            Ok(())
        }
        (ControlKind::Array, Value::Array(items)) => {
            if exact && items.len() != entries.len() {
                return Err(mismatch(format!(
                    "expected {} items, got {}",
                    entries.len(),
                    items.len()
                )));
            }
            for (index, item) in items.iter().enumerate() {
                let (_, child) = entries.get(index).ok_or(ControlError::IndexOutOfRange {
                    index,
                    len: entries.len(),
                })?;
                check_shape(child, item, false)?;
            }
            Ok(())
        }
        (ControlKind::Group, other) => Err(mismatch(format!("expected an object, got {}", other))),
        (ControlKind::Array, other) => Err(mismatch(format!("expected an array, got {}", other))),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::FormControl;
    use serde_json::json;

    fn entries(controls: Vec<(&str, FormControl)>) -> ControlsStore {
        controls
            .into_iter()
            .map(|(name, control)| (ControlKey::from(name), control.into()))
            .collect()
    }

    #[test]
    fn test_aggregate_value_skips_disabled_in_enabled_value() {
        let a = FormControl::new("x");
        let b = FormControl::new("y");
        b.mark_disabled(true);

        let store = entries(vec![("a", a), ("b", b)]);
        let (value, enabled) = aggregate_value(ControlKind::Group, &store);
        assert_eq!(value, json!({"a": "x", "b": "y"}));
        assert_eq!(enabled, json!({"a": "x"}));

        let (value, enabled) = aggregate_value(ControlKind::Array, &store);
        assert_eq!(value, json!(["x", "y"]));
        assert_eq!(enabled, json!(["x"]));
    }

    #[test]
    fn test_aggregate_flags_any_and_all() {
        let a = FormControl::new(1);
        let b = FormControl::new(2);
        let c = FormControl::new(3);
        a.mark_touched(true);
        c.mark_disabled(true);

        let store = entries(vec![("a", a.clone()), ("b", b.clone()), ("c", c)]);
        let aggregate = aggregate_state(&store);
        assert!(aggregate.any.contains(ControlFlags::TOUCHED));
        assert!(!aggregate.all.contains(ControlFlags::TOUCHED));
        assert!(aggregate.any.contains(ControlFlags::DISABLED));
        assert!(!aggregate.all.contains(ControlFlags::DISABLED));

        // Disabled child does not count toward "every enabled child"
        b.mark_touched(true);
        let aggregate = aggregate_state(&store);
        assert!(aggregate.all.contains(ControlFlags::TOUCHED));
    }

    #[test]
    fn test_aggregate_all_disabled() {
        let a = FormControl::new(1);
        a.mark_disabled(true);
        let aggregate = aggregate_state(&entries(vec![("a", a)]));
        assert!(aggregate.all.contains(ControlFlags::DISABLED));
        assert!(!aggregate.all.contains(ControlFlags::TOUCHED));

        let empty = aggregate_state(&ControlsStore::new());
        assert_eq!(empty, Aggregate::default());
    }

    #[test]
    fn test_scope_for_nested_child_events() {
        use crate::event::ControlEvent;
        use crate::types::ControlId;

        let id = ControlId::new();
        let inner = ControlEvent::new(id, StateChange::Disabled(true));
        let envelope = ControlEvent::child(id, ControlKey::from("x"), inner);
        assert_eq!(Scope::for_change(envelope.change()), Scope::All);
        assert_eq!(Scope::for_change(&StateChange::Focus(true)), Scope::None);
        assert!(Scope::for_change(&StateChange::Value(json!(1))).includes_value());
    }
}
