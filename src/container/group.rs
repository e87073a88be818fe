//! Named children.

use std::ops::Deref;

use tracing::debug;

use super::ControlsStore;
use crate::control::{AbstractControl, ControlOptions};
use crate::error::{ControlError, Result};
use crate::event::{EventOptions, StateChange};
use crate::types::{ControlKey, ControlKind};

/// Container whose children are keyed by name, in insertion order.
///
/// ```ignore
/// let form = FormGroup::new([
///     ("name", AbstractControl::from(FormControl::new(""))),
///     ("age", FormControl::new(30).into()),
/// ]);
/// form.set_value(json!({"name": "Ada", "age": 36}))?;
/// ```
#[derive(Clone, Debug)]
pub struct FormGroup(AbstractControl);

impl FormGroup {
    pub fn new<I, K, C>(controls: I) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<AbstractControl>,
    {
        Self::with_options(controls, ControlOptions::new())
    }

    pub fn with_options<I, K, C>(controls: I, options: ControlOptions) -> Self
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<AbstractControl>,
    {
        Self(AbstractControl::build(
            ControlKind::Group,
            options,
            named(controls),
        ))
    }

    pub fn get(&self, name: &str) -> Option<AbstractControl> {
        self.0.child(&ControlKey::from(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.0
            .controls()
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// Add or replace the child under `name`.
    pub fn set_control(&self, name: impl Into<String>, control: impl Into<AbstractControl>) {
        self.set_control_with(name, control, EventOptions::default());
    }

    pub fn set_control_with(
        &self,
        name: impl Into<String>,
        control: impl Into<AbstractControl>,
        opts: EventOptions,
    ) {
        let key = ControlKey::Name(name.into());
        let control = control.into();
        let mut entries = self.0.controls();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = control,
            None => entries.push((key, control)),
        }
        self.commit(entries, opts);
    }

    /// Add a new child. Fails if the name is taken.
    pub fn add_control(&self, name: impl Into<String>, control: impl Into<AbstractControl>) -> Result<()> {
        self.add_control_with(name, control, EventOptions::default())
    }

    pub fn add_control_with(
        &self,
        name: impl Into<String>,
        control: impl Into<AbstractControl>,
        opts: EventOptions,
    ) -> Result<()> {
        let key = ControlKey::Name(name.into());
        let mut entries = self.0.controls();
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(ControlError::DuplicateControl {
                control: self.0.id(),
                key,
            });
        }
        entries.push((key, control.into()));
        self.commit(entries, opts);
        Ok(())
    }

    /// Remove a child and return it. Fails if there is no such child.
    pub fn remove_control(&self, name: &str) -> Result<AbstractControl> {
        self.remove_control_with(name, EventOptions::default())
    }

    pub fn remove_control_with(&self, name: &str, opts: EventOptions) -> Result<AbstractControl> {
        let key = ControlKey::from(name);
        let mut entries = self.0.controls();
        let index = entries
            .iter()
            .position(|(k, _)| *k == key)
            .ok_or_else(|| ControlError::MissingControl {
                control: self.0.id(),
                key,
            })?;
        let (_, removed) = entries.remove(index);
        self.commit(entries, opts);
        Ok(removed)
    }

    /// Replace every child.
    pub fn set_controls<I, K, C>(&self, controls: I)
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<AbstractControl>,
    {
        self.set_controls_with(controls, EventOptions::default());
    }

    pub fn set_controls_with<I, K, C>(&self, controls: I, opts: EventOptions)
    where
        I: IntoIterator<Item = (K, C)>,
        K: Into<String>,
        C: Into<AbstractControl>,
    {
        self.commit(named(controls), opts);
    }

    pub fn as_control(&self) -> &AbstractControl {
        &self.0
    }

    pub fn into_control(self) -> AbstractControl {
        self.0
    }

    fn commit(&self, entries: ControlsStore, opts: EventOptions) {
        debug!(control = %self.0.id(), children = entries.len(), "group structure changed");
        self.0.emit_event(StateChange::ControlsStore(entries), opts);
    }
}

fn named<I, K, C>(controls: I) -> ControlsStore
where
    I: IntoIterator<Item = (K, C)>,
    K: Into<String>,
    C: Into<AbstractControl>,
{
    controls
        .into_iter()
        .map(|(name, control)| (ControlKey::Name(name.into()), control.into()))
        .collect()
}

impl Deref for FormGroup {
    type Target = AbstractControl;

    fn deref(&self) -> &AbstractControl {
        &self.0
    }
}

impl AsRef<AbstractControl> for FormGroup {
    fn as_ref(&self) -> &AbstractControl {
        &self.0
    }
}

impl From<FormGroup> for AbstractControl {
    fn from(group: FormGroup) -> Self {
        group.0
    }
}

impl From<&FormGroup> for AbstractControl {
    fn from(group: &FormGroup) -> Self {
        group.0.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{validators, FormControl};
    use crate::types::{ControlFlags, ControlStatus};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn profile() -> (FormGroup, FormControl, FormControl) {
        let first = FormControl::new("Ada");
        let last = FormControl::new("Lovelace");
        let group = FormGroup::new([("first", &first), ("last", &last)]);
        (group, first, last)
    }

    #[test]
    fn test_value_tracks_children() {
        let (group, first, _) = profile();
        assert_eq!(group.value(), json!({"first": "Ada", "last": "Lovelace"}));

        first.set_value("Grace");
        assert_eq!(group.value(), json!({"first": "Grace", "last": "Lovelace"}));
    }

    #[test]
    fn test_set_value_forwards_to_children() {
        let (group, first, last) = profile();
        group
            .set_value(json!({"first": "Grace", "last": "Hopper"}))
            .unwrap();
        assert_eq!(first.value(), json!("Grace"));
        assert_eq!(last.value(), json!("Hopper"));
    }

    #[test]
    fn test_set_value_requires_every_key() {
        let (group, first, _) = profile();
        let result = group.set_value(json!({"first": "Grace"}));
        assert!(matches!(result, Err(ControlError::ShapeMismatch { .. })));
        assert_eq!(first.value(), json!("Ada"));

        let result = group.patch_value(json!({"nope": 1}));
        assert!(matches!(result, Err(ControlError::MissingControl { .. })));
    }

    #[test]
    fn test_patch_value_partial() {
        let (group, first, last) = profile();
        group.patch_value(json!({"last": "Byron"})).unwrap();
        assert_eq!(first.value(), json!("Ada"));
        assert_eq!(last.value(), json!("Byron"));
    }

    #[test]
    fn test_enabled_value_and_validity_skip_disabled() {
        let name = FormControl::with_options(ControlOptions::new().value("").validator(validators::required()));
        let note = FormControl::new("n");
        let group = FormGroup::new([("name", &name), ("note", &note)]);
        assert!(group.invalid());

        name.mark_disabled(true);
        assert!(group.valid());
        assert_eq!(group.enabled_value(), json!({"note": "n"}));
        assert_eq!(group.value(), json!({"name": "", "note": "n"}));
    }

    #[test]
    fn test_child_level_flags() {
        let (group, first, last) = profile();
        first.mark_touched(true);
        assert!(!group.touched());
        assert!(group.child_flags().contains(ControlFlags::TOUCHED));

        last.mark_touched(true);
        assert!(group.touched());
        assert!(!group.own_flags().contains(ControlFlags::TOUCHED));
    }

    #[test]
    fn test_all_children_disabled_disables_group() {
        let (group, first, last) = profile();
        first.mark_disabled(true);
        assert!(!group.disabled());
        last.mark_disabled(true);
        assert!(group.disabled());
        assert_eq!(group.status(), ControlStatus::Disabled);
    }

    #[test]
    fn test_enabling_group_enables_disabled_children() {
        let (group, first, last) = profile();
        first.mark_disabled(true);
        last.mark_disabled(true);
        assert!(group.disabled());
        assert!(!group.own_flags().contains(ControlFlags::DISABLED));

        group.mark_disabled(false);
        assert!(!group.disabled());
        assert!(!first.disabled());
        assert!(!last.disabled());
        assert_eq!(group.status(), ControlStatus::Valid);
    }

    #[test]
    fn test_clearing_own_flag_also_clears_children() {
        let (group, first, last) = profile();
        group.mark_disabled(true);
        group.mark_children_disabled(true);

        group.mark_disabled(false);
        assert!(!group.disabled());
        assert!(!first.disabled() && !last.disabled());
    }

    #[test]
    fn test_pending_child() {
        let (group, first, _) = profile();
        first.mark_pending(true);
        assert!(group.pending());
        first.mark_pending(false);
        assert!(!group.pending());
    }

    #[test]
    fn test_group_validators_see_aggregate_value() {
        let first = FormControl::new("a");
        let last = FormControl::new("b");
        let same = validators::Validator::new(|value| {
            (value["first"] == value["last"]).then(|| json!({"same": true}).as_object().cloned().unwrap())
        });
        let group = FormGroup::with_options(
            [("first", &first), ("last", &last)],
            ControlOptions::new().validator(same),
        );
        assert!(group.valid());

        last.set_value("a");
        assert!(group.errors().unwrap().contains_key("same"));
        last.set_value("c");
        assert!(group.errors().is_none());
    }

    #[test]
    fn test_add_and_remove_control() {
        let (group, _, _) = profile();
        group.add_control("age", FormControl::new(36)).unwrap();
        assert_eq!(group.names(), vec!["first", "last", "age"]);
        assert_eq!(group.value()["age"], json!(36));

        assert!(matches!(
            group.add_control("age", FormControl::new(1)),
            Err(ControlError::DuplicateControl { .. })
        ));

        let removed = group.remove_control("first").unwrap();
        assert_eq!(removed.value(), json!("Ada"));
        assert!(!group.contains("first"));
        assert!(matches!(
            group.remove_control("first"),
            Err(ControlError::MissingControl { .. })
        ));
    }

    #[test]
    fn test_removed_child_is_unsubscribed() {
        let (group, first, _) = profile();
        assert_eq!(first.listener_count(), 1);

        group.remove_control("first").unwrap();
        assert_eq!(first.listener_count(), 0);

        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let _sub = group.on_changes(move |_| count_clone.set(count_clone.get() + 1));
        first.set_value("ignored");
        assert_eq!(count.get(), 0);
        assert_eq!(group.value(), json!({"last": "Lovelace"}));
    }

    #[test]
    fn test_set_control_replaces_in_place() {
        let (group, _, _) = profile();
        let replacement = FormControl::new("Countess");
        group.set_control("first", &replacement);
        assert_eq!(group.names(), vec!["first", "last"]);
        assert_eq!(group.value()["first"], json!("Countess"));
        assert!(group.get("first").unwrap().ptr_eq(replacement.as_control()));
    }

    #[test]
    fn test_mark_children() {
        let (group, first, last) = profile();
        group.mark_children_touched(true);
        assert!(first.touched());
        assert!(last.touched());
        assert!(group.touched());

        group.mark_touched(true);
        group.mark_children_touched(false);
        assert!(group.touched());
        assert!(!first.touched());
    }

    #[test]
    fn test_nested_groups_and_paths() {
        let street = FormControl::new("Main");
        let address = FormGroup::new([("street", &street)]);
        let form = FormGroup::new([("address", &address)]);

        street.set_value("Side");
        assert_eq!(form.value(), json!({"address": {"street": "Side"}}));
        assert!(form.get_path(["address", "street"]).unwrap().ptr_eq(street.as_control()));
        assert!(form.get_path(["address", "nope"]).is_none());

        form.patch_value(json!({"address": {"street": "High"}})).unwrap();
        assert_eq!(street.value(), json!("High"));
    }

    #[test]
    fn test_container_reset() {
        let first = FormControl::with_options(ControlOptions::new().value("a").touched(true));
        let group = FormGroup::with_options([("first", &first)], ControlOptions::new().submitted(true));

        first.set_value("b");
        first.mark_touched(false);
        group.mark_submitted(false);

        group.reset();
        assert_eq!(group.value(), json!({"first": "a"}));
        assert!(first.touched());
        assert!(group.submitted());
    }
}
