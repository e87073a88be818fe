//! Leaf controls.

use std::ops::Deref;

use super::{AbstractControl, ControlOptions};
use crate::container::ControlsStore;
use crate::event::{EventOptions, StateChange};
use crate::types::{ControlKind, Value};

/// A single value with validation and interaction state.
///
/// Derefs to [`AbstractControl`] for the full API; the value setters are
/// re-declared here because a leaf accepts any value shape.
#[derive(Clone, Debug)]
pub struct FormControl(AbstractControl);

impl FormControl {
    pub fn new(value: impl Into<Value>) -> Self {
        Self::with_options(ControlOptions::new().value(value))
    }

    pub fn with_options(options: ControlOptions) -> Self {
        Self(AbstractControl::build(
            ControlKind::Control,
            options,
            ControlsStore::new(),
        ))
    }

    pub fn set_value(&self, value: impl Into<Value>) {
        self.set_value_with(value, EventOptions::default());
    }

    pub fn set_value_with(&self, value: impl Into<Value>, opts: EventOptions) {
        self.0.emit_event(StateChange::Value(value.into()), opts);
    }

    /// Same as `set_value` for a leaf.
    pub fn patch_value(&self, value: impl Into<Value>) {
        self.set_value(value);
    }

    pub fn patch_value_with(&self, value: impl Into<Value>, opts: EventOptions) {
        self.set_value_with(value, opts);
    }

    pub fn as_control(&self) -> &AbstractControl {
        &self.0
    }

    pub fn into_control(self) -> AbstractControl {
        self.0
    }
}

impl Deref for FormControl {
    type Target = AbstractControl;

    fn deref(&self) -> &AbstractControl {
        &self.0
    }
}

impl AsRef<AbstractControl> for FormControl {
    fn as_ref(&self) -> &AbstractControl {
        &self.0
    }
}

impl From<FormControl> for AbstractControl {
    fn from(control: FormControl) -> Self {
        control.0
    }
}

impl From<&FormControl> for AbstractControl {
    fn from(control: &FormControl) -> Self {
        control.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leaf_accepts_any_shape() {
        let control = FormControl::new(json!({"nested": [1, 2]}));
        control.set_value(json!([true]));
        assert_eq!(control.value(), json!([true]));
        control.patch_value("plain");
        assert_eq!(control.value(), json!("plain"));
    }

    #[test]
    fn test_handles_share_state() {
        let control = FormControl::new(1);
        let handle: AbstractControl = (&control).into();
        control.set_value(5);
        assert_eq!(handle.value(), json!(5));
        assert!(handle.ptr_eq(control.as_control()));
        assert_eq!(handle.kind(), ControlKind::Control);
    }
}
