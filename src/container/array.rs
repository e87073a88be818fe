//! Positional children.

use std::ops::Deref;

use tracing::debug;

use super::ControlsStore;
use crate::control::{AbstractControl, ControlOptions};
use crate::error::{ControlError, Result};
use crate::event::{EventOptions, StateChange};
use crate::types::{ControlKey, ControlKind};

/// Container whose children are keyed by position.
///
/// Keys are always `0..len`; every structural change re-indexes.
#[derive(Clone, Debug)]
pub struct FormArray(AbstractControl);

impl FormArray {
    pub fn new<I, C>(controls: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<AbstractControl>,
    {
        Self::with_options(controls, ControlOptions::new())
    }

    pub fn with_options<I, C>(controls: I, options: ControlOptions) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<AbstractControl>,
    {
        Self(AbstractControl::build(
            ControlKind::Array,
            options,
            indexed(controls),
        ))
    }

    pub fn at(&self, index: usize) -> Option<AbstractControl> {
        self.0.child(&ControlKey::Index(index))
    }

    pub fn len(&self) -> usize {
        self.0.controls().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, control: impl Into<AbstractControl>) {
        self.push_with(control, EventOptions::default());
    }

    pub fn push_with(&self, control: impl Into<AbstractControl>, opts: EventOptions) {
        let mut entries = self.0.controls();
        entries.push((ControlKey::Index(entries.len()), control.into()));
        self.commit(entries, opts);
    }

    /// Insert before `index`. `index == len` appends.
    pub fn insert(&self, index: usize, control: impl Into<AbstractControl>) -> Result<()> {
        self.insert_with(index, control, EventOptions::default())
    }

    pub fn insert_with(
        &self,
        index: usize,
        control: impl Into<AbstractControl>,
        opts: EventOptions,
    ) -> Result<()> {
        let mut entries = self.0.controls();
        if index > entries.len() {
            return Err(ControlError::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        entries.insert(index, (ControlKey::Index(index), control.into()));
        self.commit(entries, opts);
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Result<AbstractControl> {
        self.remove_at_with(index, EventOptions::default())
    }

    pub fn remove_at_with(&self, index: usize, opts: EventOptions) -> Result<AbstractControl> {
        let mut entries = self.0.controls();
        if index >= entries.len() {
            return Err(ControlError::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        let (_, removed) = entries.remove(index);
        self.commit(entries, opts);
        Ok(removed)
    }

    /// Replace the child at `index`.
    pub fn set_control(&self, index: usize, control: impl Into<AbstractControl>) -> Result<()> {
        self.set_control_with(index, control, EventOptions::default())
    }

    pub fn set_control_with(
        &self,
        index: usize,
        control: impl Into<AbstractControl>,
        opts: EventOptions,
    ) -> Result<()> {
        let mut entries = self.0.controls();
        let len = entries.len();
        let (_, slot) = entries
            .get_mut(index)
            .ok_or(ControlError::IndexOutOfRange { index, len })?;
        *slot = control.into();
        self.commit(entries, opts);
        Ok(())
    }

    pub fn set_controls<I, C>(&self, controls: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<AbstractControl>,
    {
        self.set_controls_with(controls, EventOptions::default());
    }

    pub fn set_controls_with<I, C>(&self, controls: I, opts: EventOptions)
    where
        I: IntoIterator<Item = C>,
        C: Into<AbstractControl>,
    {
        self.commit(indexed(controls), opts);
    }

    pub fn clear(&self) {
        self.clear_with(EventOptions::default());
    }

    pub fn clear_with(&self, opts: EventOptions) {
        self.commit(ControlsStore::new(), opts);
    }

    pub fn as_control(&self) -> &AbstractControl {
        &self.0
    }

    pub fn into_control(self) -> AbstractControl {
        self.0
    }

    fn commit(&self, entries: ControlsStore, opts: EventOptions) {
        debug!(control = %self.0.id(), children = entries.len(), "array structure changed");
        self.0.emit_event(StateChange::ControlsStore(entries), opts);
    }
}

fn indexed<I, C>(controls: I) -> ControlsStore
where
    I: IntoIterator<Item = C>,
    C: Into<AbstractControl>,
{
    controls
        .into_iter()
        .enumerate()
        .map(|(index, control)| (ControlKey::Index(index), control.into()))
        .collect()
}

impl Deref for FormArray {
    type Target = AbstractControl;

    fn deref(&self) -> &AbstractControl {
        &self.0
    }
}

impl AsRef<AbstractControl> for FormArray {
    fn as_ref(&self) -> &AbstractControl {
        &self.0
    }
}

impl From<FormArray> for AbstractControl {
    fn from(array: FormArray) -> Self {
        array.0
    }
}

impl From<&FormArray> for AbstractControl {
    fn from(array: &FormArray) -> Self {
        array.0.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================
