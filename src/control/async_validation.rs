//! Async validation bookkeeping.
//!
//! The engine itself is synchronous. An external validator calls
//! [`AsyncValidation::begin`] when it starts work and
//! [`ValidationTask::finish`] when the result arrives. Each `begin` bumps a
//! generation counter; a task whose generation is no longer the latest is
//! dropped on `finish`, so a slow stale result never overwrites a newer one.
//!
//! Start and end are announced as custom events named
//! [`VALIDATION_START`] and [`VALIDATION_END`].
//!
//! ```ignore
//! let remote = AsyncValidation::new(&username, ControlId::new());
//! let _sub = username.on_value(move |value| {
//!     let task = remote.begin();
//!     spawn_lookup(value.clone(), move |taken| {
//!         task.finish(taken.then(|| errors_map("taken")));
//!     });
//! });
//! ```

use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;
use tracing::debug;

use super::{AbstractControl, WeakControl};
use crate::event::{EventOptions, StateChange};
use crate::types::{ControlId, ValidationErrors};

pub const VALIDATION_START: &str = "validation_start";
pub const VALIDATION_END: &str = "validation_end";

/// One async validator attached to one control, acting as one source.
#[derive(Debug, Clone)]
pub struct AsyncValidation {
    control: WeakControl,
    source: ControlId,
    generation: Rc<Cell<u64>>,
}

impl AsyncValidation {
    pub fn new(control: &AbstractControl, source: ControlId) -> Self {
        Self {
            control: control.downgrade(),
            source,
            generation: Rc::new(Cell::new(0)),
        }
    }

    pub fn source(&self) -> ControlId {
        self.source
    }

    /// Generation of the most recently started task.
    pub fn latest(&self) -> u64 {
        self.generation.get()
    }

    /// Mark the control pending for this source and start a new task.
    pub fn begin(&self) -> ValidationTask {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        if let Some(control) = self.control.upgrade() {
            let opts = EventOptions::new().source(self.source);
            control.mark_pending_with(true, opts.clone());
            control.emit_event(
                StateChange::Custom {
                    kind: VALIDATION_START.to_string(),
                    value: json!({ "generation": generation }),
                },
                opts,
            );
        }

        ValidationTask {
            control: self.control.clone(),
            source: self.source,
            generation,
            latest: self.generation.clone(),
        }
    }
}

/// Handle for one in-flight validation run.
#[derive(Debug)]
#[must_use = "an unfinished task leaves the control pending"]
pub struct ValidationTask {
    control: WeakControl,
    source: ControlId,
    generation: u64,
    latest: Rc<Cell<u64>>,
}

impl ValidationTask {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer task has been started since this one.
    pub fn is_current(&self) -> bool {
        self.latest.get() == self.generation
    }

    /// Apply the result if this task is still current.
    ///
    /// Returns false when the result was discarded.
    pub fn finish(self, errors: Option<ValidationErrors>) -> bool {
        if !self.is_current() {
            debug!(
                source = %self.source,
                generation = self.generation,
                latest = self.latest.get(),
                "discarding superseded validation result"
            );
            return false;
        }
        let Some(control) = self.control.upgrade() else {
            return false;
        };

        let opts = EventOptions::new().source(self.source);
        control.set_errors_with(errors, opts.clone());
        control.mark_pending_with(false, opts.clone());
        control.emit_event(
            StateChange::Custom {
                kind: VALIDATION_END.to_string(),
                value: json!({ "generation": self.generation }),
            },
            opts,
        );
        true
    }

    /// Abandon the run. Clears pending if no newer task took over.
    pub fn cancel(self) {
        if !self.is_current() {
            return;
        }
        self.latest.set(self.generation + 1);
        if let Some(control) = self.control.upgrade() {
            control.mark_pending_with(false, EventOptions::new().source(self.source));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::FormControl;
    use std::cell::RefCell;

    fn taken() -> Option<ValidationErrors> {
        json!({"taken": true}).as_object().cloned()
    }

    #[test]
    fn test_begin_and_finish() {
        let control = FormControl::new("ada");
        let remote = AsyncValidation::new(&control, ControlId::new());

        let task = remote.begin();
        assert!(control.pending());
        assert!(control.pending_store().contains(&remote.source()));

        assert!(task.finish(taken()));
        assert!(!control.pending());
        assert!(control.invalid());
        assert!(control.errors_store().contains(&remote.source()));
    }

    #[test]
    fn test_stale_result_is_dropped() {
        let control = FormControl::new("a");
        let remote = AsyncValidation::new(&control, ControlId::new());

        let first = remote.begin();
        let second = remote.begin();
        assert!(!first.is_current());

        assert!(!first.finish(taken()));
        assert!(control.pending());
        assert!(control.valid());

        assert!(second.finish(None));
        assert!(!control.pending());
        assert!(control.valid());
    }

    #[test]
    fn test_lifecycle_events() {
        let control = FormControl::new("a");
        let remote = AsyncValidation::new(&control, ControlId::new());
        let names = Rc::new(RefCell::new(Vec::new()));
        let names_clone = names.clone();
        let _sub = control.on_changes(move |event| {
            if let StateChange::Custom { kind, .. } = event.change() {
                names_clone.borrow_mut().push(kind.clone());
            }
        });

        let task = remote.begin();
        let _ = task.finish(None);
        assert_eq!(
            *names.borrow(),
            vec![VALIDATION_START.to_string(), VALIDATION_END.to_string()]
        );
    }

    #[test]
    fn test_cancel_clears_pending() {
        let control = FormControl::new("a");
        let remote = AsyncValidation::new(&control, ControlId::new());
        let task = remote.begin();
        task.cancel();
        assert!(!control.pending());
    }

    #[test]
    fn test_finish_after_drop_is_noop() {
        let control = FormControl::new("a");
        let remote = AsyncValidation::new(&control, ControlId::new());
        let task = remote.begin();
        drop(remote);
        drop(control);
        assert!(!task.finish(None));
    }
}
