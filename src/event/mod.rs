//! Event Module - The unit of mutation and of observation
//!
//! Every change to a control travels as a [`ControlEvent`]. Mutator methods
//! wrap their request into an event and push it into the control; the
//! control applies it and re-broadcasts the very same event object to its
//! listeners.
//!
//! # Loop prevention
//!
//! An event carries a shared, append-only `processed` list of control ids.
//! A control drops any event whose list already contains its id, and appends
//! itself before broadcasting. Clones of an event, and events derived from it
//! with [`ControlEvent::map_change`], share that list, so an event that loops
//! back through linked controls stops after visiting each control once.
//!
//! ```ignore
//! let event = ControlEvent::new(source, StateChange::Value(json!("x")));
//! assert!(event.mark_processed(a.id()));
//! assert!(!event.mark_processed(a.id())); // already applied
//! ```

mod listeners;

pub use listeners::Subscription;
pub(crate) use listeners::Listeners;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::container::ControlsStore;
use crate::control::stores::{ErrorsStore, PendingStore, ValidatorStore};
use crate::control::validators::Validator;
use crate::types::{ControlFlags, ControlId, ControlKey, ValidationErrors, Value};

/// Free-form side-channel payload.
pub type EventMeta = serde_json::Map<String, Value>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Per-call options accepted by every mutator's `_with` variant.
#[derive(Debug, Clone, Default)]
pub struct EventOptions {
    /// Who requests the change. Defaults to the control's own id.
    pub source: Option<ControlId>,
    /// Apply the change but hide it from `no_emit`-aware listeners.
    pub no_emit: bool,
    pub meta: Option<EventMeta>,
}

impl EventOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: ControlId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn no_emit(mut self) -> Self {
        self.no_emit = true;
        self
    }

    pub fn meta(mut self, meta: EventMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

// =============================================================================
// KINDS
// =============================================================================

/// Fieldless discriminator of a [`StateChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Value,
    Errors,
    ErrorsStore,
    Touched,
    Changed,
    Readonly,
    Submitted,
    Disabled,
    Pending,
    PendingStore,
    Validators,
    ValidatorStore,
    ControlsStore,
    Focus,
    Child,
    Custom,
}

impl EventKind {
    /// Stable protocol name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Value => "value",
            EventKind::Errors => "errors",
            EventKind::ErrorsStore => "errorsStore",
            EventKind::Touched => "touched",
            EventKind::Changed => "changed",
            EventKind::Readonly => "readonly",
            EventKind::Submitted => "submitted",
            EventKind::Disabled => "disabled",
            EventKind::Pending => "pending",
            EventKind::PendingStore => "pendingStore",
            EventKind::Validators => "validators",
            EventKind::ValidatorStore => "validatorStore",
            EventKind::ControlsStore => "controlsStore",
            EventKind::Focus => "focus",
            EventKind::Child => "childEvent",
            EventKind::Custom => "custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// STATE CHANGE
// =============================================================================

/// A child's event re-published by its container.
#[derive(Debug, Clone)]
pub struct ChildEvent {
    pub control_id: ControlId,
    pub key: ControlKey,
    pub event: ControlEvent,
}

/// What an event changes.
#[derive(Debug, Clone)]
pub enum StateChange {
    Value(Value),
    /// Replace the source's entry in the errors store (`None` removes it).
    Errors(Option<ValidationErrors>),
    ErrorsStore(ErrorsStore),
    Touched(bool),
    Changed(bool),
    Readonly(bool),
    Submitted(bool),
    Disabled(bool),
    /// Toggle the source's entry in the pending store.
    Pending(bool),
    PendingStore(PendingStore),
    /// Replace the source's entry in the validator store (`None` removes it).
    Validators(Option<Validator>),
    ValidatorStore(ValidatorStore),
    /// Containers only: the complete key to child mapping.
    ControlsStore(ControlsStore),
    /// `true` asks bound widgets to focus, `false` to blur.
    Focus(bool),
    Child(ChildEvent),
    /// Extension events. Applied nowhere, re-published everywhere.
    Custom { kind: String, value: Value },
}

impl StateChange {
    pub fn kind(&self) -> EventKind {
        match self {
            StateChange::Value(_) => EventKind::Value,
            StateChange::Errors(_) => EventKind::Errors,
            StateChange::ErrorsStore(_) => EventKind::ErrorsStore,
            StateChange::Touched(_) => EventKind::Touched,
            StateChange::Changed(_) => EventKind::Changed,
            StateChange::Readonly(_) => EventKind::Readonly,
            StateChange::Submitted(_) => EventKind::Submitted,
            StateChange::Disabled(_) => EventKind::Disabled,
            StateChange::Pending(_) => EventKind::Pending,
            StateChange::PendingStore(_) => EventKind::PendingStore,
            StateChange::Validators(_) => EventKind::Validators,
            StateChange::ValidatorStore(_) => EventKind::ValidatorStore,
            StateChange::ControlsStore(_) => EventKind::ControlsStore,
            StateChange::Focus(_) => EventKind::Focus,
            StateChange::Child(_) => EventKind::Child,
            StateChange::Custom { .. } => EventKind::Custom,
        }
    }

    /// Protocol type name. Custom events report their own kind string.
    pub fn type_name(&self) -> &str {
        match self {
            StateChange::Custom { kind, .. } => kind,
            other => other.kind().as_str(),
        }
    }

    /// The change at the bottom of any `Child` envelopes.
    pub fn innermost(&self) -> &StateChange {
        match self {
            StateChange::Child(child) => child.event.change().innermost(),
            other => other,
        }
    }

    /// Whether applying this change can alter a control's value.
    pub fn affects_value(&self) -> bool {
        matches!(
            self.innermost(),
            StateChange::Value(_) | StateChange::ControlsStore(_)
        )
    }

    /// Build the boolean change for a single flag.
    pub fn flag(flag: ControlFlags, value: bool) -> Option<StateChange> {
        let change = if flag == ControlFlags::DISABLED {
            StateChange::Disabled(value)
        } else if flag == ControlFlags::TOUCHED {
            StateChange::Touched(value)
        } else if flag == ControlFlags::CHANGED {
            StateChange::Changed(value)
        } else if flag == ControlFlags::READONLY {
            StateChange::Readonly(value)
        } else if flag == ControlFlags::SUBMITTED {
            StateChange::Submitted(value)
        } else {
            return None;
        };
        Some(change)
    }

    /// The flag and value carried by a boolean change.
    pub fn as_flag(&self) -> Option<(ControlFlags, bool)> {
        match self {
            StateChange::Disabled(v) => Some((ControlFlags::DISABLED, *v)),
            StateChange::Touched(v) => Some((ControlFlags::TOUCHED, *v)),
            StateChange::Changed(v) => Some((ControlFlags::CHANGED, *v)),
            StateChange::Readonly(v) => Some((ControlFlags::READONLY, *v)),
            StateChange::Submitted(v) => Some((ControlFlags::SUBMITTED, *v)),
            _ => None,
        }
    }
}

// =============================================================================
// CONTROL EVENT
// =============================================================================

struct EventInner {
    source: ControlId,
    change: StateChange,
    no_emit: bool,
    meta: Option<EventMeta>,
    processed: Rc<RefCell<Vec<ControlId>>>,
}

/// A tagged state change.
///
/// Cheap to clone; clones are the same event object and share `processed`.
#[derive(Clone)]
pub struct ControlEvent {
    inner: Rc<EventInner>,
}

impl ControlEvent {
    /// Create a fresh event with an empty `processed` list.
    pub fn new(source: ControlId, change: StateChange) -> Self {
        Self::from_parts(source, change, false, None, Rc::default())
    }

    /// Create a fresh event on behalf of `owner`, honoring `opts.source`.
    pub fn with_options(owner: ControlId, change: StateChange, opts: &EventOptions) -> Self {
        Self::from_parts(
            opts.source.unwrap_or(owner),
            change,
            opts.no_emit,
            opts.meta.clone(),
            Rc::default(),
        )
    }

    /// Wrap a child's event. The envelope starts its own `processed` list.
    pub(crate) fn child(control_id: ControlId, key: ControlKey, event: ControlEvent) -> Self {
        let source = event.source();
        let no_emit = event.no_emit();
        let meta = event.meta().cloned();
        Self::from_parts(
            source,
            StateChange::Child(ChildEvent { control_id, key, event }),
            no_emit,
            meta,
            Rc::default(),
        )
    }

    fn from_parts(
        source: ControlId,
        change: StateChange,
        no_emit: bool,
        meta: Option<EventMeta>,
        processed: Rc<RefCell<Vec<ControlId>>>,
    ) -> Self {
        Self {
            inner: Rc::new(EventInner {
                source,
                change,
                no_emit,
                meta,
                processed,
            }),
        }
    }

    pub fn source(&self) -> ControlId {
        self.inner.source
    }

    pub fn change(&self) -> &StateChange {
        &self.inner.change
    }

    pub fn kind(&self) -> EventKind {
        self.inner.change.kind()
    }

    pub fn no_emit(&self) -> bool {
        self.inner.no_emit
    }

    pub fn meta(&self) -> Option<&EventMeta> {
        self.inner.meta.as_ref()
    }

    /// Ids of every control that has applied this event, in order.
    pub fn processed(&self) -> Vec<ControlId> {
        self.inner.processed.borrow().clone()
    }

    pub fn is_processed_by(&self, id: ControlId) -> bool {
        self.inner.processed.borrow().contains(&id)
    }

    /// Append `id` to `processed`. Returns false if it was already there.
    pub fn mark_processed(&self, id: ControlId) -> bool {
        let mut processed = self.inner.processed.borrow_mut();
        if processed.contains(&id) {
            return false;
        }
        processed.push(id);
        true
    }

    /// Derive an event with a different payload.
    ///
    /// Source, flags, meta and the `processed` list are shared with `self`,
    /// which keeps loop prevention intact across transforms.
    pub fn map_change(&self, change: StateChange) -> ControlEvent {
        Self::from_parts(
            self.inner.source,
            change,
            self.inner.no_emit,
            self.inner.meta.clone(),
            Rc::clone(&self.inner.processed),
        )
    }

    /// Whether two handles point at the same event object.
    pub fn ptr_eq(&self, other: &ControlEvent) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlEvent")
            .field("source", &self.inner.source)
            .field("change", &self.inner.change)
            .field("no_emit", &self.inner.no_emit)
            .field("processed", &self.inner.processed.borrow())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
