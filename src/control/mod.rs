//! Control Module - The event-sourced control state machine
//!
//! Every control, leaf or container, is a [`ControlNode`] behind an `Rc`.
//! State is never mutated directly: mutators wrap the request into a
//! [`ControlEvent`] and push it through the node's pipeline.
//!
//! # Pipeline
//!
//! For each incoming event:
//!
//! 1. drop it if this control's id is already in `processed`
//! 2. append this control's id to `processed`
//! 3. apply the change to the materialized state
//! 4. for value/validator changes, re-run the validators synchronously
//!    (the result is pushed as an `errors` event under the control's own id)
//! 5. mirror the new snapshot into the state signal
//! 6. re-broadcast the same event object to listeners
//!
//! Because step 2 happens before step 6, any listener that routes the event
//! back into this control finds its id already present, so one event settles
//! after visiting each control in the graph once.
//!
//! # Example
//!
//! ```ignore
//! use spark_controls::{FormControl, EventOptions};
//!
//! let name = FormControl::new("");
//! let sub = name.on_value(|value| println!("name = {}", value));
//!
//! name.set_value("Ada");
//! name.mark_touched(true);
//! name.mark_touched(true); // no-op, nothing emitted
//!
//! sub.unsubscribe();
//! ```

mod async_validation;
mod leaf;
pub mod options;
mod state;
pub mod stores;
pub mod validators;

pub use async_validation::{AsyncValidation, ValidationTask, VALIDATION_END, VALIDATION_START};
pub use leaf::FormControl;
pub use options::{ControlConfig, ControlOptions};
pub use stores::{ErrorsStore, PendingStore, SourceStore, ValidatorStore};
pub use validators::Validator;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use spark_signals::{signal, Signal};
use tracing::{debug, trace, warn};

use crate::container::{self, ControlsStore, Scope};
use crate::error::{ControlError, Result};
use crate::event::{ChildEvent, ControlEvent, EventOptions, Listeners, StateChange, Subscription};
use crate::types::{
    ControlFlags, ControlId, ControlKey, ControlKind, ControlSnapshot, ControlStatus,
    ValidationErrors, Value,
};
use state::ControlState;

// =============================================================================
// NODE
// =============================================================================

#[derive(Default)]
struct Children {
    entries: ControlsStore,
    subscriptions: Vec<Subscription>,
}

pub(crate) struct ControlNode {
    id: ControlId,
    kind: ControlKind,
    state: RefCell<ControlState>,
    children: RefCell<Children>,
    listeners: Listeners,
    signal: Signal<ControlSnapshot>,
    data: RefCell<Value>,
}

impl ControlNode {
    fn process(self: &Rc<Self>, event: ControlEvent) {
        if !event.mark_processed(self.id) {
            trace!(
                control = %self.id,
                event = event.change().type_name(),
                "event already processed, dropping"
            );
            return;
        }

        trace!(
            control = %self.id,
            event = event.change().type_name(),
            source = %event.source(),
            "applying event"
        );

        if self.apply(&event) {
            self.revalidate(&event);
        }
        self.publish();
        self.listeners.emit(&event);
    }

    fn emit(self: &Rc<Self>, change: StateChange, opts: &EventOptions) {
        self.process(ControlEvent::with_options(self.id, change, opts));
    }

    /// Apply one change. Returns true when validators must re-run.
    fn apply(self: &Rc<Self>, event: &ControlEvent) -> bool {
        let source = event.source();
        match event.change() {
            StateChange::Value(value) => {
                if self.kind.is_container() {
                    self.forward_value(value, event);
                    self.recompute(Scope::Value);
                } else {
                    let mut state = self.state.borrow_mut();
                    state.value = value.clone();
                    state.enabled_value = value.clone();
                }
                true
            }
            StateChange::Errors(errors) => {
                let mut state = self.state.borrow_mut();
                match stores::normalize_errors(errors.clone()) {
                    Some(errors) => {
                        state.errors_store.insert(source, errors);
                    }
                    None => {
                        state.errors_store.remove(&source);
                    }
                }
                state.refresh_errors();
                false
            }
            StateChange::ErrorsStore(store) => {
                let mut state = self.state.borrow_mut();
                state.errors_store = store.clone();
                state.refresh_errors();
                // The replacement may have dropped or overwritten our own entry
                true
            }
            StateChange::Pending(pending) => {
                let mut state = self.state.borrow_mut();
                if *pending {
                    state.pending_store.insert(source, true);
                } else {
                    state.pending_store.remove(&source);
                }
                false
            }
            StateChange::PendingStore(store) => {
                self.state.borrow_mut().pending_store = store.clone();
                true
            }
            StateChange::Validators(validator) => {
                let mut state = self.state.borrow_mut();
                match validator {
                    Some(validator) => {
                        state.validator_store.insert(source, validator.clone());
                    }
                    None => {
                        state.validator_store.remove(&source);
                    }
                }
                true
            }
            StateChange::ValidatorStore(store) => {
                self.state.borrow_mut().validator_store = store.clone();
                true
            }
            StateChange::ControlsStore(entries) => {
                if !self.kind.is_container() {
                    trace!(control = %self.id, "leaf control ignores controlsStore");
                    return false;
                }
                debug!(control = %self.id, children = entries.len(), "replacing child controls");
                self.replace_children(entries.clone());
                true
            }
            StateChange::Child(child) => self.apply_child(child),
            StateChange::Focus(_) | StateChange::Custom { .. } => false,
            change => {
                if let Some((flag, value)) = change.as_flag() {
                    self.state.borrow_mut().flags.set(flag, value);
                }
                false
            }
        }
    }

    /// Hand a container value down to the matching children.
    fn forward_value(&self, value: &Value, event: &ControlEvent) {
        let targets: Vec<(AbstractControl, Value)> = {
            let children = self.children.borrow();
            match (self.kind, value) {
                (ControlKind::Group, Value::Object(map)) => map
                    .iter()
                    .filter_map(|(name, child_value)| {
                        let found = children
                            .entries
                            .iter()
                            .find(|(key, _)| key.as_name() == Some(name.as_str()));
                        match found {
                            Some((_, child)) => Some((child.clone(), child_value.clone())),
                            None => {
                                warn!(control = %self.id, key = %name, "no child for value key, skipping");
                                None
                            }
                        }
                    })
                    .collect(),
                (ControlKind::Array, Value::Array(items)) => items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| match children.entries.get(index) {
                        Some((_, child)) => Some((child.clone(), item.clone())),
                        None => {
                            warn!(control = %self.id, index, "no child at value index, skipping");
                            None
                        }
                    })
                    .collect(),
                (_, other) => {
                    warn!(control = %self.id, value = %other, "value does not match container shape, ignoring");
                    return;
                }
            }
        };

        let opts = EventOptions {
            source: Some(event.source()),
            no_emit: event.no_emit(),
            meta: event.meta().cloned(),
        };
        for (child, child_value) in targets {
            child.0.emit(StateChange::Value(child_value), &opts);
        }
    }

    fn apply_child(&self, child: &ChildEvent) -> bool {
        if !self.kind.is_container() {
            return false;
        }
        let known = self
            .children
            .borrow()
            .entries
            .iter()
            .any(|(_, control)| control.id() == child.control_id);
        if !known {
            trace!(control = %self.id, child = %child.control_id, "ignoring event from a control that is not a child");
            return false;
        }

        let scope = Scope::for_change(child.event.change());
        self.recompute(scope);
        scope.includes_value()
    }

    /// Re-derive container aggregates from the current children.
    fn recompute(&self, scope: Scope) {
        if scope == Scope::None || !self.kind.is_container() {
            return;
        }
        let (values, aggregate) = {
            let children = self.children.borrow();
            let values = scope
                .includes_value()
                .then(|| container::aggregate_value(self.kind, &children.entries));
            let aggregate = scope
                .includes_state()
                .then(|| container::aggregate_state(&children.entries));
            (values, aggregate)
        };

        let mut state = self.state.borrow_mut();
        if let Some((value, enabled_value)) = values {
            state.value = value;
            state.enabled_value = enabled_value;
        }
        if let Some(aggregate) = aggregate {
            state.aggregate = aggregate;
        }
    }

    /// Drop every child subscription, adopt `entries`, subscribe again.
    fn replace_children(self: &Rc<Self>, entries: ControlsStore) {
        let entries = container::normalize_keys(self.kind, entries);

        let previous = std::mem::take(&mut self.children.borrow_mut().subscriptions);
        for subscription in previous {
            subscription.unsubscribe();
        }

        let parent = Rc::downgrade(self);
        let subscriptions = entries
            .iter()
            .map(|(key, child)| {
                let parent = parent.clone();
                let key = key.clone();
                let child_id = child.id();
                child.0.listeners.subscribe(move |event| {
                    if let Some(parent) = parent.upgrade() {
                        parent.process(ControlEvent::child(child_id, key.clone(), event.clone()));
                    }
                })
            })
            .collect();

        {
            let mut children = self.children.borrow_mut();
            children.entries = entries;
            children.subscriptions = subscriptions;
        }
        self.recompute(Scope::All);
    }

    fn run_validators(&self) -> (Option<ValidationErrors>, Option<ValidationErrors>) {
        let (store, value, current) = {
            let state = self.state.borrow();
            (
                state.validator_store.clone(),
                state.value.clone(),
                state.errors_store.get(&self.id).cloned(),
            )
        };
        (stores::run_validators(&store, &value), current)
    }

    /// Re-run validators; push the result as this control's own errors.
    fn revalidate(self: &Rc<Self>, cause: &ControlEvent) {
        let (errors, current) = self.run_validators();
        if errors == current {
            return;
        }
        trace!(control = %self.id, valid = errors.is_none(), "validators produced new errors");
        let opts = EventOptions {
            source: Some(self.id),
            no_emit: cause.no_emit(),
            meta: None,
        };
        self.emit(StateChange::Errors(errors), &opts);
    }

    fn publish(&self) {
        let snapshot = self.state.borrow().snapshot(self.id);
        self.signal.set(snapshot);
    }
}

impl Drop for ControlNode {
    fn drop(&mut self) {
        for subscription in self.children.get_mut().subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

// =============================================================================
// ABSTRACT CONTROL
// =============================================================================

/// Shared handle to any control: leaf, group or array.
///
/// Cloning the handle does not clone the control.
#[derive(Clone)]
pub struct AbstractControl(Rc<ControlNode>);

/// Non-owning handle, used by links and async validators.
#[derive(Clone)]
pub struct WeakControl(Weak<ControlNode>);

impl WeakControl {
    pub fn upgrade(&self) -> Option<AbstractControl> {
        self.0.upgrade().map(AbstractControl)
    }
}

impl fmt::Debug for WeakControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakControl")
    }
}

impl AbstractControl {
    pub(crate) fn build(kind: ControlKind, options: ControlOptions, entries: ControlsStore) -> Self {
        let ControlOptions {
            config,
            validators: extra_validators,
            validator_store,
            id,
        } = options;

        let id = id.unwrap_or_default();
        let mut validator_store = validator_store.unwrap_or_default();
        if let Some(validator) = validators::compose(extra_validators) {
            validator_store.insert(id, validator);
        }
        let mut pending_store = PendingStore::new();
        if config.pending {
            pending_store.insert(id, true);
        }
        let value = if kind.is_container() {
            Value::Null
        } else {
            config.value.clone()
        };

        let node = Rc::new(ControlNode {
            id,
            kind,
            state: RefCell::new(ControlState::new(
                value,
                config.flags(),
                pending_store,
                validator_store,
            )),
            children: RefCell::default(),
            listeners: Listeners::default(),
            signal: signal(ControlSnapshot::default()),
            data: RefCell::new(config.data),
        });

        if kind.is_container() {
            node.replace_children(entries);
        }

        // Initial validation is applied directly; there is nobody to notify yet
        let (errors, _) = node.run_validators();
        {
            let mut state = node.state.borrow_mut();
            if let Some(errors) = errors {
                state.errors_store.insert(id, errors);
            }
            state.refresh_errors();
        }
        node.publish();

        debug!(control = %id, ?kind, "control created");
        AbstractControl(node)
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    pub fn id(&self) -> ControlId {
        self.0.id
    }

    pub fn kind(&self) -> ControlKind {
        self.0.kind
    }

    pub fn is_container(&self) -> bool {
        self.0.kind.is_container()
    }

    pub fn downgrade(&self) -> WeakControl {
        WeakControl(Rc::downgrade(&self.0))
    }

    /// Whether two handles refer to the same control.
    pub fn ptr_eq(&self, other: &AbstractControl) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // -------------------------------------------------------------------------
    // State reads
    // -------------------------------------------------------------------------

    pub fn value(&self) -> Value {
        self.0.state.borrow().value.clone()
    }

    /// Value without disabled children. Same as `value()` for leaves.
    pub fn enabled_value(&self) -> Value {
        self.0.state.borrow().enabled_value.clone()
    }

    /// Deserialize the current value.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value())?)
    }

    /// Merged errors of this control's own error store.
    pub fn errors(&self) -> Option<ValidationErrors> {
        self.0.state.borrow().errors.clone()
    }

    pub fn errors_store(&self) -> ErrorsStore {
        self.0.state.borrow().errors_store.clone()
    }

    pub fn pending_store(&self) -> PendingStore {
        self.0.state.borrow().pending_store.clone()
    }

    pub fn validator_store(&self) -> ValidatorStore {
        self.0.state.borrow().validator_store.clone()
    }

    /// Own errors, or (containers) any enabled child invalid.
    pub fn invalid(&self) -> bool {
        self.0.state.borrow().invalid()
    }

    pub fn valid(&self) -> bool {
        !self.invalid()
    }

    pub fn status(&self) -> ControlStatus {
        self.0.state.borrow().status()
    }

    /// Flags set on this control itself.
    pub fn own_flags(&self) -> ControlFlags {
        self.0.state.borrow().flags
    }

    /// Effective flags: own flags, plus those every enabled child shares.
    pub fn flags(&self) -> ControlFlags {
        self.0.state.borrow().effective_flags()
    }

    /// Flags held by at least one enabled child.
    pub fn child_flags(&self) -> ControlFlags {
        self.0.state.borrow().aggregate.any
    }

    /// Flags held by every enabled child.
    pub fn children_flags(&self) -> ControlFlags {
        self.0.state.borrow().aggregate.all
    }

    pub fn disabled(&self) -> bool {
        self.flags().contains(ControlFlags::DISABLED)
    }

    pub fn enabled(&self) -> bool {
        !self.disabled()
    }

    pub fn touched(&self) -> bool {
        self.flags().contains(ControlFlags::TOUCHED)
    }

    pub fn changed(&self) -> bool {
        self.flags().contains(ControlFlags::CHANGED)
    }

    pub fn readonly(&self) -> bool {
        self.flags().contains(ControlFlags::READONLY)
    }

    pub fn submitted(&self) -> bool {
        self.flags().contains(ControlFlags::SUBMITTED)
    }

    pub fn pending(&self) -> bool {
        self.0.state.borrow().pending()
    }

    /// Opaque user payload. Not part of the event protocol.
    pub fn data(&self) -> Value {
        self.0.data.borrow().clone()
    }

    pub fn set_data(&self, data: impl Into<Value>) {
        *self.0.data.borrow_mut() = data.into();
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.0.state.borrow().snapshot(self.0.id)
    }

    /// Reactive mirror of the snapshot, updated after every applied event.
    pub fn state_signal(&self) -> Signal<ControlSnapshot> {
        self.0.signal.clone()
    }

    // -------------------------------------------------------------------------
    // Streams
    // -------------------------------------------------------------------------

    /// Every applied event, including `no_emit` ones.
    pub fn on_changes<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ControlEvent) + 'static,
    {
        self.0.listeners.subscribe(handler)
    }

    /// Applied events, skipping those tagged `no_emit`.
    pub fn on_emitted_changes<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ControlEvent) + 'static,
    {
        self.0.listeners.subscribe(move |event| {
            if !event.no_emit() {
                handler(event);
            }
        })
    }

    /// The current value, after every emitted event that can change it.
    pub fn on_value<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Value) + 'static,
    {
        let control = self.downgrade();
        self.on_emitted_changes(move |event| {
            if !event.change().affects_value() {
                return;
            }
            if let Some(control) = control.upgrade() {
                handler(&control.value());
            }
        })
    }

    /// Focus (`true`) and blur (`false`) requests.
    pub fn on_focus<F>(&self, handler: F) -> Subscription
    where
        F: Fn(bool) + 'static,
    {
        self.on_emitted_changes(move |event| {
            if let StateChange::Focus(focus) = event.change() {
                handler(*focus);
            }
        })
    }

    /// Status transitions.
    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ControlStatus) + 'static,
    {
        crate::observe::observe_distinct(self, |snapshot| snapshot.status, move |status| {
            handler(*status)
        })
    }

    pub fn listener_count(&self) -> usize {
        self.0.listeners.len()
    }

    // -------------------------------------------------------------------------
    // Event source
    // -------------------------------------------------------------------------

    /// Push an event into this control's pipeline.
    ///
    /// This is the injection point used by links and UI bindings. The event
    /// object is applied as-is (its `processed` list is honored).
    pub fn push(&self, event: ControlEvent) {
        self.0.process(event);
    }

    /// Emit an arbitrary change, e.g. a protocol-level `Custom` signal.
    pub fn emit_event(&self, change: StateChange, opts: EventOptions) {
        self.0.emit(change, &opts);
    }

    // -------------------------------------------------------------------------
    // Value
    // -------------------------------------------------------------------------

    /// Set the value. Containers require every child key to be present.
    pub fn set_value(&self, value: impl Into<Value>) -> Result<()> {
        self.set_value_with(value, EventOptions::default())
    }

    pub fn set_value_with(&self, value: impl Into<Value>, opts: EventOptions) -> Result<()> {
        let value = value.into();
        container::check_shape(self, &value, true)?;
        self.0.emit(StateChange::Value(value), &opts);
        Ok(())
    }

    /// Set part of the value. Containers accept any subset of child keys.
    pub fn patch_value(&self, value: impl Into<Value>) -> Result<()> {
        self.patch_value_with(value, EventOptions::default())
    }

    pub fn patch_value_with(&self, value: impl Into<Value>, opts: EventOptions) -> Result<()> {
        let value = value.into();
        container::check_shape(self, &value, false)?;
        self.0.emit(StateChange::Value(value), &opts);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    /// Set one flag. Emits nothing if the control already has that state.
    ///
    /// On a container the flag may also come from the children (every
    /// child disabled, every enabled child touched). Clearing it then
    /// clears it on the children too, so the container really ends up
    /// without it.
    pub fn mark_flag_with(&self, flag: ControlFlags, value: bool, opts: EventOptions) {
        let Some(change) = StateChange::flag(flag, value) else {
            warn!(control = %self.id(), ?flag, "mark_flag expects a single flag");
            return;
        };
        if self.own_flags().contains(flag) == value {
            trace!(control = %self.id(), ?flag, value, "flag unchanged, not emitting");
        } else {
            self.0.emit(change, &opts);
        }
        if !value && self.flags().contains(flag) {
            debug!(control = %self.id(), ?flag, "flag held by the children, clearing it there");
            self.mark_children_with(flag, false, opts);
        }
    }

    pub fn mark_touched(&self, value: bool) {
        self.mark_flag_with(ControlFlags::TOUCHED, value, EventOptions::default());
    }

    pub fn mark_touched_with(&self, value: bool, opts: EventOptions) {
        self.mark_flag_with(ControlFlags::TOUCHED, value, opts);
    }

    pub fn mark_changed(&self, value: bool) {
        self.mark_flag_with(ControlFlags::CHANGED, value, EventOptions::default());
    }

    pub fn mark_changed_with(&self, value: bool, opts: EventOptions) {
        self.mark_flag_with(ControlFlags::CHANGED, value, opts);
    }

    pub fn mark_readonly(&self, value: bool) {
        self.mark_flag_with(ControlFlags::READONLY, value, EventOptions::default());
    }

    pub fn mark_readonly_with(&self, value: bool, opts: EventOptions) {
        self.mark_flag_with(ControlFlags::READONLY, value, opts);
    }

    pub fn mark_submitted(&self, value: bool) {
        self.mark_flag_with(ControlFlags::SUBMITTED, value, EventOptions::default());
    }

    pub fn mark_submitted_with(&self, value: bool, opts: EventOptions) {
        self.mark_flag_with(ControlFlags::SUBMITTED, value, opts);
    }

    pub fn mark_disabled(&self, value: bool) {
        self.mark_flag_with(ControlFlags::DISABLED, value, EventOptions::default());
    }

    pub fn mark_disabled_with(&self, value: bool, opts: EventOptions) {
        self.mark_flag_with(ControlFlags::DISABLED, value, opts);
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    /// Replace the source's errors. `None` or `{}` removes the entry.
    pub fn set_errors(&self, errors: Option<ValidationErrors>) {
        self.set_errors_with(errors, EventOptions::default());
    }

    pub fn set_errors_with(&self, errors: Option<ValidationErrors>, opts: EventOptions) {
        self.0
            .emit(StateChange::Errors(stores::normalize_errors(errors)), &opts);
    }

    /// Replace the whole errors store.
    pub fn set_errors_store(&self, store: ErrorsStore) {
        self.set_errors_store_with(store, EventOptions::default());
    }

    pub fn set_errors_store_with(&self, store: ErrorsStore, opts: EventOptions) {
        self.0.emit(StateChange::ErrorsStore(store), &opts);
    }

    /// Merge into the source's errors. `null` values delete keys.
    pub fn patch_errors(&self, patch: ValidationErrors) {
        self.patch_errors_with(patch, EventOptions::default());
    }

    pub fn patch_errors_with(&self, patch: ValidationErrors, opts: EventOptions) {
        let source = opts.source.unwrap_or(self.id());
        let merged = {
            let state = self.0.state.borrow();
            stores::patch_errors(state.errors_store.get(&source), &patch)
        };
        self.0
            .emit(StateChange::Errors(stores::normalize_errors(Some(merged))), &opts);
    }

    /// Merge every entry of `patch` into the matching source's errors.
    pub fn patch_errors_store_with(&self, patch: ErrorsStore, opts: EventOptions) {
        let mut store = self.errors_store();
        for (source, errors) in patch.iter() {
            let merged = stores::patch_errors(store.get(source), errors);
            if merged.is_empty() {
                store.remove(source);
            } else {
                store.insert(*source, merged);
            }
        }
        self.0.emit(StateChange::ErrorsStore(store), &opts);
    }

    // -------------------------------------------------------------------------
    // Pending
    // -------------------------------------------------------------------------

    /// Toggle the source's pending entry.
    pub fn mark_pending(&self, pending: bool) {
        self.mark_pending_with(pending, EventOptions::default());
    }

    pub fn mark_pending_with(&self, pending: bool, opts: EventOptions) {
        self.0.emit(StateChange::Pending(pending), &opts);
    }

    /// Replace the whole pending store.
    pub fn set_pending_store(&self, store: PendingStore) {
        self.set_pending_store_with(store, EventOptions::default());
    }

    pub fn set_pending_store_with(&self, store: PendingStore, opts: EventOptions) {
        self.0.emit(StateChange::PendingStore(store), &opts);
    }

    // -------------------------------------------------------------------------
    // Validators
    // -------------------------------------------------------------------------

    /// Replace the source's validators. An empty list removes the entry.
    pub fn set_validators(&self, validators: impl IntoIterator<Item = Validator>) {
        self.set_validators_with(validators, EventOptions::default());
    }

    pub fn set_validators_with(
        &self,
        validators: impl IntoIterator<Item = Validator>,
        opts: EventOptions,
    ) {
        self.0
            .emit(StateChange::Validators(validators::compose(validators)), &opts);
    }

    /// Replace the whole validator store.
    pub fn set_validator_store(&self, store: ValidatorStore) {
        self.set_validator_store_with(store, EventOptions::default());
    }

    pub fn set_validator_store_with(&self, store: ValidatorStore, opts: EventOptions) {
        self.0.emit(StateChange::ValidatorStore(store), &opts);
    }

    // -------------------------------------------------------------------------
    // Focus
    // -------------------------------------------------------------------------

    pub fn focus(&self) {
        self.focus_with(true, EventOptions::default());
    }

    pub fn blur(&self) {
        self.focus_with(false, EventOptions::default());
    }

    pub fn focus_with(&self, focus: bool, opts: EventOptions) {
        self.0.emit(StateChange::Focus(focus), &opts);
    }

    // -------------------------------------------------------------------------
    // Reset & replay
    // -------------------------------------------------------------------------

    /// Restore construction defaults. Containers reset their children first.
    pub fn reset(&self) {
        self.reset_with(EventOptions::default());
    }

    pub fn reset_with(&self, opts: EventOptions) {
        debug!(control = %self.id(), "resetting to defaults");
        for (_, child) in self.controls() {
            child.reset_with(opts.clone());
        }

        let defaults = self.0.state.borrow().defaults.clone();
        let mut changes = Vec::new();
        if !self.is_container() {
            changes.push(StateChange::Value(defaults.value));
        }
        for flag in ControlFlags::EACH {
            changes.extend(StateChange::flag(flag, defaults.flags.contains(flag)));
        }
        changes.push(StateChange::PendingStore(defaults.pending_store));
        changes.push(StateChange::ErrorsStore(ErrorsStore::new()));
        changes.push(StateChange::ValidatorStore(defaults.validator_store));

        for change in changes {
            self.0.emit(change, &opts);
        }
    }

    /// Current state as a batch of fresh events, without applying them.
    ///
    /// Pushing the batch into another control makes it mirror this one;
    /// pushing it back into this control changes nothing.
    pub fn replay_state(&self) -> Vec<ControlEvent> {
        self.replay_state_with(EventOptions::default())
    }

    pub fn replay_state_with(&self, opts: EventOptions) -> Vec<ControlEvent> {
        let mut changes = Vec::new();
        {
            let state = self.0.state.borrow();
            changes.push(StateChange::Value(state.value.clone()));
            for flag in ControlFlags::EACH {
                changes.extend(StateChange::flag(flag, state.flags.contains(flag)));
            }
            changes.push(StateChange::PendingStore(state.pending_store.clone()));
            changes.push(StateChange::ValidatorStore(state.validator_store.clone()));
            changes.push(StateChange::ErrorsStore(state.errors_store.clone()));
        }
        changes
            .into_iter()
            .map(|change| ControlEvent::with_options(self.id(), change, &opts))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    /// The key→child mapping, in order. Empty for leaves.
    pub fn controls(&self) -> ControlsStore {
        self.0.children.borrow().entries.clone()
    }

    pub fn child(&self, key: &ControlKey) -> Option<AbstractControl> {
        self.0
            .children
            .borrow()
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, child)| child.clone())
    }

    /// Walk nested containers. Name segments index arrays when numeric.
    pub fn get_path<I, K>(&self, path: I) -> Option<AbstractControl>
    where
        I: IntoIterator<Item = K>,
        K: Into<ControlKey>,
    {
        let mut current = self.clone();
        for segment in path {
            let key = match (current.kind(), segment.into()) {
                (ControlKind::Array, ControlKey::Name(name)) => {
                    ControlKey::Index(name.parse().ok()?)
                }
                (_, key) => key,
            };
            current = current.child(&key)?;
        }
        Some(current)
    }

    /// Replace every child at once.
    pub fn set_controls(&self, controls: ControlsStore) -> Result<()> {
        self.set_controls_with(controls, EventOptions::default())
    }

    pub fn set_controls_with(&self, controls: ControlsStore, opts: EventOptions) -> Result<()> {
        if !self.is_container() {
            return Err(ControlError::NotAContainer { control: self.id() });
        }
        self.0.emit(StateChange::ControlsStore(controls), &opts);
        Ok(())
    }

    /// Set `flag` on every direct child.
    pub fn mark_children_with(&self, flag: ControlFlags, value: bool, opts: EventOptions) {
        for (_, child) in self.controls() {
            child.mark_flag_with(flag, value, opts.clone());
        }
    }

    pub fn mark_children_touched(&self, value: bool) {
        self.mark_children_with(ControlFlags::TOUCHED, value, EventOptions::default());
    }

    pub fn mark_children_changed(&self, value: bool) {
        self.mark_children_with(ControlFlags::CHANGED, value, EventOptions::default());
    }

    pub fn mark_children_readonly(&self, value: bool) {
        self.mark_children_with(ControlFlags::READONLY, value, EventOptions::default());
    }

    pub fn mark_children_submitted(&self, value: bool) {
        self.mark_children_with(ControlFlags::SUBMITTED, value, EventOptions::default());
    }

    pub fn mark_children_disabled(&self, value: bool) {
        self.mark_children_with(ControlFlags::DISABLED, value, EventOptions::default());
    }
}

impl fmt::Debug for AbstractControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AbstractControl");
        debug.field("id", &self.0.id).field("kind", &self.0.kind);
        match self.0.state.try_borrow() {
            Ok(state) => debug.field("value", &state.value),
            Err(_) => debug.field("value", &"<busy>"),
        };
        debug.finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn errors(value: Value) -> ValidationErrors {
        value.as_object().cloned().unwrap()
    }

    fn counter(control: &AbstractControl) -> (Rc<Cell<usize>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        let sub = control.on_changes(move |_| count_clone.set(count_clone.get() + 1));
        (count, sub)
    }

    #[test]
    fn test_set_value_updates_state() {
        let control = FormControl::new("a");
        control.set_value("b");
        assert_eq!(control.value(), json!("b"));
        assert_eq!(control.enabled_value(), json!("b"));
        assert_eq!(control.snapshot().value, json!("b"));
    }

    #[test]
    fn test_value_as() {
        let control = FormControl::new(json!({"n": 4}));

        #[derive(serde::Deserialize)]
        struct Payload {
            n: u32,
        }
        assert_eq!(control.value_as::<Payload>().unwrap().n, 4);
        assert!(control.value_as::<String>().is_err());
    }

    #[test]
    fn test_mark_touched_twice_emits_once() {
        let control = FormControl::new(1);
        let (count, _sub) = counter(&control);

        control.mark_touched(true);
        control.mark_touched(true);
        assert_eq!(count.get(), 1);
        assert!(control.touched());

        control.mark_touched(false);
        assert_eq!(count.get(), 2);
        assert!(!control.touched());
    }

    #[test]
    fn test_push_drops_already_processed_event() {
        let control = FormControl::new(1);
        let (count, _sub) = counter(&control);

        let event = ControlEvent::new(control.id(), StateChange::Value(json!(2)));
        control.push(event.clone());
        control.push(event.clone());
        assert_eq!(count.get(), 1);
        assert_eq!(event.processed(), vec![control.id()]);
    }

    #[test]
    fn test_error_sources_are_isolated() {
        let control = FormControl::new("x");
        let first = ControlId::new();
        let second = ControlId::new();

        control.set_errors_with(Some(errors(json!({"x": "e1"}))), EventOptions::new().source(first));
        control.set_errors_with(Some(errors(json!({"y": "e2"}))), EventOptions::new().source(second));
        assert_eq!(control.errors(), Some(errors(json!({"x": "e1", "y": "e2"}))));
        assert!(control.invalid());

        control.set_errors_with(None, EventOptions::new().source(first));
        assert_eq!(control.errors(), Some(errors(json!({"y": "e2"}))));

        control.set_errors_with(Some(ValidationErrors::new()), EventOptions::new().source(second));
        assert_eq!(control.errors(), None);
        assert!(control.valid());
    }

    #[test]
    fn test_set_errors_store_replaces_everything() {
        let control = FormControl::new("x");
        control.set_errors(Some(errors(json!({"a": 1}))));

        let other = ControlId::new();
        let store: ErrorsStore = [(other, errors(json!({"b": 2})))].into_iter().collect();
        control.set_errors_store(store);
        assert_eq!(control.errors(), Some(errors(json!({"b": 2}))));
        assert!(!control.errors_store().contains(&control.id()));
    }

    #[test]
    fn test_errors_store_replacement_keeps_own_validation() {
        let control = FormControl::with_options(
            ControlOptions::new().value("").validator(validators::required()),
        );
        let other = ControlId::new();
        let store: ErrorsStore = [(other, errors(json!({"remote": 1})))].into_iter().collect();
        control.set_errors_store(store);

        assert_eq!(
            control.errors_store().get(&control.id()),
            Some(&errors(json!({"required": true})))
        );
        assert_eq!(control.errors(), Some(errors(json!({"remote": 1, "required": true}))));

        control.set_errors_store_with(ErrorsStore::new(), EventOptions::new().source(other));
        control.set_value("filled");
        assert!(control.valid());
    }

    #[test]
    fn test_patch_errors() {
        let control = FormControl::new("x");
        control.set_errors(Some(errors(json!({"a": 1, "b": 2}))));
        control.patch_errors(errors(json!({"a": null, "c": 3})));
        assert_eq!(control.errors(), Some(errors(json!({"b": 2, "c": 3}))));

        control.patch_errors(errors(json!({"b": null, "c": null})));
        assert_eq!(control.errors(), None);
        assert!(control.errors_store().is_empty());
    }

    #[test]
    fn test_patch_errors_store() {
        let control = FormControl::new("x");
        let other = ControlId::new();
        control.set_errors_with(Some(errors(json!({"a": 1}))), EventOptions::new().source(other));

        let patch: ErrorsStore = [(other, errors(json!({"a": null, "b": 2})))].into_iter().collect();
        control.patch_errors_store_with(patch, EventOptions::new());
        assert_eq!(control.errors_store().get(&other), Some(&errors(json!({"b": 2}))));
    }

    #[test]
    fn test_validators_run_on_value() {
        let control = FormControl::with_options(
            ControlOptions::new().value("").validator(validators::required()),
        );
        assert!(control.invalid());
        assert_eq!(control.status(), ControlStatus::Invalid);

        control.set_value("filled");
        assert!(control.valid());
        assert!(control.errors_store().is_empty());

        control.set_value("");
        assert!(control.errors().unwrap().contains_key("required"));
    }

    #[test]
    fn test_validator_sources_combine() {
        let control = FormControl::new("ab");
        let directive = ControlId::new();

        control.set_validators([validators::min_length(3)]);
        assert!(control.errors().unwrap().contains_key("minLength"));

        control.set_validators_with([validators::max_length(1)], EventOptions::new().source(directive));
        let errs = control.errors().unwrap();
        assert!(errs.contains_key("minLength"));
        assert!(errs.contains_key("maxLength"));
        assert_eq!(control.validator_store().len(), 2);

        // Empty list removes only that source's validators
        control.set_validators_with(Vec::new(), EventOptions::new().source(directive));
        let errs = control.errors().unwrap();
        assert!(!errs.contains_key("maxLength"));
    }

    #[test]
    fn test_errors_event_precedes_value_broadcast() {
        let control = FormControl::with_options(
            ControlOptions::new().value("ok").validator(validators::required()),
        );
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let weak = control.downgrade();
        let _sub = control.on_changes(move |event| {
            let valid = weak.upgrade().unwrap().valid();
            seen_clone.borrow_mut().push((event.kind(), valid));
        });

        control.set_value("");
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, crate::event::EventKind::Errors);
        // By the time the value event is observed, validity is settled
        assert_eq!(seen[1], (crate::event::EventKind::Value, false));
    }

    #[test]
    fn test_pending() {
        let control = FormControl::new(1);
        let other = ControlId::new();

        control.mark_pending(true);
        control.mark_pending_with(true, EventOptions::new().source(other));
        assert!(control.pending());
        assert_eq!(control.status(), ControlStatus::Pending);

        control.mark_pending(false);
        assert!(control.pending());

        control.mark_pending_with(false, EventOptions::new().source(other));
        assert!(!control.pending());
        assert_eq!(control.status(), ControlStatus::Valid);

        let store: PendingStore = [(other, true)].into_iter().collect();
        control.set_pending_store(store);
        assert!(control.pending());
    }

    #[test]
    fn test_disabled_status() {
        let control = FormControl::with_options(
            ControlOptions::new().value("").validator(validators::required()),
        );
        control.mark_disabled(true);
        assert_eq!(control.status(), ControlStatus::Disabled);
        assert!(control.disabled());
        assert!(!control.enabled());
    }

    #[test]
    fn test_no_emit_hidden_from_emitted_changes() {
        let control = FormControl::new(1);
        let all = Rc::new(Cell::new(0));
        let emitted = Rc::new(Cell::new(0));
        let values = Rc::new(Cell::new(0));

        let all_clone = all.clone();
        let _a = control.on_changes(move |_| all_clone.set(all_clone.get() + 1));
        let emitted_clone = emitted.clone();
        let _b = control.on_emitted_changes(move |_| emitted_clone.set(emitted_clone.get() + 1));
        let values_clone = values.clone();
        let _c = control.on_value(move |_| values_clone.set(values_clone.get() + 1));

        control.set_value_with(json!(2), EventOptions::new().no_emit());
        assert_eq!(control.value(), json!(2));
        assert_eq!(all.get(), 1);
        assert_eq!(emitted.get(), 0);
        assert_eq!(values.get(), 0);
    }

    #[test]
    fn test_focus_stream() {
        let control = FormControl::new(1);
        let focused = Rc::new(RefCell::new(Vec::new()));
        let focused_clone = focused.clone();
        let _sub = control.on_focus(move |focus| focused_clone.borrow_mut().push(focus));

        control.focus();
        control.blur();
        assert_eq!(*focused.borrow(), vec![true, false]);
    }

    #[test]
    fn test_on_status() {
        let control = FormControl::with_options(
            ControlOptions::new().value("x").validator(validators::required()),
        );
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let statuses_clone = statuses.clone();
        let _sub = control.on_status(move |status| statuses_clone.borrow_mut().push(status));

        control.set_value("");
        control.set_value("");
        control.mark_disabled(true);
        assert_eq!(
            *statuses.borrow(),
            vec![ControlStatus::Invalid, ControlStatus::Disabled]
        );
    }

    #[test]
    fn test_source_override() {
        let control = FormControl::new(1);
        let directive = ControlId::new();
        let sources = Rc::new(RefCell::new(Vec::new()));
        let sources_clone = sources.clone();
        let _sub = control.on_changes(move |event| sources_clone.borrow_mut().push(event.source()));

        control.mark_touched_with(true, EventOptions::new().source(directive));
        control.mark_changed(true);
        assert_eq!(*sources.borrow(), vec![directive, control.id()]);
    }

    #[test]
    fn test_custom_events_are_republished() {
        let control = FormControl::new(1);
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let kinds_clone = kinds.clone();
        let _sub = control.on_changes(move |event| {
            kinds_clone
                .borrow_mut()
                .push(event.change().type_name().to_string())
        });

        let before = control.snapshot();
        control.emit_event(
            StateChange::Custom {
                kind: "about_to_restructure".to_string(),
                value: json!({"reason": "test"}),
            },
            EventOptions::new(),
        );
        assert_eq!(*kinds.borrow(), vec!["about_to_restructure".to_string()]);
        assert_eq!(control.snapshot(), before);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let control = FormControl::with_options(
            ControlOptions::new()
                .value("start")
                .touched(true)
                .validator(validators::min_length(3)),
        );
        control.set_value("zz");
        control.mark_touched(false);
        control.mark_changed(true);
        control.set_errors_with(Some(errors(json!({"server": "down"}))), EventOptions::new().source(ControlId::new()));
        assert!(control.invalid());

        control.reset();
        assert_eq!(control.value(), json!("start"));
        assert!(control.touched());
        assert!(!control.changed());
        assert!(control.valid());
        assert_eq!(control.validator_store().len(), 1);
    }

    #[test]
    fn test_reset_events_are_fresh() {
        let control = FormControl::new("a");
        let processed = Rc::new(RefCell::new(Vec::new()));
        let processed_clone = processed.clone();
        let _sub = control.on_changes(move |event| processed_clone.borrow_mut().push(event.processed()));

        control.reset();
        assert!(!processed.borrow().is_empty());
        for list in processed.borrow().iter() {
            assert_eq!(list, &vec![control.id()]);
        }
    }

    #[test]
    fn test_replay_into_self_is_idempotent() {
        let control = FormControl::with_options(
            ControlOptions::new().value("v").validator(validators::min_length(5)),
        );
        control.mark_touched(true);
        control.mark_pending(true);
        control.set_errors_with(Some(errors(json!({"remote": 1}))), EventOptions::new().source(ControlId::new()));

        let before = control.snapshot();
        let store_before = control.errors_store();
        for event in control.replay_state() {
            assert!(event.processed().is_empty());
            control.push(event);
        }
        assert_eq!(control.snapshot(), before);
        assert_eq!(control.errors_store(), store_before);
    }

    #[test]
    fn test_state_signal_tracks_snapshot() {
        let control = FormControl::new(1);
        let sig = control.state_signal();
        assert_eq!(sig.get().value, json!(1));

        control.set_value(2);
        control.mark_readonly(true);
        let snapshot = sig.get();
        assert_eq!(snapshot.value, json!(2));
        assert!(snapshot.readonly());
    }

    #[test]
    fn test_data_payload() {
        let control = FormControl::with_options(ControlOptions::new().data(json!({"label": "Name"})));
        assert_eq!(control.data()["label"], json!("Name"));
        control.set_data("other");
        assert_eq!(control.data(), json!("other"));
    }

    #[test]
    fn test_id_override() {
        let id = ControlId::new();
        let control = FormControl::with_options(ControlOptions::new().id(id));
        assert_eq!(control.id(), id);
    }

    #[test]
    fn test_leaf_is_not_a_container() {
        let control = FormControl::new(1);
        assert!(matches!(
            control.set_controls(ControlsStore::new()),
            Err(ControlError::NotAContainer { .. })
        ));
        assert!(control.controls().is_empty());
    }
}
