//! Materialized state of one control node.

use super::stores::{ErrorsStore, PendingStore, ValidatorStore, any_pending, merge_errors};
use crate::container::Aggregate;
use crate::types::{
    ControlFlags, ControlId, ControlSnapshot, ControlStatus, ValidationErrors, Value,
};

/// What `reset()` restores.
#[derive(Debug, Clone)]
pub(crate) struct Defaults {
    pub value: Value,
    pub flags: ControlFlags,
    pub pending_store: PendingStore,
    pub validator_store: ValidatorStore,
}

#[derive(Debug)]
pub(crate) struct ControlState {
    pub value: Value,
    pub enabled_value: Value,
    /// The control's own flags, as set by its own events.
    pub flags: ControlFlags,
    pub errors_store: ErrorsStore,
    pub pending_store: PendingStore,
    pub validator_store: ValidatorStore,
    /// Cached merge of `errors_store`.
    pub errors: Option<ValidationErrors>,
    pub aggregate: Aggregate,
    pub defaults: Defaults,
}

impl ControlState {
    pub fn new(
        value: Value,
        flags: ControlFlags,
        pending_store: PendingStore,
        validator_store: ValidatorStore,
    ) -> Self {
        Self {
            enabled_value: value.clone(),
            defaults: Defaults {
                value: value.clone(),
                flags,
                pending_store: pending_store.clone(),
                validator_store: validator_store.clone(),
            },
            value,
            flags,
            errors_store: ErrorsStore::new(),
            pending_store,
            validator_store,
            errors: None,
            aggregate: Aggregate::default(),
        }
    }

    pub fn refresh_errors(&mut self) {
        self.errors = merge_errors(&self.errors_store);
    }

    /// Own flags plus the flags every enabled child shares.
    pub fn effective_flags(&self) -> ControlFlags {
        self.flags | self.aggregate.all
    }

    pub fn invalid(&self) -> bool {
        self.errors.is_some() || self.aggregate.invalid
    }

    pub fn pending(&self) -> bool {
        any_pending(&self.pending_store) || self.aggregate.pending
    }

    pub fn status(&self) -> ControlStatus {
        if self.effective_flags().contains(ControlFlags::DISABLED) {
            ControlStatus::Disabled
        } else if self.pending() {
            ControlStatus::Pending
        } else if self.invalid() {
            ControlStatus::Invalid
        } else {
            ControlStatus::Valid
        }
    }

    pub fn snapshot(&self, id: ControlId) -> ControlSnapshot {
        ControlSnapshot {
            id: Some(id),
            value: self.value.clone(),
            enabled_value: self.enabled_value.clone(),
            errors: self.errors.clone(),
            status: self.status(),
            flags: self.effective_flags(),
            child_flags: self.aggregate.any,
            pending: self.pending(),
        }
    }
}
