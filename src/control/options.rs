//! Construction options.
//!
//! [`ControlConfig`] is the plain-data part and deserializes from JSON/TOML.
//! [`ControlOptions`] adds what cannot be data: validators and identity.
//!
//! ```ignore
//! let options = ControlOptions::new()
//!     .value("start")
//!     .touched(true)
//!     .validator(validators::required());
//! let control = FormControl::with_options(options);
//! ```

use serde::{Deserialize, Serialize};

use super::stores::ValidatorStore;
use super::validators::Validator;
use crate::types::{ControlFlags, ControlId, Value};

/// Serializable initial state of a control.
///
/// `value` is ignored by containers, whose value comes from their children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub value: Value,
    /// Opaque user payload.
    pub data: Value,
    pub disabled: bool,
    pub readonly: bool,
    pub touched: bool,
    pub changed: bool,
    pub submitted: bool,
    pub pending: bool,
}

impl ControlConfig {
    pub(crate) fn flags(&self) -> ControlFlags {
        let mut flags = ControlFlags::empty();
        flags.set(ControlFlags::DISABLED, self.disabled);
        flags.set(ControlFlags::READONLY, self.readonly);
        flags.set(ControlFlags::TOUCHED, self.touched);
        flags.set(ControlFlags::CHANGED, self.changed);
        flags.set(ControlFlags::SUBMITTED, self.submitted);
        flags
    }
}

/// Builder for a control's initial state.
#[derive(Debug, Clone, Default)]
pub struct ControlOptions {
    pub(crate) config: ControlConfig,
    pub(crate) validators: Vec<Validator>,
    pub(crate) validator_store: Option<ValidatorStore>,
    pub(crate) id: Option<ControlId>,
}

impl ControlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ControlConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Initial value, also used as the reset default.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.config.value = value.into();
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.config.data = data.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.config.disabled = disabled;
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.config.readonly = readonly;
        self
    }

    pub fn touched(mut self, touched: bool) -> Self {
        self.config.touched = touched;
        self
    }

    pub fn changed(mut self, changed: bool) -> Self {
        self.config.changed = changed;
        self
    }

    pub fn submitted(mut self, submitted: bool) -> Self {
        self.config.submitted = submitted;
        self
    }

    pub fn pending(mut self, pending: bool) -> Self {
        self.config.pending = pending;
        self
    }

    /// Add one validator. Validators are stored under the control's own id.
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn validators(mut self, validators: impl IntoIterator<Item = Validator>) -> Self {
        self.validators.extend(validators);
        self
    }

    /// Start from a pre-built per-source validator store.
    pub fn validator_store(mut self, store: ValidatorStore) -> Self {
        self.validator_store = Some(store);
        self
    }

    /// Override the generated identity.
    pub fn id(mut self, id: ControlId) -> Self {
        self.id = Some(id);
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
