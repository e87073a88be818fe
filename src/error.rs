//! Error types.
//!
//! Only programmer errors live here: shape mismatches, bad structural keys and
//! accessor resolution failures. Validation failures are ordinary data carried
//! by a control's `errors`, never an `Err`.

use crate::types::{ControlId, ControlKey};

/// Errors returned by control operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("value shape mismatch on control {control}: {reason}")]
    ShapeMismatch { control: ControlId, reason: String },

    #[error("control {control} has no child `{key}`")]
    MissingControl { control: ControlId, key: ControlKey },

    #[error("control {control} already has a child `{key}`")]
    DuplicateControl { control: ControlId, key: ControlKey },

    #[error("index {index} out of range for array control of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("control {control} is not a container")]
    NotAContainer { control: ControlId },

    #[error("accessor selector `{selector}` is already registered")]
    DuplicateSelector { selector: String },

    #[error("accessor resolution is ambiguous between {selectors:?}")]
    AmbiguousAccessor { selectors: Vec<String> },

    #[error("no accessor matches")]
    NoAccessor,

    #[error("control value does not deserialize: {0}")]
    Deserialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;
