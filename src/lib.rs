//! # spark-controls
//!
//! Event-sourced reactive state for form controls and control trees.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals): every
//! control mirrors its state into a signal, so UI code can derive from it.
//!
//! ## Architecture
//!
//! A control never mutates in place. Every change is a [`ControlEvent`]
//! pushed through the control's pipeline, applied, and re-broadcast to
//! listeners. Containers subscribe to their children, links subscribe two
//! controls to each other, and an event's shared `processed` list makes every
//! cycle in that graph settle after one pass:
//!
//! ```text
//! mutator → ControlEvent → apply → validate → state signal → listeners
//!                                                  ├→ parent container (childEvent)
//!                                                  └→ linked control (same event)
//! ```
//!
//! Validation errors, pending flags and validators are stored per source, so
//! several contributors (the control, a directive, an async validator) can
//! each own their entry without clobbering the others.
//!
//! ## Modules
//!
//! - [`types`] - Identity, keys, status, flags, snapshots
//! - [`event`] - Events, options, subscriptions
//! - [`control`] - The control state machine and leaf controls
//! - [`container`] - Groups and arrays
//! - [`link`] - Two-way linking and derived controls
//! - [`observe`] - Signal projections and change callbacks
//! - [`accessor`] - Selector-based binding resolution

pub mod accessor;
pub mod container;
pub mod control;
pub mod error;
pub mod event;
pub mod link;
pub mod observe;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{ControlError, Result};

pub use event::{
    ChildEvent, ControlEvent, EventKind, EventMeta, EventOptions, StateChange, Subscription,
};

pub use control::{
    validators, AbstractControl, AsyncValidation, ControlConfig, ControlOptions, ErrorsStore,
    FormControl, PendingStore, SourceStore, ValidationTask, Validator, ValidatorStore,
    WeakControl, VALIDATION_END, VALIDATION_START,
};

pub use container::{ControlsStore, FormArray, FormGroup};

pub use link::{
    chain, derived_control, exclude_kinds, link, link_with, map_values, transform, Link,
    LinkOptions, Seed, Transform,
};

pub use observe::{observe, observe_distinct, watch};

pub use accessor::{AccessorRegistry, ControlAccessor, Specificity};
