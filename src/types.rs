//! Core types for spark-controls.
//!
//! These types define the foundation that everything builds on.
//! They flow through the event pipeline and describe what a control looks like
//! from the outside.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dynamic control value. Groups hold objects, arrays hold arrays.
pub use serde_json::Value;

/// Validation errors keyed by error name. An empty map means "no errors".
pub type ValidationErrors = serde_json::Map<String, Value>;

// =============================================================================
// Identity
// =============================================================================

/// Opaque identity of a control.
///
/// Used to tag event provenance and to detect whether a control has already
/// processed an event. Ids are random tokens, so creating one touches no
/// shared state. Ordering is total but carries no meaning beyond identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlId(Uuid);

impl ControlId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing uuid (e.g. one restored by a collaborator).
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ControlId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Key of a child inside a container: a name for groups, a position for arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControlKey {
    Name(String),
    Index(usize),
}

impl ControlKey {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            ControlKey::Name(name) => Some(name),
            ControlKey::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            ControlKey::Name(_) => None,
            ControlKey::Index(index) => Some(*index),
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKey::Name(name) => f.write_str(name),
            ControlKey::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for ControlKey {
    fn from(name: &str) -> Self {
        ControlKey::Name(name.to_string())
    }
}

impl From<String> for ControlKey {
    fn from(name: String) -> Self {
        ControlKey::Name(name)
    }
}

impl From<usize> for ControlKey {
    fn from(index: usize) -> Self {
        ControlKey::Index(index)
    }
}

// =============================================================================
// Kind & Status
// =============================================================================

/// What sort of node a control is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Leaf control holding a single value.
    Control,
    /// Container keyed by name; value is an object.
    Group,
    /// Container keyed by position; value is an array.
    Array,
}

impl ControlKind {
    pub fn is_container(&self) -> bool {
        !matches!(self, ControlKind::Control)
    }
}

/// Overall status of a control.
///
/// Precedence: disabled, then pending, then invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlStatus {
    Disabled,
    Pending,
    #[default]
    Valid,
    Invalid,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlStatus::Disabled => "DISABLED",
            ControlStatus::Pending => "PENDING",
            ControlStatus::Valid => "VALID",
            ControlStatus::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Flags
// =============================================================================

bitflags::bitflags! {
    /// Boolean status flags of a control.
    ///
    /// Combine with bitwise OR: `ControlFlags::TOUCHED | ControlFlags::CHANGED`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ControlFlags: u8 {
        const DISABLED = 1 << 0;
        const TOUCHED = 1 << 1;
        const CHANGED = 1 << 2;
        const READONLY = 1 << 3;
        const SUBMITTED = 1 << 4;
    }
}

impl ControlFlags {
    /// Flags that containers aggregate over their enabled children.
    pub const CHILD_LEVEL: Self = Self::TOUCHED
        .union(Self::CHANGED)
        .union(Self::READONLY)
        .union(Self::SUBMITTED);

    /// Every individual flag, in replay order.
    pub const EACH: [Self; 5] = [
        Self::DISABLED,
        Self::TOUCHED,
        Self::CHANGED,
        Self::READONLY,
        Self::SUBMITTED,
    ];
}

// =============================================================================
// Snapshot
// =============================================================================

/// Materialized, fully-settled state of a control at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlSnapshot {
    pub id: Option<ControlId>,
    pub value: Value,
    /// Value with disabled children removed (equal to `value` for leaves).
    pub enabled_value: Value,
    /// Merged errors of this control's own error store.
    pub errors: Option<ValidationErrors>,
    pub status: ControlStatus,
    /// Effective flags (own flags, plus every-enabled-child flags for containers).
    pub flags: ControlFlags,
    /// Flags held by at least one enabled child (always empty for leaves).
    pub child_flags: ControlFlags,
    pub pending: bool,
}

impl ControlSnapshot {
    pub fn valid(&self) -> bool {
        !self.invalid()
    }

    pub fn invalid(&self) -> bool {
        self.status == ControlStatus::Invalid
    }

    pub fn disabled(&self) -> bool {
        self.flags.contains(ControlFlags::DISABLED)
    }

    pub fn touched(&self) -> bool {
        self.flags.contains(ControlFlags::TOUCHED)
    }

    pub fn changed(&self) -> bool {
        self.flags.contains(ControlFlags::CHANGED)
    }

    pub fn readonly(&self) -> bool {
        self.flags.contains(ControlFlags::READONLY)
    }

    pub fn submitted(&self) -> bool {
        self.flags.contains(ControlFlags::SUBMITTED)
    }
}

// =============================================================================
// TESTS
// =============================================================================
