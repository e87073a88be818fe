//! Link Module - Two-way mirroring between controls
//!
//! A link subscribes each control to the other's events and pushes them
//! across, optionally through a transform. Loops end by themselves: a
//! forwarded event is the same event object (or a [`ControlEvent::map_change`]
//! derivative sharing its `processed` list), so when it comes back to the
//! control it started from, that control drops it.
//!
//! Linked containers also mirror edits made directly on their children: a
//! child envelope is unwrapped and its event pushed into the other
//! container's child with the same key.
//!
//! Links hold weak references; linking never keeps a control alive.
//!
//! ```ignore
//! let text = FormControl::new("3");
//! let (number, _link) = derived_control(
//!     &text,
//!     |v| v.as_str().and_then(|s| s.parse::<i64>().ok()).map(Value::from),
//!     |v| v.as_i64().map(|n| Value::from(n.to_string())),
//! );
//! number.set_value(4);
//! assert_eq!(text.value(), json!("4"));
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::control::{AbstractControl, FormControl, WeakControl};
use crate::event::{ChildEvent, ControlEvent, EventKind, StateChange, Subscription};
use crate::types::Value;

/// Rewrites an event on its way across a link. `None` drops it.
pub type Transform = Rc<dyn Fn(&ControlEvent) -> Option<ControlEvent>>;

/// Which side's current state is copied to the other when linking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Seed {
    #[default]
    FromA,
    FromB,
    None,
}

#[derive(Clone, Default)]
pub struct LinkOptions {
    pub a_to_b: Option<Transform>,
    pub b_to_a: Option<Transform>,
    pub seed: Seed,
}

impl LinkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn a_to_b(mut self, transform: Transform) -> Self {
        self.a_to_b = Some(transform);
        self
    }

    pub fn b_to_a(mut self, transform: Transform) -> Self {
        self.b_to_a = Some(transform);
        self
    }

    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }
}

impl fmt::Debug for LinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkOptions")
            .field("a_to_b", &self.a_to_b.is_some())
            .field("b_to_a", &self.b_to_a.is_some())
            .field("seed", &self.seed)
            .finish()
    }
}

/// A live link. Dropping it keeps the link; call [`Link::unlink`].
#[must_use = "dropping a Link keeps it active; call unlink() to remove it"]
pub struct Link {
    subscriptions: Vec<Subscription>,
}

impl Link {
    pub fn unlink(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

// =============================================================================
// LINKING
// =============================================================================

/// Link two controls, seeding `b` from `a`.
pub fn link(a: &AbstractControl, b: &AbstractControl) -> Link {
    link_with(a, b, LinkOptions::default())
}

pub fn link_with(a: &AbstractControl, b: &AbstractControl, options: LinkOptions) -> Link {
    debug!(a = %a.id(), b = %b.id(), seed = ?options.seed, "linking controls");

    let subscriptions = vec![
        a.on_changes(forwarder(b.downgrade(), options.a_to_b.clone())),
        b.on_changes(forwarder(a.downgrade(), options.b_to_a.clone())),
    ];

    match options.seed {
        Seed::FromA => seed(a, b, options.a_to_b.as_ref()),
        Seed::FromB => seed(b, a, options.b_to_a.as_ref()),
        Seed::None => {}
    }

    Link { subscriptions }
}

/// Create a control that mirrors `source` through a value converter.
///
/// `to` maps source values to derived values and `from` maps back; either
/// returning `None` drops that update. Validators are not mirrored.
pub fn derived_control<T, F>(source: &AbstractControl, to: T, from: F) -> (FormControl, Link)
where
    T: Fn(&Value) -> Option<Value> + 'static,
    F: Fn(&Value) -> Option<Value> + 'static,
{
    let derived = FormControl::new(to(&source.value()).unwrap_or(Value::Null));
    let excluded = [EventKind::Validators, EventKind::ValidatorStore];
    let options = LinkOptions::new()
        .a_to_b(chain(exclude_kinds(&excluded), map_values(to)))
        .b_to_a(chain(exclude_kinds(&excluded), map_values(from)));
    let link = link_with(source, &derived, options);
    (derived, link)
}

fn forwarder(target: WeakControl, transform: Option<Transform>) -> impl Fn(&ControlEvent) + 'static {
    move |event: &ControlEvent| {
        let Some(target) = target.upgrade() else {
            return;
        };
        if event.is_processed_by(target.id()) {
            return;
        }
        let Some(event) = apply(transform.as_ref(), event) else {
            trace!(control = %target.id(), event = event.change().type_name(), "link transform dropped event");
            return;
        };
        if let StateChange::Child(child) = event.change() {
            forward_child(&target, child);
            return;
        }
        target.push(event);
    }
}

/// Deliver a child edit to the target's child under the same key path.
fn forward_child(target: &AbstractControl, child: &ChildEvent) {
    let Some(target) = target.child(&child.key) else {
        trace!(control = %target.id(), key = %child.key, "linked container has no matching child");
        return;
    };
    match child.event.change() {
        StateChange::Child(inner) => forward_child(&target, inner),
        _ if child.event.is_processed_by(target.id()) => {}
        _ => target.push(child.event.clone()),
    }
}

fn seed(origin: &AbstractControl, target: &AbstractControl, transform: Option<&Transform>) {
    for event in origin.replay_state() {
        event.mark_processed(origin.id());
        if let Some(event) = apply(transform, &event) {
            target.push(event);
        }
    }
}

fn apply(transform: Option<&Transform>, event: &ControlEvent) -> Option<ControlEvent> {
    match transform {
        Some(transform) => transform(event),
        None => Some(event.clone()),
    }
}

// =============================================================================
// TRANSFORMS
// =============================================================================

/// Wrap a closure as a [`Transform`].
pub fn transform<F>(f: F) -> Transform
where
    F: Fn(&ControlEvent) -> Option<ControlEvent> + 'static,
{
    Rc::new(f)
}

/// Rewrite `Value` payloads; other events pass through untouched.
pub fn map_values<F>(f: F) -> Transform
where
    F: Fn(&Value) -> Option<Value> + 'static,
{
    Rc::new(move |event: &ControlEvent| match event.change() {
        StateChange::Value(value) => f(value).map(|value| event.map_change(StateChange::Value(value))),
        _ => Some(event.clone()),
    })
}

/// Drop events of the given kinds.
pub fn exclude_kinds(kinds: &[EventKind]) -> Transform {
    let kinds = kinds.to_vec();
    Rc::new(move |event: &ControlEvent| {
        if kinds.contains(&event.kind()) {
            None
        } else {
            Some(event.clone())
        }
    })
}

/// Run `first`, then `second` on its output.
pub fn chain(first: Transform, second: Transform) -> Transform {
    Rc::new(move |event: &ControlEvent| first(event).and_then(|event| second(&event)))
}

// =============================================================================
// TESTS
// =============================================================================
