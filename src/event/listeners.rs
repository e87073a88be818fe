//! Listener registry behind every control's change stream.
//!
//! Broadcast walks a snapshot of the registered handlers, so handlers may
//! subscribe or unsubscribe while an event is being delivered. A handler
//! removed mid-broadcast is not called for the rest of that broadcast.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::ControlEvent;

type Handler = Rc<dyn Fn(&ControlEvent)>;

struct Slot {
    id: usize,
    active: Rc<Cell<bool>>,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Slot>,
    next_id: usize,
}

/// Multicast channel of control events. Never completes.
#[derive(Clone, Default)]
pub(crate) struct Listeners {
    registry: Rc<RefCell<Registry>>,
}

impl Listeners {
    /// Register a handler. Returns its subscription.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ControlEvent) + 'static,
    {
        let active = Rc::new(Cell::new(true));
        let id = {
            let mut reg = self.registry.borrow_mut();
            let id = reg.next_id;
            reg.next_id += 1;
            reg.slots.push(Slot {
                id,
                active: active.clone(),
                handler: Rc::new(handler),
            });
            id
        };

        let registry: Weak<RefCell<Registry>> = Rc::downgrade(&self.registry);
        Subscription::new(move || {
            active.set(false);
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().slots.retain(|slot| slot.id != id);
            }
        })
    }

    /// Deliver an event to every active handler.
    pub fn emit(&self, event: &ControlEvent) {
        let slots: Vec<(Rc<Cell<bool>>, Handler)> = self
            .registry
            .borrow()
            .slots
            .iter()
            .map(|slot| (slot.active.clone(), slot.handler.clone()))
            .collect();

        for (active, handler) in slots {
            if active.get() {
                handler(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().slots.len()
    }
}

/// Handle to a registered listener.
///
/// Call [`Subscription::unsubscribe`] to remove the listener. Dropping the
/// handle without calling it leaves the listener registered.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe() to remove it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new<F: FnOnce() + 'static>(cancel: F) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Combine several subscriptions into one.
    pub fn merge(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        })
    }

    /// Remove the listener.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
