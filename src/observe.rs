//! Observe Module - Projections of control state
//!
//! Two ways to follow a slice of a control's state:
//!
//! - [`watch`] - a `spark_signals::Derived` over the control's state signal,
//!   for use inside effects and other deriveds
//! - [`observe`] / [`observe_distinct`] - explicit event-driven callbacks that
//!   fire when the projected value changes
//!
//! ```ignore
//! let touched = watch(&control, |s| s.touched());
//! let _stop = effect(move || println!("touched: {}", touched.get()));
//!
//! let _sub = observe_distinct(&control, |s| s.errors.clone(), |errors| {
//!     println!("errors now {:?}", errors);
//! });
//! ```

use std::cell::RefCell;

use spark_signals::{derived, Derived};

use crate::control::AbstractControl;
use crate::event::Subscription;
use crate::types::ControlSnapshot;

/// Reactive projection of a control's snapshot.
pub fn watch<T, F>(control: &AbstractControl, accessor: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&ControlSnapshot) -> T + 'static,
{
    let state = control.state_signal();
    derived(move || accessor(&state.get()))
}

/// Call `handler` whenever `changed(previous, next)` holds for the projection.
///
/// The projection is recomputed after every emitted event. The initial value
/// is recorded at subscription time and not reported.
pub fn observe<T, A, C, H>(control: &AbstractControl, accessor: A, changed: C, handler: H) -> Subscription
where
    T: Clone + 'static,
    A: Fn(&ControlSnapshot) -> T + 'static,
    C: Fn(&T, &T) -> bool + 'static,
    H: Fn(&T) + 'static,
{
    let last = RefCell::new(accessor(&control.snapshot()));
    let weak = control.downgrade();
    control.on_emitted_changes(move |_| {
        let Some(control) = weak.upgrade() else {
            return;
        };
        let next = accessor(&control.snapshot());
        let previous = last.replace(next.clone());
        if changed(&previous, &next) {
            handler(&next);
        }
    })
}

/// [`observe`] with `!=` as the change test.
pub fn observe_distinct<T, A, H>(control: &AbstractControl, accessor: A, handler: H) -> Subscription
where
    T: Clone + PartialEq + 'static,
    A: Fn(&ControlSnapshot) -> T + 'static,
    H: Fn(&T) + 'static,
{
    observe(control, accessor, |previous, next| previous != next, handler)
}
