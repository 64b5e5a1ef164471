//! Subscription handles and the isolated watcher list shared by signals,
//! views and store listeners.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

/// Handle returned by every `watch`/`on_*` registration.
///
/// Dropping the handle does not remove the callback.
#[must_use = "dropping a Subscription leaves the callback registered; call `unsubscribe` to remove it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that was never registered (e.g. on a disposed signal).
    pub(crate) fn inert() -> Self {
        Self { cancel: None }
    }

    /// Remove the callback. Safe to call on inert subscriptions.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("registered", &self.cancel.is_some())
            .finish()
    }
}

/// Run a subscriber callback, containing any panic it raises.
fn isolate(context: &'static str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        tracing::error!(
            target: "dapgraph_core::reactive",
            context,
            message = %message,
            "subscriber panicked; remaining subscribers still notified"
        );
    }
}

/// Ordered callback list that tolerates removal during notification.
pub(crate) struct WatcherList<A: ?Sized> {
    next: Cell<u64>,
    entries: RefCell<Vec<(u64, Rc<dyn Fn(&A)>)>>,
}

impl<A: ?Sized> Default for WatcherList<A> {
    fn default() -> Self {
        Self {
            next: Cell::new(0),
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<A: ?Sized> WatcherList<A> {
    pub(crate) fn add(&self, callback: Rc<dyn Fn(&A)>) -> u64 {
        let id = self.next.get().saturating_add(1);
        self.next.set(id);
        self.entries.borrow_mut().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.entries.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn contains(&self, id: u64) -> bool {
        self.entries.borrow().iter().any(|(existing, _)| *existing == id)
    }

    /// Call every callback in subscription order.
    ///
    /// Iterates over a snapshot so callbacks may subscribe or unsubscribe;
    /// a callback removed by an earlier one is skipped.
    pub(crate) fn notify(&self, arg: &A, context: &'static str) {
        let snapshot: Vec<(u64, Rc<dyn Fn(&A)>)> = self
            .entries
            .borrow()
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect();
        for (id, callback) in snapshot {
            if self.contains(id) {
                isolate(context, || callback(arg));
            }
        }
    }
}
