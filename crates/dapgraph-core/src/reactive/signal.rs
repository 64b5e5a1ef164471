//! Plain settable signals.

use super::runtime::{self, Observer, Observers, ReactiveId, Source};
use super::subscription::{Subscription, WatcherList};
use crate::GraphError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// A single reactive value cell.
///
/// `Signal` is a cheap handle; clones share the same cell. Reads made while
/// a [`Derived`](super::Derived) is evaluating register the signal as a
/// dependency of that derived value.
pub struct Signal<T> {
    inner: Rc<SignalCell<T>>,
}

struct SignalCell<T> {
    id: ReactiveId,
    value: RefCell<T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    watchers: WatcherList<T>,
    observers: Observers,
    notify_pending: Cell<bool>,
    disposed: Cell<bool>,
}

impl<T: PartialEq + Clone + 'static> Signal<T> {
    /// Create a signal compared with `PartialEq`.
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, |a, b| a == b)
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Create a signal with a custom equality used to suppress no-op writes.
    pub fn with_equality(initial: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            inner: Rc::new(SignalCell {
                id: runtime::next_id(),
                value: RefCell::new(initial),
                equals: Box::new(equals),
                watchers: WatcherList::default(),
                observers: Observers::default(),
                notify_pending: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Current value; tracked.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value; tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&*self.inner.value.borrow())
    }

    /// Current value without registering a dependency.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Replace the value.
    ///
    /// Writes equal to the current value are ignored. Otherwise dependents
    /// are refreshed and watchers run, synchronously, before this returns
    /// (or at the end of the enclosing [`batch`](super::batch)).
    ///
    /// Returns [`GraphError::StaleDispose`] once the signal is disposed.
    pub fn set(&self, value: T) -> Result<(), GraphError> {
        let cell = &self.inner;
        if cell.disposed.get() {
            tracing::debug!(target: "dapgraph_core::reactive", id = cell.id, "set on disposed signal");
            return Err(GraphError::StaleDispose);
        }
        let unchanged = {
            let current = cell.value.borrow();
            (cell.equals)(&*current, &value)
        };
        if unchanged {
            return Ok(());
        }
        cell.value.replace(value);
        runtime::batch(|| SignalCell::propagate(cell));
        Ok(())
    }

    /// Run `f` with the new value after every change.
    ///
    /// Watchers run in subscription order. A panicking watcher is logged
    /// and does not stop the others. On a disposed signal the returned
    /// subscription is inert.
    pub fn watch(&self, f: impl Fn(&T) + 'static) -> Subscription {
        if self.inner.disposed.get() {
            return Subscription::inert();
        }
        let id = self.inner.watchers.add(Rc::new(f));
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(cell) = weak.upgrade() {
                cell.watchers.remove(id);
            }
        })
    }

    /// Drop every watcher and dependent. Idempotent.
    ///
    /// Reads keep returning the last value; `set` is rejected.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.watchers.clear();
        self.inner.observers.clear();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Whether a derived value or watcher still depends on this signal.
    pub(crate) fn is_observed(&self) -> bool {
        !self.inner.observers.is_empty() || !self.inner.watchers.is_empty()
    }

    fn track(&self) {
        runtime::track(|| Rc::clone(&self.inner) as Rc<dyn Source>);
    }
}

impl<T: Clone + 'static> SignalCell<T> {
    fn propagate(cell: &Rc<Self>) {
        cell.observers.mark_stale();
        if cell.watchers.is_empty() || cell.notify_pending.replace(true) {
            return;
        }
        let weak: Weak<Self> = Rc::downgrade(cell);
        runtime::defer(move || {
            let Some(cell) = weak.upgrade() else {
                return;
            };
            cell.notify_pending.set(false);
            if cell.disposed.get() {
                return;
            }
            let value = cell.value.borrow().clone();
            cell.watchers.notify(&value, "signal watcher");
        });
    }
}

impl<T: 'static> Source for SignalCell<T> {
    fn id(&self) -> ReactiveId {
        self.id
    }

    fn height(&self) -> u32 {
        0
    }

    fn add_observer(&self, id: ReactiveId, observer: Weak<dyn Observer>) {
        if !self.disposed.get() {
            self.observers.add(id, observer);
        }
    }

    fn remove_observer(&self, id: ReactiveId) {
        self.observers.remove(id);
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::batch;

    #[test]
    fn set_notifies_watchers_in_order() {
        let signal = Signal::new(1);
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        let _a = signal.watch(move |v| first.borrow_mut().push(("a", *v)));
        let second = Rc::clone(&log);
        let _b = signal.watch(move |v| second.borrow_mut().push(("b", *v)));

        signal.set(2).expect("set");
        assert_eq!(*log.borrow(), vec![("a", 2), ("b", 2)]);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let signal = Signal::new("running".to_string());
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = signal.watch(move |_| counter.set(counter.get() + 1));

        signal.set("running".to_string()).expect("set");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn custom_equality_suppresses_writes() {
        let signal = Signal::with_equality(10i64, |a, b| a / 10 == b / 10);
        signal.set(15).expect("set");
        assert_eq!(signal.peek(), 10);
        signal.set(21).expect("set");
        assert_eq!(signal.peek(), 21);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let sub = signal.watch(move |_| counter.set(counter.get() + 1));

        signal.set(1).expect("set");
        sub.unsubscribe();
        signal.set(2).expect("set");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn panicking_watcher_is_isolated() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));

        let _bad = signal.watch(|v| {
            if *v == 1 {
                std::panic::panic_any("watcher failure");
            }
        });
        let counter = Rc::clone(&calls);
        let _good = signal.watch(move |_| counter.set(counter.get() + 1));

        signal.set(1).expect("set");
        signal.set(2).expect("set");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn watcher_may_unsubscribe_a_later_watcher() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let killer = Rc::clone(&slot);
        let _first = signal.watch(move |_| {
            if let Some(sub) = killer.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        let counter = Rc::clone(&calls);
        *slot.borrow_mut() = Some(signal.watch(move |_| counter.set(counter.get() + 1)));

        signal.set(1).expect("set");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_rejects_writes() {
        let signal = Signal::new(1);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _sub = signal.watch(move |_| counter.set(counter.get() + 1));

        signal.dispose();
        signal.dispose();

        assert!(signal.is_disposed());
        assert_eq!(signal.set(2), Err(GraphError::StaleDispose));
        assert_eq!(signal.get(), 1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn batched_writes_notify_once_with_final_value() {
        let signal = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = signal.watch(move |v| sink.borrow_mut().push(*v));

        batch(|| {
            signal.set(1).expect("set");
            signal.set(2).expect("set");
            assert!(seen.borrow().is_empty());
        });
        assert_eq!(*seen.borrow(), vec![2]);
    }
}
