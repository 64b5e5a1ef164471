//! Derived (rollup) signals.

use super::runtime::{self, Observer, Observers, ReactiveId, Source};
use super::subscription::{Subscription, WatcherList};
use crate::GraphError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// A memoized value computed from other signals.
///
/// Evaluation is lazy: the compute function first runs on the first
/// [`get`](Self::get) or [`watch`](Self::watch). Every signal read during
/// the most recent evaluation is a dependency; a change to any of them
/// re-evaluates the value once per batch, and watchers only run when the
/// result differs from the cached one.
pub struct Derived<T> {
    inner: Rc<DerivedCell<T>>,
}

struct DerivedCell<T> {
    id: ReactiveId,
    this: Weak<DerivedCell<T>>,
    compute: Box<dyn Fn() -> T>,
    equals: Box<dyn Fn(&T, &T) -> bool>,
    value: RefCell<Option<T>>,
    stale: Cell<bool>,
    evaluating: Cell<bool>,
    cyclic: Cell<bool>,
    height: Cell<u32>,
    sources: RefCell<Vec<Rc<dyn Source>>>,
    observers: Observers,
    watchers: WatcherList<T>,
    notify_pending: Cell<bool>,
    disposed: Cell<bool>,
}

/// Shorthand for [`Derived::new`].
pub fn derive<T: PartialEq + Clone + 'static>(compute: impl Fn() -> T + 'static) -> Derived<T> {
    Derived::new(compute)
}

impl<T: PartialEq + Clone + 'static> Derived<T> {
    /// Create a derived signal memoized with `PartialEq`.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self::with_equality(compute, |a, b| a == b)
    }
}

impl<T: Clone + 'static> Derived<T> {
    /// Create a derived signal with a custom memoization equality.
    pub fn with_equality(
        compute: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|this| DerivedCell {
            id: runtime::next_id(),
            this: this.clone(),
            compute: Box::new(compute),
            equals: Box::new(equals),
            value: RefCell::new(None),
            stale: Cell::new(true),
            evaluating: Cell::new(false),
            cyclic: Cell::new(false),
            height: Cell::new(1),
            sources: RefCell::new(Vec::new()),
            observers: Observers::default(),
            watchers: WatcherList::default(),
            notify_pending: Cell::new(false),
            disposed: Cell::new(false),
        });
        Self { inner }
    }

    /// Current value; tracked.
    ///
    /// Returns [`GraphError::Cycle`] when the value depends on itself, and
    /// [`GraphError::StaleDispose`] when disposed before ever being read.
    pub fn get(&self) -> Result<T, GraphError> {
        let cell = &self.inner;
        if cell.evaluating.get() {
            runtime::flag_cycle(cell.id);
            return Err(GraphError::Cycle);
        }
        if cell.disposed.get() {
            return cell.value.borrow().clone().ok_or(GraphError::StaleDispose);
        }
        runtime::track(|| Rc::clone(cell) as Rc<dyn Source>);
        if cell.stale.get() {
            cell.refresh_now();
        }
        if cell.cyclic.get() {
            return Err(GraphError::Cycle);
        }
        cell.value.borrow().clone().ok_or(GraphError::Cycle)
    }

    /// Run `f` with the new value after every change.
    ///
    /// Forces the first evaluation so dependencies are subscribed.
    pub fn watch(&self, f: impl Fn(&T) + 'static) -> Subscription {
        let cell = &self.inner;
        if cell.disposed.get() {
            return Subscription::inert();
        }
        if cell.stale.get() && !cell.evaluating.get() {
            runtime::untracked(|| cell.refresh_now());
        }
        let id = cell.watchers.add(Rc::new(f));
        let weak = Rc::downgrade(cell);
        Subscription::new(move || {
            if let Some(cell) = weak.upgrade() {
                cell.watchers.remove(id);
            }
        })
    }

    /// Unsubscribe from every dependency and drop watchers. Idempotent.
    pub fn dispose(&self) {
        let cell = &self.inner;
        if cell.disposed.replace(true) {
            return;
        }
        cell.watchers.clear();
        cell.observers.clear();
        cell.detach();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of signals read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }
}

impl<T: Clone + 'static> DerivedCell<T> {
    fn refresh_now(&self) {
        if self.disposed.get() || !self.stale.get() {
            return;
        }
        self.stale.set(false);
        self.evaluating.set(true);
        let evaluation = runtime::evaluate(self.id, || (self.compute)());
        self.evaluating.set(false);

        self.retrack(evaluation.sources);
        self.cyclic.set(evaluation.cyclic);
        if evaluation.cyclic {
            tracing::error!(target: "dapgraph_core::reactive", id = self.id, "derived signal depends on itself");
            return;
        }

        let next = evaluation.value;
        let (changed, first) = match &*self.value.borrow() {
            Some(previous) => (!(self.equals)(previous, &next), false),
            None => (true, true),
        };
        if !changed {
            return;
        }
        self.value.replace(Some(next));
        if first {
            return;
        }
        runtime::batch(|| {
            self.observers.mark_stale();
            self.schedule_watchers();
        });
    }

    fn schedule_watchers(&self) {
        if self.watchers.is_empty() || self.notify_pending.replace(true) {
            return;
        }
        let weak = self.this.clone();
        runtime::defer(move || {
            let Some(cell) = weak.upgrade() else {
                return;
            };
            cell.notify_pending.set(false);
            if cell.disposed.get() {
                return;
            }
            let value = cell.value.borrow().clone();
            if let Some(value) = value {
                cell.watchers.notify(&value, "derived watcher");
            }
        });
    }

    /// Replace the dependency set with the one from the latest evaluation.
    fn retrack(&self, next: Vec<Rc<dyn Source>>) {
        let previous = self.sources.replace(Vec::new());
        for source in &previous {
            if !next.iter().any(|s| s.id() == source.id()) {
                source.remove_observer(self.id);
            }
        }
        let observer: Weak<dyn Observer> = self.this.clone();
        for source in &next {
            if !previous.iter().any(|s| s.id() == source.id()) {
                source.add_observer(self.id, observer.clone());
            }
        }
        let height = next
            .iter()
            .map(|s| s.height())
            .max()
            .unwrap_or(0)
            .saturating_add(1);
        self.height.set(height);
        self.sources.replace(next);
    }

    fn detach(&self) {
        for source in self.sources.replace(Vec::new()) {
            source.remove_observer(self.id);
        }
    }
}

impl<T: Clone + 'static> Observer for DerivedCell<T> {
    fn id(&self) -> ReactiveId {
        self.id
    }

    fn height(&self) -> u32 {
        self.height.get()
    }

    fn mark_stale(&self) -> bool {
        if self.disposed.get() || self.stale.get() {
            return false;
        }
        self.stale.set(true);
        true
    }

    fn refresh(&self) {
        self.refresh_now();
    }
}

impl<T: Clone + 'static> Source for DerivedCell<T> {
    fn id(&self) -> ReactiveId {
        self.id
    }

    fn height(&self) -> u32 {
        self.height.get()
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

impl<T> Drop for DerivedCell<T> {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.remove_observer(self.id);
        }
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("stale", &self.inner.stale.get())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
