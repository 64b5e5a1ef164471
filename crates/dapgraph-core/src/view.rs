//! # View
//!
//! A live, windowed query over the store.
//!
//! A view keeps the full ordered match list in memory, updated from store
//! events one entity at a time; the window is a slice of it. After every
//! change the old and new windows are diffed: entities that left fire
//! `Leave`, entities that arrived fire `Enter`, and one `Change` fires at
//! the end of the surrounding batch.
//!
//! Ordering: the sort key (ascending or descending), ties broken by entity
//! creation order. Views without a sort key list entities in creation
//! order.

use crate::primitives::DEFAULT_VIEW_LIMIT;
use crate::reactive::{Signal, Subscription, WatcherList, batch, defer, untracked};
use crate::store::{Entity, PropertyChange, Store};
use crate::{GraphError, Value};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

// =============================================================================
// QUERY DESCRIPTOR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `field op value`, compared with the total order on [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub op: PredicateOp,
    pub value: Value,
}

impl Predicate {
    fn holds(&self, entity: &Entity) -> bool {
        let actual = entity.peek(&self.field);
        let ord = actual.cmp(&self.value);
        match self.op {
            PredicateOp::Eq => ord == Ordering::Equal,
            PredicateOp::Ne => ord != Ordering::Equal,
            PredicateOp::Lt => ord == Ordering::Less,
            PredicateOp::Le => ord != Ordering::Greater,
            PredicateOp::Gt => ord == Ordering::Greater,
            PredicateOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// What a view selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewQuery {
    /// Entities filed under `key` in a secondary index.
    Index { index: String, key: Value },
    /// Entities of `kind` satisfying every predicate.
    Filter {
        kind: String,
        predicates: Vec<Predicate>,
        sort: Option<SortKey>,
    },
}

impl ViewQuery {
    /// Exact index lookup.
    pub fn index(index: impl Into<String>, key: impl Into<Value>) -> Self {
        Self::Index {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Every entity of a type.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self::Filter {
            kind: kind.into(),
            predicates: Vec::new(),
            sort: None,
        }
    }

    /// Add a predicate (AND-combined). No effect on index queries.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, op: PredicateOp, value: impl Into<Value>) -> Self {
        if let Self::Filter { predicates, .. } = &mut self {
            predicates.push(Predicate {
                field: field.into(),
                op,
                value: value.into(),
            });
        }
        self
    }

    /// Set the sort key. No effect on index queries.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        if let Self::Filter { sort, .. } = &mut self {
            *sort = Some(SortKey {
                field: field.into(),
                descending,
            });
        }
        self
    }
}

/// Window position and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_VIEW_LIMIT,
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEventKind {
    Enter,
    Leave,
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// An entity moved into the window.
    Enter(Entity),
    /// An entity moved out of the window.
    Leave(Entity),
    /// The window contents or order changed; once per batch.
    Change,
}

impl ViewEvent {
    pub fn kind(&self) -> ViewEventKind {
        match self {
            Self::Enter(_) => ViewEventKind::Enter,
            Self::Leave(_) => ViewEventKind::Leave,
            Self::Change => ViewEventKind::Change,
        }
    }
}

// =============================================================================
// VIEW
// =============================================================================

#[derive(Debug, Clone)]
struct Row {
    key: Value,
    entity: Entity,
}

/// A live windowed query; see the module docs.
///
/// Views are owned by their creator and stay subscribed to the store until
/// [`dispose`](Self::dispose) is called or the last handle is dropped.
#[derive(Clone)]
pub struct View {
    inner: Rc<ViewInner>,
}

struct ViewInner {
    this: Weak<ViewInner>,
    store: Store,
    query: ViewQuery,
    /// Entity type the query draws from.
    kind: String,
    matches: RefCell<Vec<Row>>,
    offset: Cell<usize>,
    limit: Cell<usize>,
    window: RefCell<Rc<[Entity]>>,
    /// Bumped when the window or total changes; makes reads reactive.
    version: Signal<u64>,
    events: WatcherList<ViewEvent>,
    change_pending: Cell<bool>,
    subscriptions: RefCell<Vec<Subscription>>,
    disposed: Cell<bool>,
}

impl View {
    /// Create a view and subscribe it to the store.
    ///
    /// Fails with [`GraphError::UnknownIndex`] when an index query names an
    /// index the store does not define (yet).
    pub fn new(store: &Store, query: ViewQuery, window: Window) -> Result<Self, GraphError> {
        let kind = match &query {
            ViewQuery::Filter { kind, .. } => kind.clone(),
            ViewQuery::Index { index, .. } => store.index_kind(index).ok_or_else(|| {
                tracing::debug!(target: "dapgraph_core::view", index = %index, "view over unknown index rejected");
                GraphError::UnknownIndex(index.clone())
            })?,
        };

        let inner = Rc::new_cyclic(|this| ViewInner {
            this: this.clone(),
            store: store.clone(),
            query,
            kind,
            matches: RefCell::new(Vec::new()),
            offset: Cell::new(window.offset),
            limit: Cell::new(window.limit),
            window: RefCell::new(Rc::from(Vec::new())),
            version: Signal::new(0),
            events: WatcherList::default(),
            change_pending: Cell::new(false),
            subscriptions: RefCell::new(Vec::new()),
            disposed: Cell::new(false),
        });

        untracked(|| inner.populate());
        inner.publish_window();
        Self::subscribe(&inner);
        Ok(Self { inner })
    }

    fn subscribe(inner: &Rc<ViewInner>) {
        let kind = inner.kind.clone();
        let store = &inner.store;

        let weak = Rc::downgrade(inner);
        let added = store.on_added(&kind, move |entity| {
            with_view(&weak, |view| view.entity_changed(entity));
        });
        let weak = Rc::downgrade(inner);
        let removed = store.on_removed(&kind, move |entity| {
            with_view(&weak, |view| view.entity_removed(entity));
        });
        let weak = Rc::downgrade(inner);
        let updated = store.on_updated(&kind, move |change: &PropertyChange| {
            with_view(&weak, |view| view.entity_changed(&change.entity));
        });
        inner
            .subscriptions
            .borrow_mut()
            .extend([added, removed, updated]);
    }

    /// The current window; tracked.
    pub fn items(&self) -> Vec<Entity> {
        self.inner.version.get();
        self.inner.window.borrow().to_vec()
    }

    /// Iterate over the current window.
    ///
    /// Each call starts a fresh pass over a snapshot of the window; later
    /// store mutations do not affect an iterator already created.
    pub fn iter(&self) -> ViewIter {
        self.inner.version.get();
        ViewIter {
            items: Rc::clone(&self.inner.window.borrow()),
            pos: 0,
        }
    }

    /// Number of entities matching the query, ignoring the window; tracked.
    pub fn visible_total(&self) -> usize {
        self.inner.version.get();
        self.inner.matches.borrow().len()
    }

    /// Move the window to `offset`.
    pub fn scroll(&self, offset: usize) -> Result<(), GraphError> {
        if self.inner.disposed.get() {
            return Err(GraphError::StaleDispose);
        }
        self.inner.offset.set(offset);
        batch(|| self.inner.settle());
        Ok(())
    }

    /// Resize the window.
    pub fn set_limit(&self, limit: usize) -> Result<(), GraphError> {
        if self.inner.disposed.get() {
            return Err(GraphError::StaleDispose);
        }
        self.inner.limit.set(limit);
        batch(|| self.inner.settle());
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.inner.offset.get()
    }

    pub fn limit(&self) -> usize {
        self.inner.limit.get()
    }

    pub fn query(&self) -> &ViewQuery {
        &self.inner.query
    }

    /// Run `f` for every event of `kind`.
    pub fn on(&self, kind: ViewEventKind, f: impl Fn(&ViewEvent) + 'static) -> Subscription {
        if self.inner.disposed.get() {
            return Subscription::inert();
        }
        let id = self.inner.events.add(Rc::new(move |event: &ViewEvent| {
            if event.kind() == kind {
                f(event);
            }
        }));
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.events.remove(id);
            }
        })
    }

    /// Unsubscribe from the store and drop every listener. Idempotent.
    ///
    /// The last window stays readable.
    pub fn dispose(&self) {
        self.inner.shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

fn with_view(weak: &Weak<ViewInner>, f: impl FnOnce(&ViewInner)) {
    if let Some(inner) = weak.upgrade()
        && !inner.disposed.get()
    {
        f(&inner);
    }
}

impl ViewInner {
    fn populate(&self) {
        let candidates = match &self.query {
            ViewQuery::Index { index, key } => self.store.iter(index, key),
            ViewQuery::Filter { kind, .. } => self.store.entities_of(kind),
        };
        let mut rows: Vec<Row> = candidates
            .into_iter()
            .filter(|entity| self.admits(entity))
            .map(|entity| Row {
                key: self.sort_key(&entity),
                entity,
            })
            .collect();
        rows.sort_by(|a, b| self.compare(a, b));
        self.matches.replace(rows);
    }

    fn admits(&self, entity: &Entity) -> bool {
        match &self.query {
            ViewQuery::Index { index, key } => {
                self.store.index_key(index, entity.uri()).as_ref() == Some(key)
            }
            ViewQuery::Filter { predicates, .. } => predicates.iter().all(|p| p.holds(entity)),
        }
    }

    fn sort_key(&self, entity: &Entity) -> Value {
        match &self.query {
            ViewQuery::Filter {
                sort: Some(sort), ..
            } => entity.peek(&sort.field),
            _ => Value::Nil,
        }
    }

    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let descending = matches!(
            &self.query,
            ViewQuery::Filter { sort: Some(SortKey { descending: true, .. }), .. }
        );
        let by_key = if descending {
            b.key.cmp(&a.key)
        } else {
            a.key.cmp(&b.key)
        };
        by_key.then_with(|| a.entity.seq().cmp(&b.entity.seq()))
    }

    /// Entity added or updated: re-evaluate membership and position.
    fn entity_changed(&self, entity: &Entity) {
        let admitted = untracked(|| self.admits(entity));
        {
            let mut matches = self.matches.borrow_mut();
            if let Some(pos) = matches.iter().position(|row| row.entity == *entity) {
                matches.remove(pos);
            }
            if admitted {
                let row = Row {
                    key: self.sort_key(entity),
                    entity: entity.clone(),
                };
                let at = matches.partition_point(|existing| self.compare(existing, &row) == Ordering::Less);
                matches.insert(at, row);
            }
        }
        self.settle();
    }

    fn entity_removed(&self, entity: &Entity) {
        let removed = {
            let mut matches = self.matches.borrow_mut();
            matches
                .iter()
                .position(|row| row.entity == *entity)
                .map(|pos| matches.remove(pos))
        };
        if removed.is_some() {
            self.settle();
        }
    }

    fn current_slice(&self) -> Rc<[Entity]> {
        let matches = self.matches.borrow();
        let start = self.offset.get().min(matches.len());
        let end = start.saturating_add(self.limit.get()).min(matches.len());
        matches[start..end]
            .iter()
            .map(|row| row.entity.clone())
            .collect()
    }

    fn publish_window(&self) {
        let next = self.current_slice();
        self.window.replace(next);
    }

    /// Recompute the window and fire events for the difference.
    fn settle(&self) {
        let next = self.current_slice();
        let previous = self.window.replace(Rc::clone(&next));
        self.bump();
        if previous[..] == next[..] {
            return;
        }
        for gone in previous.iter().filter(|e| !next.contains(e)) {
            self.events.notify(&ViewEvent::Leave(gone.clone()), "view leave");
        }
        for arrived in next.iter().filter(|e| !previous.contains(e)) {
            self.events.notify(&ViewEvent::Enter(arrived.clone()), "view enter");
        }
        self.schedule_change();
    }

    fn bump(&self) {
        if self.version.set(self.version.peek().wrapping_add(1)).is_err() {
            tracing::warn!(target: "dapgraph_core::view", "view version signal disposed");
        }
    }

    fn schedule_change(&self) {
        if self.change_pending.replace(true) {
            return;
        }
        let this = self.this.clone();
        defer(move || {
            let Some(inner) = this.upgrade() else {
                return;
            };
            inner.change_pending.set(false);
            if !inner.disposed.get() {
                inner.events.notify(&ViewEvent::Change, "view change");
            }
        });
    }

    fn shutdown(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for subscription in self.subscriptions.borrow_mut().drain(..) {
            subscription.unsubscribe();
        }
        self.events.clear();
        tracing::trace!(target: "dapgraph_core::view", "view disposed");
    }
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("query", &self.inner.query)
            .field("offset", &self.inner.offset.get())
            .field("limit", &self.inner.limit.get())
            .field("total", &self.inner.matches.borrow().len())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Restartable iterator over a window snapshot.
#[derive(Debug, Clone)]
pub struct ViewIter {
    items: Rc<[Entity]>,
    pos: usize,
}

impl Iterator for ViewIter {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let item = self.items.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.items.len().saturating_sub(self.pos);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ViewIter {}

impl<'a> IntoIterator for &'a View {
    type Item = Entity;
    type IntoIter = ViewIter;

    fn into_iter(self) -> ViewIter {
        self.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
