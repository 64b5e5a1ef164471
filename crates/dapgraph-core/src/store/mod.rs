//! # Store
//!
//! Typed entities and typed directed edges between them.
//!
//! - Entities are addressed by [`Uri`] and carry an open map of property
//!   signals.
//! - Edges live in ordered forward `(from, type)` and reverse `(to, type)`
//!   lists.
//! - Named secondary indices map an extracted key to entities of one type.
//! - Lifecycle listeners fire synchronously, in subscription order, before
//!   the mutating call returns.
//!
//! Every mutation runs inside one reactive [`batch`], so derived signals
//! over store contents recompute once per mutation. Reads made during a
//! derived evaluation (`get`, `entities_of`, `edges_from`, `edges_to`,
//! `get_one`, `iter`) register dependencies on the part of the store they
//! looked at.

mod edges;
mod entity;
mod index;

pub use entity::Entity;

use crate::primitives::{ANY_KIND, CLOCK_SWEEP_THRESHOLD};
use crate::reactive::{Signal, Subscription, WatcherList, batch, is_tracking, untracked};
use crate::task::Liveness;
use crate::{Edge, EntitySpec, GraphError, Uri, Value};
use edges::EdgeIndex;
use index::{Extractor, SecondaryIndex};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// EVENTS
// =============================================================================

/// Payload of [`Store::on_updated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub entity: Entity,
    pub property: String,
}

/// Type tag used to route an event to per-type listeners.
trait EventKind {
    fn event_kind(&self) -> &str;
}

impl EventKind for Entity {
    fn event_kind(&self) -> &str {
        self.kind()
    }
}

impl EventKind for PropertyChange {
    fn event_kind(&self) -> &str {
        self.entity.kind()
    }
}

impl EventKind for Edge {
    fn event_kind(&self) -> &str {
        &self.kind
    }
}

fn listen<E: EventKind + 'static>(
    list: &Rc<WatcherList<E>>,
    kind: &str,
    callback: impl Fn(&E) + 'static,
) -> Subscription {
    let kind = kind.to_string();
    let id = list.add(Rc::new(move |event: &E| {
        if kind == ANY_KIND || event.event_kind() == kind {
            callback(event);
        }
    }));
    let weak = Rc::downgrade(list);
    Subscription::new(move || {
        if let Some(list) = weak.upgrade() {
            list.remove(id);
        }
    })
}

// =============================================================================
// STATE
// =============================================================================

/// Part of the store a tracked read depended on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ClockKey {
    Presence(Uri),
    Kind(String),
    EdgesFrom(Uri, String),
    EdgesTo(Uri, String),
    Index(String),
}

#[derive(Default)]
struct StoreState {
    entities: BTreeMap<Uri, Entity>,
    /// type -> (creation serial -> uri)
    by_kind: BTreeMap<String, BTreeMap<u64, Uri>>,
    edges: EdgeIndex,
    indices: BTreeMap<String, SecondaryIndex>,
    next_seq: u64,
}

pub(crate) struct StoreInner {
    state: RefCell<StoreState>,
    /// Change counters for tracked reads, created on first tracked read.
    clocks: RefCell<BTreeMap<ClockKey, Signal<u64>>>,
    /// Clock count at which the next removal sweeps unobserved clocks.
    sweep_at: Cell<usize>,
    added: Rc<WatcherList<Entity>>,
    removed: Rc<WatcherList<Entity>>,
    updated: Rc<WatcherList<PropertyChange>>,
    edge_added: Rc<WatcherList<Edge>>,
    edge_removed: Rc<WatcherList<Edge>>,
}

impl StoreInner {
    fn observe(&self, key: impl FnOnce() -> ClockKey) {
        if !is_tracking() {
            return;
        }
        let clock = self
            .clocks
            .borrow_mut()
            .entry(key())
            .or_insert_with(|| Signal::new(0))
            .clone();
        clock.get();
    }

    fn bump(&self, key: ClockKey) {
        let clock = self.clocks.borrow().get(&key).cloned();
        if let Some(clock) = clock
            && clock.set(clock.peek().wrapping_add(1)).is_err()
        {
            tracing::warn!(target: "dapgraph_core::store", ?key, "store clock was disposed");
        }
    }

    /// Drop the clocks keyed by a removed entity, after they were bumped.
    ///
    /// Readers already marked stale re-create what they still need on
    /// their next evaluation. Past the sweep threshold, every clock
    /// nothing depends on is dropped too.
    fn retire_clocks(&self, uri: &Uri) {
        let mut clocks = self.clocks.borrow_mut();
        clocks.remove(&ClockKey::Presence(uri.clone()));
        let outgoing = clocks
            .range(ClockKey::EdgesFrom(uri.clone(), String::new())..)
            .take_while(|(key, _)| matches!(key, ClockKey::EdgesFrom(from, _) if from == uri));
        let incoming = clocks
            .range(ClockKey::EdgesTo(uri.clone(), String::new())..)
            .take_while(|(key, _)| matches!(key, ClockKey::EdgesTo(to, _) if to == uri));
        let edge_keys: Vec<ClockKey> = outgoing
            .chain(incoming)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &edge_keys {
            clocks.remove(key);
        }

        if is_tracking() || clocks.len() < self.sweep_at.get() {
            return;
        }
        let before = clocks.len();
        clocks.retain(|_, clock| clock.is_observed());
        self.sweep_at
            .set(clocks.len().saturating_mul(2).max(CLOCK_SWEEP_THRESHOLD));
        tracing::trace!(target: "dapgraph_core::store", before, after = clocks.len(), "unobserved clocks swept");
    }

    /// Untracked lookup.
    pub(crate) fn lookup(&self, uri: &str) -> Option<Entity> {
        self.state.borrow().entities.get(uri).cloned()
    }

    fn extractors_for(&self, kind: &str) -> Vec<(String, Extractor)> {
        self.state
            .borrow()
            .indices
            .iter()
            .filter(|(_, index)| index.kind == kind)
            .map(|(name, index)| (name.clone(), Rc::clone(&index.extract)))
            .collect()
    }

    /// Re-run the key extractors for `entity`; returns the indices that moved.
    fn reindex(&self, entity: &Entity) -> Vec<String> {
        let extractors = self.extractors_for(entity.kind());
        if extractors.is_empty() {
            return Vec::new();
        }
        let keys: Vec<(String, Option<Value>)> = untracked(|| {
            extractors
                .iter()
                .map(|(name, extract)| (name.clone(), extract(entity)))
                .collect()
        });
        let mut state = self.state.borrow_mut();
        keys.into_iter()
            .filter_map(|(name, key)| {
                let index = state.indices.get_mut(&name)?;
                index.place(entity.uri(), entity.seq(), key).then_some(name)
            })
            .collect()
    }

    /// Called by property signal hooks after a value change.
    pub(super) fn property_changed(&self, entity: &Entity, property: &str) {
        let registered = self
            .state
            .borrow()
            .entities
            .get(entity.uri())
            .is_some_and(|current| current == entity);
        if !registered {
            return;
        }
        batch(|| {
            for name in self.reindex(entity) {
                self.bump(ClockKey::Index(name));
            }
            let change = PropertyChange {
                entity: entity.clone(),
                property: property.to_string(),
            };
            self.updated.notify(&change, "store on_updated");
        });
    }
}

// =============================================================================
// STORE
// =============================================================================

/// The entity graph.
///
/// `Store` is a cheap handle; clones share the same graph.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                state: RefCell::new(StoreState::default()),
                clocks: RefCell::new(BTreeMap::new()),
                sweep_at: Cell::new(CLOCK_SWEEP_THRESHOLD),
                added: Rc::default(),
                removed: Rc::default(),
                updated: Rc::default(),
                edge_added: Rc::default(),
                edge_removed: Rc::default(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Entities
    // -------------------------------------------------------------------------

    /// Create an entity.
    ///
    /// Fails with [`GraphError::UniqueViolation`] if the URI is live.
    pub fn add(&self, spec: EntitySpec) -> Result<Entity, GraphError> {
        batch(|| self.add_now(spec))
    }

    fn add_now(&self, spec: EntitySpec) -> Result<Entity, GraphError> {
        let EntitySpec { uri, kind, props } = spec;
        let seq = {
            let mut state = self.inner.state.borrow_mut();
            if state.entities.contains_key(&uri) {
                tracing::debug!(target: "dapgraph_core::store", %uri, "duplicate add rejected");
                return Err(GraphError::UniqueViolation(uri));
            }
            state.next_seq = state.next_seq.saturating_add(1);
            state.next_seq
        };

        let entity = Entity::new(uri.clone(), kind.clone(), seq, Rc::downgrade(&self.inner));
        for (name, value) in props {
            entity.define(&name, value)?;
        }
        {
            let mut state = self.inner.state.borrow_mut();
            state.entities.insert(uri.clone(), entity.clone());
            state
                .by_kind
                .entry(kind.clone())
                .or_default()
                .insert(seq, uri.clone());
        }
        let touched = self.inner.reindex(&entity);

        tracing::trace!(target: "dapgraph_core::store", %uri, kind = %kind, "entity added");
        self.inner.bump(ClockKey::Presence(uri));
        self.inner.bump(ClockKey::Kind(kind));
        for name in touched {
            self.inner.bump(ClockKey::Index(name));
        }
        self.inner.added.notify(&entity, "store on_added");
        Ok(entity)
    }

    /// Remove an entity and every edge touching it.
    ///
    /// Property signals are disposed, then `on_edge_removed` fires for each
    /// cascaded edge and `on_removed` for the entity. Returns `false` if the
    /// URI was not present.
    pub fn remove(&self, uri: &str) -> bool {
        batch(|| {
            let (entity, edges, touched) = {
                let mut state = self.inner.state.borrow_mut();
                let Some(entity) = state.entities.remove(uri) else {
                    return false;
                };
                if let Some(bucket) = state.by_kind.get_mut(entity.kind()) {
                    bucket.remove(&entity.seq());
                    if bucket.is_empty() {
                        state.by_kind.remove(entity.kind());
                    }
                }
                let edges = state.edges.detach(entity.uri());
                let touched: Vec<String> = state
                    .indices
                    .iter_mut()
                    .filter_map(|(name, index)| index.evict(entity.uri()).then(|| name.clone()))
                    .collect();
                (entity, edges, touched)
            };

            entity.retire();
            tracing::trace!(target: "dapgraph_core::store", uri, cascaded = edges.len(), "entity removed");
            for edge in &edges {
                self.inner
                    .bump(ClockKey::EdgesFrom(edge.from.clone(), edge.kind.clone()));
                self.inner
                    .bump(ClockKey::EdgesTo(edge.to.clone(), edge.kind.clone()));
                self.inner.edge_removed.notify(edge, "store on_edge_removed");
            }
            self.inner.bump(ClockKey::Presence(entity.uri().clone()));
            self.inner.bump(ClockKey::Kind(entity.kind().to_string()));
            for name in touched {
                self.inner.bump(ClockKey::Index(name));
            }
            self.inner.removed.notify(&entity, "store on_removed");
            self.inner.retire_clocks(entity.uri());
            true
        })
    }

    /// Set several properties atomically; unknown names are defined.
    ///
    /// Derived signals and watchers see all writes at once. Returns
    /// `Ok(false)` if the URI is not present.
    pub fn update<K, V>(
        &self,
        uri: &str,
        partial: impl IntoIterator<Item = (K, V)>,
    ) -> Result<bool, GraphError>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let Some(entity) = self.inner.lookup(uri) else {
            return Ok(false);
        };
        batch(|| {
            for (name, value) in partial {
                entity.set(name.as_ref(), value)?;
            }
            Ok(true)
        })
    }

    /// Entity by URI; tracked.
    pub fn get(&self, uri: &str) -> Option<Entity> {
        self.inner.observe(|| ClockKey::Presence(Uri::new(uri)));
        self.inner.lookup(uri)
    }

    /// Whether the URI is live; tracked.
    pub fn contains(&self, uri: &str) -> bool {
        self.get(uri).is_some()
    }

    /// Every entity of a type, in creation order; tracked.
    pub fn entities_of(&self, kind: &str) -> Vec<Entity> {
        self.inner.observe(|| ClockKey::Kind(kind.to_string()));
        let state = self.inner.state.borrow();
        state
            .by_kind
            .get(kind)
            .map(|bucket| {
                bucket
                    .values()
                    .filter_map(|uri| state.entities.get(uri).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every entity, ordered by URI; untracked.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.state.borrow().entities.values().cloned().collect()
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().entities.len()
    }

    /// Check if the store holds no entity.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity count per type, sorted by type.
    pub fn kind_counts(&self) -> Vec<(String, usize)> {
        self.inner
            .state
            .borrow()
            .by_kind
            .iter()
            .map(|(kind, bucket)| (kind.clone(), bucket.len()))
            .collect()
    }

    /// Stale-write guard for the entity currently at `uri`.
    pub fn token(&self, uri: &str) -> Option<Liveness> {
        self.inner.lookup(uri).map(|entity| entity.liveness())
    }

    // -------------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------------

    /// Append a directed edge.
    ///
    /// A missing endpoint or an already present edge is a no-op returning
    /// `false`.
    pub fn add_edge(&self, kind: &str, from: &str, to: &str) -> bool {
        self.link(Edge::new(kind, from, to), false)
    }

    /// Insert a directed edge at the front of both adjacency lists.
    pub fn prepend_edge(&self, kind: &str, from: &str, to: &str) -> bool {
        self.link(Edge::new(kind, from, to), true)
    }

    fn link(&self, edge: Edge, at_front: bool) -> bool {
        batch(|| {
            let inserted = {
                let mut state = self.inner.state.borrow_mut();
                if !state.entities.contains_key(&edge.from) || !state.entities.contains_key(&edge.to) {
                    tracing::debug!(target: "dapgraph_core::store", kind = %edge.kind, from = %edge.from, to = %edge.to, "edge endpoint missing");
                    return false;
                }
                state.edges.insert(&edge, at_front)
            };
            if !inserted {
                return false;
            }
            self.inner
                .bump(ClockKey::EdgesFrom(edge.from.clone(), edge.kind.clone()));
            self.inner
                .bump(ClockKey::EdgesTo(edge.to.clone(), edge.kind.clone()));
            self.inner.edge_added.notify(&edge, "store on_edge_added");
            true
        })
    }

    /// Remove a directed edge. Returns `false` if it was absent.
    pub fn remove_edge(&self, kind: &str, from: &str, to: &str) -> bool {
        let edge = Edge::new(kind, from, to);
        batch(|| {
            if !self.inner.state.borrow_mut().edges.remove(&edge) {
                return false;
            }
            self.inner
                .bump(ClockKey::EdgesFrom(edge.from.clone(), edge.kind.clone()));
            self.inner
                .bump(ClockKey::EdgesTo(edge.to.clone(), edge.kind.clone()));
            self.inner.edge_removed.notify(&edge, "store on_edge_removed");
            true
        })
    }

    /// Targets of `(uri, kind)` edges, in list order; tracked.
    pub fn edges_from(&self, uri: &str, kind: &str) -> Vec<Uri> {
        let uri = Uri::new(uri);
        self.inner
            .observe(|| ClockKey::EdgesFrom(uri.clone(), kind.to_string()));
        self.inner.state.borrow().edges.from(&uri, kind).to_vec()
    }

    /// Sources of `kind` edges pointing at `uri`, in list order; tracked.
    pub fn edges_to(&self, uri: &str, kind: &str) -> Vec<Uri> {
        let uri = Uri::new(uri);
        self.inner
            .observe(|| ClockKey::EdgesTo(uri.clone(), kind.to_string()));
        self.inner.state.borrow().edges.to(&uri, kind).to_vec()
    }

    /// Whether the edge is present; untracked.
    pub fn has_edge(&self, kind: &str, from: &str, to: &str) -> bool {
        self.inner
            .state
            .borrow()
            .edges
            .contains(&Edge::new(kind, from, to))
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.state.borrow().edges.len()
    }

    /// Every edge, grouped by target in `edges_to` order; untracked.
    pub fn edges(&self) -> Vec<Edge> {
        self.inner.state.borrow().edges.all()
    }

    // -------------------------------------------------------------------------
    // Secondary indices
    // -------------------------------------------------------------------------

    /// Define (or replace) a named index over entities of `kind`.
    ///
    /// The extractor runs untracked on add and after every property change.
    pub fn define_index(
        &self,
        name: &str,
        kind: &str,
        extract: impl Fn(&Entity) -> Option<Value> + 'static,
    ) {
        let extract: Extractor = Rc::new(extract);
        let existing = self.entities_untracked(kind);
        let mut index = SecondaryIndex::new(kind.to_string(), Rc::clone(&extract));
        untracked(|| {
            for entity in &existing {
                index.place(entity.uri(), entity.seq(), extract(entity));
            }
        });
        self.inner
            .state
            .borrow_mut()
            .indices
            .insert(name.to_string(), index);
        self.inner.bump(ClockKey::Index(name.to_string()));
    }

    /// Oldest entity filed under `key`; tracked.
    pub fn get_one(&self, index: &str, key: &Value) -> Option<Entity> {
        self.inner.observe(|| ClockKey::Index(index.to_string()));
        let state = self.inner.state.borrow();
        let Some(idx) = state.indices.get(index) else {
            tracing::debug!(target: "dapgraph_core::store", index, "unknown index");
            return None;
        };
        idx.first(key).and_then(|uri| state.entities.get(uri).cloned())
    }

    /// Every entity filed under `key`, in creation order; tracked.
    pub fn iter(&self, index: &str, key: &Value) -> Vec<Entity> {
        self.inner.observe(|| ClockKey::Index(index.to_string()));
        let state = self.inner.state.borrow();
        let Some(idx) = state.indices.get(index) else {
            tracing::debug!(target: "dapgraph_core::store", index, "unknown index");
            return Vec::new();
        };
        idx.all(key)
            .iter()
            .filter_map(|uri| state.entities.get(uri).cloned())
            .collect()
    }

    /// Entity type an index covers.
    pub(crate) fn index_kind(&self, index: &str) -> Option<String> {
        self.inner
            .state
            .borrow()
            .indices
            .get(index)
            .map(|idx| idx.kind.clone())
    }

    /// Key under which `uri` is currently filed.
    pub(crate) fn index_key(&self, index: &str, uri: &Uri) -> Option<Value> {
        self.inner
            .state
            .borrow()
            .indices
            .get(index)
            .and_then(|idx| idx.key_of(uri).cloned())
    }

    #[cfg(test)]
    pub(crate) fn clock_count(&self) -> usize {
        self.inner.clocks.borrow().len()
    }

    pub(crate) fn entities_untracked(&self, kind: &str) -> Vec<Entity> {
        untracked(|| self.entities_of(kind))
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Run `f` after an entity of `kind` (or [`ANY_KIND`]) is added.
    pub fn on_added(&self, kind: &str, f: impl Fn(&Entity) + 'static) -> Subscription {
        listen(&self.inner.added, kind, f)
    }

    /// Run `f` after an entity of `kind` is removed.
    pub fn on_removed(&self, kind: &str, f: impl Fn(&Entity) + 'static) -> Subscription {
        listen(&self.inner.removed, kind, f)
    }

    /// Run `f` after a property of an entity of `kind` changes.
    pub fn on_updated(&self, kind: &str, f: impl Fn(&PropertyChange) + 'static) -> Subscription {
        listen(&self.inner.updated, kind, f)
    }

    /// Run `f` after an edge of `kind` is added.
    pub fn on_edge_added(&self, kind: &str, f: impl Fn(&Edge) + 'static) -> Subscription {
        listen(&self.inner.edge_added, kind, f)
    }

    /// Run `f` after an edge of `kind` is removed, including cascades.
    pub fn on_edge_removed(&self, kind: &str, f: impl Fn(&Edge) + 'static) -> Subscription {
        listen(&self.inner.edge_removed, kind, f)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Store")
            .field("entities", &state.entities.len())
            .field("edges", &state.edges.len())
            .field("indices", &state.indices.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::derive;
    use std::cell::Cell;

    fn session(store: &Store, uri: &str, state: &str) -> Entity {
        store
            .add(EntitySpec::new(uri, "session").with("state", state))
            .expect("add session")
    }

    #[test]
    fn duplicate_uri_is_rejected() {
        let store = Store::new();
        session(&store, "session:1", "running");
        let err = store
            .add(EntitySpec::new("session:1", "session"))
            .expect_err("duplicate");
        assert_eq!(err, GraphError::UniqueViolation(Uri::new("session:1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn entities_of_keeps_creation_order() {
        let store = Store::new();
        session(&store, "session:b", "running");
        session(&store, "session:a", "running");

        let uris: Vec<String> = store
            .entities_of("session")
            .iter()
            .map(|e| e.uri().to_string())
            .collect();
        assert_eq!(uris, vec!["session:b", "session:a"]);
    }

    #[test]
    fn remove_cascades_edges_and_fires_in_order() {
        let store = Store::new();
        session(&store, "s1", "running");
        store.add(EntitySpec::new("t1", "thread")).expect("add");
        store.add(EntitySpec::new("t2", "thread")).expect("add");
        assert!(store.add_edge("parent", "t1", "s1"));
        assert!(store.add_edge("parent", "t2", "s1"));

        let log = Rc::new(RefCell::new(Vec::new()));
        let edges_log = Rc::clone(&log);
        let _a = store.on_edge_removed(ANY_KIND, move |edge| {
            edges_log.borrow_mut().push(format!("edge {}", edge.from));
        });
        let removed_log = Rc::clone(&log);
        let _b = store.on_removed("session", move |entity| {
            removed_log.borrow_mut().push(format!("removed {}", entity.uri()));
        });

        assert!(store.remove("s1"));
        assert_eq!(
            *log.borrow(),
            vec!["edge t1", "edge t2", "removed s1"]
        );
        assert!(store.edges_from("t1", "parent").is_empty());
        assert!(store.edges_to("s1", "parent").is_empty());
        assert_eq!(store.edge_count(), 0);
        assert!(!store.remove("s1"));
    }

    #[test]
    fn removed_handle_rejects_writes() {
        let store = Store::new();
        let s1 = session(&store, "s1", "running");
        store.remove("s1");

        assert!(!s1.is_live());
        assert_eq!(s1.set("state", "stopped"), Err(GraphError::StaleDispose));
        assert_eq!(s1.get("state"), Value::str("running"));
    }

    #[test]
    fn readded_uri_is_a_new_incarnation() {
        let store = Store::new();
        let first = session(&store, "s1", "running");
        store.remove("s1");
        let second = session(&store, "s1", "running");

        assert_ne!(first, second);
        assert!(!first.liveness().is_live());
        assert!(second.liveness().is_live());
    }

    #[test]
    fn edges_to_missing_endpoints_are_ignored() {
        let store = Store::new();
        session(&store, "s1", "running");
        assert!(!store.add_edge("parent", "t9", "s1"));
        assert!(!store.add_edge("parent", "s1", "s9"));
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn listeners_filter_by_kind() {
        let store = Store::new();
        let sessions = Rc::new(Cell::new(0));
        let any = Rc::new(Cell::new(0));
        let s = Rc::clone(&sessions);
        let _a = store.on_added("session", move |_| s.set(s.get() + 1));
        let a = Rc::clone(&any);
        let _b = store.on_added(ANY_KIND, move |_| a.set(a.get() + 1));

        session(&store, "s1", "running");
        store.add(EntitySpec::new("t1", "thread")).expect("add");
        assert_eq!(sessions.get(), 1);
        assert_eq!(any.get(), 2);
    }

    #[test]
    fn update_is_atomic_for_derived_values() {
        let store = Store::new();
        let thread = store
            .add(
                EntitySpec::new("t1", "thread")
                    .with("state", "running")
                    .with("reason", Value::Nil),
            )
            .expect("add");
        let t = thread.clone();
        let summary = derive(move || format!("{}/{}", t.get("state"), t.get("reason")));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = summary.watch(move |v| sink.borrow_mut().push(v.clone()));

        let found = store
            .update("t1", [("state", Value::str("stopped")), ("reason", Value::str("breakpoint"))])
            .expect("update");
        assert!(found);
        assert_eq!(*seen.borrow(), vec!["stopped/breakpoint".to_string()]);
        assert!(!store.update("t9", [("state", "x")]).expect("update"));
    }

    #[test]
    fn on_updated_reports_property_names() {
        let store = Store::new();
        session(&store, "s1", "running");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = store.on_updated("session", move |change| {
            sink.borrow_mut().push(change.property.clone());
        });

        store
            .update("s1", [("state", "stopped"), ("name", "main")])
            .expect("update");
        let mut names = seen.borrow().clone();
        names.sort();
        assert_eq!(names, vec!["name", "state"]);
    }

    #[test]
    fn secondary_index_follows_updates_and_removal() {
        let store = Store::new();
        store.define_index("source_by_path", "source", |e| {
            let path = e.peek("path");
            (!path.is_nil()).then_some(path)
        });
        store
            .add(EntitySpec::new("src:1", "source").with("path", "/a.py"))
            .expect("add");
        store
            .add(EntitySpec::new("src:2", "source").with("path", "/a.py"))
            .expect("add");

        let key = Value::str("/a.py");
        assert_eq!(
            store.get_one("source_by_path", &key).map(|e| e.uri().to_string()),
            Some("src:1".to_string())
        );
        assert_eq!(store.iter("source_by_path", &key).len(), 2);

        store.update("src:1", [("path", "/b.py")]).expect("update");
        assert_eq!(
            store.get_one("source_by_path", &key).map(|e| e.uri().to_string()),
            Some("src:2".to_string())
        );

        store.remove("src:2");
        assert!(store.get_one("source_by_path", &key).is_none());
        assert!(store.iter("missing_index", &key).is_empty());
    }

    #[test]
    fn edge_reads_are_tracked() {
        let store = Store::new();
        session(&store, "s1", "running");
        let s = store.clone();
        let threads = derive(move || s.edges_to("s1", "parent").len());
        assert_eq!(threads.get(), Ok(0));

        store.add(EntitySpec::new("t1", "thread")).expect("add");
        store.add_edge("parent", "t1", "s1");
        assert_eq!(threads.get(), Ok(1));

        store.remove("t1");
        assert_eq!(threads.get(), Ok(0));
    }

    #[test]
    fn presence_reads_are_tracked() {
        let store = Store::new();
        let s = store.clone();
        let present = derive(move || s.contains("s1"));
        assert_eq!(present.get(), Ok(false));

        session(&store, "s1", "running");
        assert_eq!(present.get(), Ok(true));
        store.remove("s1");
        assert_eq!(present.get(), Ok(false));
    }

    #[test]
    fn remove_edge_fires_and_reports_absence() {
        let store = Store::new();
        session(&store, "s1", "running");
        store.add(EntitySpec::new("t1", "thread")).expect("add");
        store.add_edge("parent", "t1", "s1");

        let fired = Rc::new(Cell::new(0));
        let f = Rc::clone(&fired);
        let _sub = store.on_edge_removed("parent", move |_| f.set(f.get() + 1));
        assert!(store.remove_edge("parent", "t1", "s1"));
        assert!(!store.remove_edge("parent", "t1", "s1"));
        assert_eq!(fired.get(), 1);
        assert!(!store.has_edge("parent", "t1", "s1"));
    }

    #[test]
    fn removal_releases_change_clocks() {
        let store = Store::new();
        session(&store, "s1", "running");
        for n in 0..1000 {
            let uri = format!("frame:{n}");
            store.add(EntitySpec::new(uri.as_str(), "frame")).expect("add");
            store.add_edge("parent", &uri, "s1");
            let (s, u) = (store.clone(), uri.clone());
            let seen = derive(move || (s.contains(&u), s.edges_from(&u, "parent").len()));
            assert_eq!(seen.get(), Ok((true, 1)));
            drop(seen);
            assert!(store.remove(&uri));
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.clock_count(), 0);
    }

    #[test]
    fn unobserved_clocks_are_swept_and_observed_ones_kept() {
        let store = Store::new();
        for n in 0..300 {
            let uri = format!("s{n}");
            session(&store, &uri, "running");
            let (s, u) = (store.clone(), uri.clone());
            let reader = derive(move || s.edges_to(&u, "parent").len());
            assert_eq!(reader.get(), Ok(0));
        }
        let s = store.clone();
        let kept = derive(move || s.edges_to("s0", "parent").len());
        assert_eq!(kept.get(), Ok(0));
        assert!(store.clock_count() >= 300);

        session(&store, "gone", "running");
        store.remove("gone");
        assert_eq!(store.clock_count(), 1);

        store.add(EntitySpec::new("t1", "thread")).expect("add");
        store.add_edge("parent", "t1", "s0");
        assert_eq!(kept.get(), Ok(1));
    }

    #[test]
    fn defining_a_property_is_visible_to_readers() {
        let store = Store::new();
        let s1 = session(&store, "s1", "running");
        let e = s1.clone();
        let label = derive(move || e.get("label"));
        assert_eq!(label.get(), Ok(Value::Nil));

        s1.define("label", "main").expect("define");
        assert_eq!(label.get(), Ok(Value::str("main")));
        assert_eq!(s1.property_names(), vec!["label", "state"]);
    }
}
