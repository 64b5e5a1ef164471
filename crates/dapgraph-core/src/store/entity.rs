//! Entities: URI-addressed nodes with an open map of property signals.

use super::StoreInner;
use crate::reactive::Signal;
use crate::task::Liveness;
use crate::{GraphError, Uri, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handle to an entity in a [`Store`](super::Store).
///
/// Clones share the same entity. A handle outlives removal: reads keep
/// returning the last values, writes fail with [`GraphError::StaleDispose`].
#[derive(Clone)]
pub struct Entity {
    pub(super) inner: Rc<EntityInner>,
}

pub(super) struct EntityInner {
    pub(super) uri: Uri,
    pub(super) kind: String,
    /// Creation serial; distinguishes incarnations of a reused URI.
    pub(super) seq: u64,
    props: RefCell<BTreeMap<String, Signal<Value>>>,
    /// Bumped when a property is defined, so reads of absent names retrack.
    shape: Signal<u64>,
    live: Cell<bool>,
    store: Weak<StoreInner>,
}

impl Entity {
    pub(super) fn new(uri: Uri, kind: String, seq: u64, store: Weak<StoreInner>) -> Self {
        Self {
            inner: Rc::new(EntityInner {
                uri,
                kind,
                seq,
                props: RefCell::new(BTreeMap::new()),
                shape: Signal::new(0),
                live: Cell::new(true),
                store,
            }),
        }
    }

    /// The entity URI.
    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    /// The entity type tag.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Creation serial within the owning store.
    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// Whether the entity is still in its store.
    pub fn is_live(&self) -> bool {
        self.inner.live.get()
    }

    /// Stale-write guard for async work on this entity.
    pub fn liveness(&self) -> Liveness {
        Liveness::new(self.inner.store.clone(), self.inner.uri.clone(), self.inner.seq)
    }

    /// Property value; tracked. Absent properties read as `Nil`.
    pub fn get(&self, name: &str) -> Value {
        let signal = self.inner.props.borrow().get(name).cloned();
        match signal {
            Some(signal) => signal.get(),
            None => {
                self.inner.shape.get();
                Value::Nil
            }
        }
    }

    /// Property value without registering a dependency.
    pub fn peek(&self, name: &str) -> Value {
        self.inner
            .props
            .borrow()
            .get(name)
            .map(Signal::peek)
            .unwrap_or_default()
    }

    /// The signal backing a property, if defined.
    pub fn signal(&self, name: &str) -> Option<Signal<Value>> {
        self.inner.props.borrow().get(name).cloned()
    }

    /// Names of every defined property, sorted.
    pub fn property_names(&self) -> Vec<String> {
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Current value of every property, sorted by name; untracked.
    pub fn properties(&self) -> Vec<(String, Value)> {
        self.inner
            .props
            .borrow()
            .iter()
            .map(|(name, signal)| (name.clone(), signal.peek()))
            .collect()
    }

    /// Set a property, defining it if needed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        if !self.is_live() {
            tracing::debug!(target: "dapgraph_core::store", uri = %self.inner.uri, property = name, "write to removed entity");
            return Err(GraphError::StaleDispose);
        }
        let value = value.into();
        match self.signal(name) {
            Some(signal) => signal.set(value),
            None => self.define(name, value).map(|_| ()),
        }
    }

    /// Attach a new named property signal at runtime.
    ///
    /// Returns the existing signal untouched when the name is already
    /// defined.
    pub fn define(&self, name: &str, initial: impl Into<Value>) -> Result<Signal<Value>, GraphError> {
        if !self.is_live() {
            return Err(GraphError::StaleDispose);
        }
        if let Some(existing) = self.signal(name) {
            return Ok(existing);
        }
        let signal = Signal::new(initial.into());
        let entity = Rc::downgrade(&self.inner);
        let property = name.to_string();
        // Lives as long as the signal; cleared when the entity is removed.
        let _hook = signal.watch(move |_| {
            let Some(inner) = entity.upgrade() else {
                return;
            };
            if let Some(store) = inner.store.upgrade() {
                store.property_changed(&Entity { inner }, &property);
            }
        });
        self.inner
            .props
            .borrow_mut()
            .insert(name.to_string(), signal.clone());
        let shape = &self.inner.shape;
        shape.set(shape.peek().wrapping_add(1))?;
        if let Some(store) = self.inner.store.upgrade() {
            store.property_changed(self, name);
        }
        Ok(signal)
    }

    /// Mark removed and dispose every property signal.
    pub(super) fn retire(&self) {
        self.inner.live.set(false);
        for signal in self.inner.props.borrow().values() {
            signal.dispose();
        }
        self.inner.shape.dispose();
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.inner.seq == other.inner.seq && self.inner.uri == other.inner.uri
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("uri", &self.inner.uri)
            .field("kind", &self.inner.kind)
            .field("live", &self.inner.live.get())
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.uri)
    }
}
