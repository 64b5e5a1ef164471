//! # Async Tasks
//!
//! Long-running work (fetching variable children, adapter round-trips) runs
//! as `!Send` futures on a [`tokio::task::LocalSet`], on the same thread as
//! every store mutation. The store may change while a task is suspended,
//! so a task re-validates its target before writing:
//!
//! - [`Liveness`] names one incarnation of an entity (URI + creation serial).
//! - [`spawn_guarded`] applies a result only if that incarnation is live.
//! - [`KeyedMutex`] serializes multi-step decisions on the same key.

use crate::reactive::batch;
use crate::store::{Entity, Store, StoreInner};
use crate::{EntitySpec, GraphError, Uri};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

// =============================================================================
// LIVENESS
// =============================================================================

/// Stale-write guard for one incarnation of an entity.
#[derive(Clone)]
pub struct Liveness {
    store: Weak<StoreInner>,
    uri: Uri,
    seq: u64,
}

impl Liveness {
    pub(crate) fn new(store: Weak<StoreInner>, uri: Uri, seq: u64) -> Self {
        Self { store, uri, seq }
    }

    /// URI of the guarded entity.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The entity, if this exact incarnation is still in the store.
    pub fn entity(&self) -> Option<Entity> {
        let store = self.store.upgrade()?;
        store
            .lookup(self.uri.as_str())
            .filter(|entity| entity.seq() == self.seq && entity.is_live())
    }

    /// Whether this exact incarnation is still in the store.
    pub fn is_live(&self) -> bool {
        self.entity().is_some()
    }
}

impl fmt::Debug for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Liveness")
            .field("uri", &self.uri)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Run `work` on the current `LocalSet`, then `apply` its result if the
/// entity is still live.
///
/// The join handle yields `true` when the result was applied. Must be
/// called from within a `LocalSet`.
pub fn spawn_guarded<T, F>(
    entity: &Entity,
    work: F,
    apply: impl FnOnce(Entity, T) + 'static,
) -> JoinHandle<bool>
where
    T: 'static,
    F: Future<Output = T> + 'static,
{
    let liveness = entity.liveness();
    tokio::task::spawn_local(async move {
        let result = work.await;
        match liveness.entity() {
            Some(entity) => {
                apply(entity, result);
                true
            }
            None => {
                tracing::debug!(target: "dapgraph_core::task", uri = %liveness.uri(), "entity gone before task finished; result dropped");
                false
            }
        }
    })
}

/// Fetch the children of `parent` and link them with `edge` (child -> parent).
///
/// The fetch is the await point. Afterwards the parent is re-validated;
/// if it is gone nothing is written and an empty list is returned.
/// Children already in the store are updated in place, so a repeated
/// fetch refreshes values instead of failing on duplicate URIs.
pub async fn load_children<F, Fut>(
    store: &Store,
    parent: &Entity,
    edge: &str,
    fetch: F,
) -> Result<Vec<Entity>, GraphError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Vec<EntitySpec>>,
{
    let liveness = parent.liveness();
    let specs = fetch().await;
    let Some(parent) = liveness.entity() else {
        tracing::debug!(target: "dapgraph_core::task", uri = %liveness.uri(), "parent gone before children arrived");
        return Ok(Vec::new());
    };

    batch(|| {
        let mut children = Vec::with_capacity(specs.len());
        for spec in specs {
            let child = match store.get(spec.uri.as_str()) {
                Some(existing) => {
                    store.update(spec.uri.as_str(), spec.props)?;
                    existing
                }
                None => store.add(spec)?,
            };
            store.add_edge(edge, child.uri().as_str(), parent.uri().as_str());
            children.push(child);
        }
        Ok(children)
    })
}

// =============================================================================
// KEYED MUTEX
// =============================================================================

/// One table entry: the mutex plus how many holders and waiters use it.
struct LockEntry {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

type LockTable = RefCell<BTreeMap<String, LockEntry>>;

/// Async mutex per string key (e.g. a source path).
///
/// Entries are reclaimed when the last holder releases and nobody waits,
/// including waiters whose `lock` future was dropped before acquiring.
#[derive(Clone, Default)]
pub struct KeyedMutex {
    locks: Rc<LockTable>,
}

/// A holder's or waiter's share of one entry; released on drop.
struct Claim {
    key: String,
    locks: Weak<LockTable>,
}

impl Claim {
    fn new(locks: &Rc<LockTable>, key: &str) -> (Self, Arc<Mutex<()>>) {
        let mut table = locks.borrow_mut();
        let entry = table.entry(key.to_string()).or_insert_with(|| LockEntry {
            mutex: Arc::default(),
            users: 0,
        });
        entry.users = entry.users.saturating_add(1);
        let mutex = Arc::clone(&entry.mutex);
        let claim = Self {
            key: key.to_string(),
            locks: Rc::downgrade(locks),
        };
        (claim, mutex)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let Some(locks) = self.locks.upgrade() else {
            return;
        };
        let mut table = locks.borrow_mut();
        let vacant = table.get_mut(&self.key).is_some_and(|entry| {
            entry.users = entry.users.saturating_sub(1);
            entry.users == 0
        });
        if vacant {
            table.remove(&self.key);
        }
    }
}

/// Held lock for one key; released on drop.
pub struct KeyGuard {
    // Dropped before `claim`, so the entry is released unlocked.
    _held: OwnedMutexGuard<()>,
    claim: Claim,
}

impl KeyedMutex {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Dropping the returned future before it completes gives up the
    /// place in line.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let (claim, mutex) = Claim::new(&self.locks, key);
        let held = mutex.lock_owned().await;
        KeyGuard { _held: held, claim }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.locks.borrow().len()
    }
}

impl KeyGuard {
    /// The locked key.
    pub fn key(&self) -> &str {
        &self.claim.key
    }
}

impl fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.claim.key).finish()
    }
}

impl fmt::Debug for KeyedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedMutex")
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
