//! # Rollups
//!
//! Derived signals summarising the debug tree. Each one reads edges and
//! properties through tracked store accessors, so it recomputes when a
//! child is attached, detached, or changes state.

use crate::reactive::{Derived, derive};
use crate::schema::{edges, kinds};
use crate::store::{Entity, Store};
use crate::Uri;

/// Children of `parent` (by `parent` edge) whose type is `kind`; tracked.
fn children_of(store: &Store, parent: &Uri, kind: &str) -> Vec<Entity> {
    store
        .edges_to(parent.as_str(), edges::PARENT)
        .iter()
        .filter_map(|uri| store.get(uri.as_str()))
        .filter(|child| child.kind() == kind)
        .collect()
}

/// `true` while no child session hangs under `session`.
///
/// Adapters that spawn child sessions (multi-process debugging) turn their
/// root into a non-leaf; UI trees usually show only leaf sessions.
pub fn session_is_leaf(store: &Store, session: &Entity) -> Derived<bool> {
    let store = store.clone();
    let uri = session.uri().clone();
    derive(move || children_of(&store, &uri, kinds::SESSION).is_empty())
}

/// Number of threads of `session` whose `state` is `"stopped"`.
pub fn stopped_thread_count(store: &Store, session: &Entity) -> Derived<usize> {
    let store = store.clone();
    let uri = session.uri().clone();
    derive(move || {
        children_of(&store, &uri, kinds::THREAD)
            .iter()
            .filter(|thread| thread.get("state").matches_text("stopped"))
            .count()
    })
}

/// Number of stack frames currently loaded for `thread`.
pub fn frame_count(store: &Store, thread: &Entity) -> Derived<usize> {
    let store = store.clone();
    let uri = thread.uri().clone();
    derive(move || children_of(&store, &uri, kinds::FRAME).len())
}
