//! # Focus
//!
//! The entity "of current interest" per role (`session`, `thread`,
//! `frame`, ...), as one `Signal<Option<Uri>>` per role. Query anchors
//! (`@frame`) read these signals, so anything derived from an anchored
//! query follows focus changes.
//!
//! Scoped overrides (one per UI viewport, say) shadow the global focus for
//! anchors resolved in that scope. Once a scope focuses an entity it owns
//! that role and every deeper one: those read as the scope sets them, even
//! when cleared. Shallower roles the scope never set fall back to the
//! global signal.

use crate::primitives::ANY_KIND;
use crate::reactive::{Signal, Subscription, batch, untracked};
use crate::schema::Schema;
use crate::store::{Entity, Store};
use crate::Uri;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

type RoleSignals = BTreeMap<String, Signal<Option<Uri>>>;

/// Focus state of one scope.
#[derive(Clone)]
struct ScopeOverride {
    roles: RoleSignals,
    /// Shallowest role depth the scope owns; `None` until it focuses.
    owned_from: Signal<Option<usize>>,
}

impl ScopeOverride {
    fn claim(&self, depth: usize) {
        let from = self.owned_from.peek().map_or(depth, |from| from.min(depth));
        if self.owned_from.set(Some(from)).is_err() {
            tracing::warn!(target: "dapgraph_core::focus", "scope ownership disposed");
        }
    }

    fn owns(&self, depth: Option<usize>) -> bool {
        self.owned_from
            .get()
            .zip(depth)
            .is_some_and(|(from, depth)| depth >= from)
    }
}

/// Per-role focus with scoped overrides.
#[derive(Clone)]
pub struct Focus {
    inner: Rc<FocusInner>,
}

struct FocusInner {
    store: Store,
    schema: Rc<Schema>,
    global: RoleSignals,
    overrides: RefCell<BTreeMap<String, ScopeOverride>>,
    /// Bumped when a scope is first created.
    scopes: Signal<u64>,
    removal_hook: RefCell<Option<Subscription>>,
}

impl Focus {
    /// Create a focus over `store` with every role unset.
    ///
    /// Removing a focused entity clears every role pointing at it.
    pub fn new(store: Store, schema: Rc<Schema>) -> Self {
        let global = Self::role_signals(&schema);
        let inner = Rc::new(FocusInner {
            store,
            schema,
            global,
            overrides: RefCell::new(BTreeMap::new()),
            scopes: Signal::new(0),
            removal_hook: RefCell::new(None),
        });
        let weak: Weak<FocusInner> = Rc::downgrade(&inner);
        let hook = inner.store.on_removed(ANY_KIND, move |entity| {
            if let Some(inner) = weak.upgrade() {
                inner.forget(entity.uri());
            }
        });
        inner.removal_hook.replace(Some(hook));
        Self { inner }
    }

    fn role_signals(schema: &Schema) -> RoleSignals {
        schema
            .roles
            .iter()
            .map(|role| (role.clone(), Signal::new(None)))
            .collect()
    }

    /// Focus `uri` globally.
    ///
    /// The role comes from the entity type. Ancestor roles follow the
    /// entity's parent chain; deeper roles are cleared unless they still
    /// point at a descendant. Returns `false` (and changes nothing) if the
    /// entity is missing or its type is not a role.
    pub fn focus(&self, uri: &str) -> bool {
        self.apply(&self.inner.global, uri).is_some()
    }

    /// Focus `uri` in a scoped override only.
    ///
    /// The scope takes over the entity's role and every deeper role, so
    /// `@thread` in a scope focused on a session reads nothing rather than
    /// the globally focused thread of another session.
    pub fn focus_in(&self, scope: &str, uri: &str) -> bool {
        let scoped = self.scope_override(scope);
        batch(|| {
            let Some(depth) = self.apply(&scoped.roles, uri) else {
                return false;
            };
            scoped.claim(depth);
            true
        })
    }

    /// Returns the depth of the focused role, or `None` if nothing changed.
    fn apply(&self, signals: &RoleSignals, uri: &str) -> Option<usize> {
        let inner = &self.inner;
        let Some(entity) = untracked(|| inner.store.get(uri)) else {
            tracing::debug!(target: "dapgraph_core::focus", uri, "focus on missing entity ignored");
            return None;
        };
        let Some(role) = inner.schema.role_of(&entity) else {
            tracing::debug!(target: "dapgraph_core::focus", uri, kind = entity.kind(), "entity type is not a focus role");
            return None;
        };
        let depth = inner.schema.role_depth(role)?;
        let ancestors = untracked(|| inner.schema.ancestors(&inner.store, &entity));

        batch(|| {
            Self::write(signals, role, Some(entity.uri().clone()));
            for ancestor in &ancestors {
                if let Some(ancestor_role) = inner.schema.role_of(ancestor)
                    && inner.schema.role_depth(ancestor_role).is_some_and(|d| d < depth)
                {
                    Self::write(signals, ancestor_role, Some(ancestor.uri().clone()));
                }
            }
            for deeper in inner.schema.roles.iter().skip(depth.saturating_add(1)) {
                let Some(current) = signals.get(deeper).and_then(Signal::peek) else {
                    continue;
                };
                let keeps = untracked(|| {
                    inner.store.get(current.as_str()).is_some_and(|d| {
                        inner.schema.ancestors(&inner.store, &d).contains(&entity)
                    })
                });
                if !keeps {
                    Self::write(signals, deeper, None);
                }
            }
        });
        tracing::debug!(target: "dapgraph_core::focus", uri, role, "focused");
        Some(depth)
    }

    fn write(signals: &RoleSignals, role: &str, value: Option<Uri>) {
        if let Some(signal) = signals.get(role)
            && signal.set(value).is_err()
        {
            tracing::warn!(target: "dapgraph_core::focus", role, "focus signal disposed");
        }
    }

    fn scope_override(&self, scope: &str) -> ScopeOverride {
        let existing = self.inner.overrides.borrow().get(scope).cloned();
        if let Some(scoped) = existing {
            return scoped;
        }
        let scoped = ScopeOverride {
            roles: Self::role_signals(&self.inner.schema),
            owned_from: Signal::new(None),
        };
        self.inner
            .overrides
            .borrow_mut()
            .insert(scope.to_string(), scoped.clone());
        let scopes = &self.inner.scopes;
        if scopes.set(scopes.peek().wrapping_add(1)).is_err() {
            tracing::warn!(target: "dapgraph_core::focus", "scope counter disposed");
        }
        scoped
    }

    /// Clear one role globally.
    pub fn unfocus(&self, role: &str) {
        Self::write(&self.inner.global, role, None);
    }

    /// Drop every role of a scoped override; anchors in that scope fall
    /// back to the global focus.
    pub fn clear_override(&self, scope: &str) {
        let scoped = self.inner.overrides.borrow().get(scope).cloned();
        if let Some(scoped) = scoped {
            batch(|| {
                for role in scoped.roles.keys() {
                    Self::write(&scoped.roles, role, None);
                }
                if scoped.owned_from.set(None).is_err() {
                    tracing::warn!(target: "dapgraph_core::focus", scope, "scope ownership disposed");
                }
            });
        }
    }

    /// Globally focused URI for `role`; tracked.
    pub fn get(&self, role: &str) -> Option<Uri> {
        self.inner.global.get(role).and_then(Signal::get)
    }

    /// The global signal behind a role.
    pub fn signal(&self, role: &str) -> Option<Signal<Option<Uri>>> {
        self.inner.global.get(role).cloned()
    }

    /// Anchor view of the focus for `scope` (`None` = global).
    pub fn context(&self, scope: Option<&str>) -> FocusContext {
        FocusContext {
            focus: self.clone(),
            scope: scope.map(str::to_string),
        }
    }

    /// Every globally focused URI, outermost role first.
    pub fn focused(&self) -> Vec<Uri> {
        self.inner
            .schema
            .roles
            .iter()
            .filter_map(|role| self.inner.global.get(role).and_then(Signal::peek))
            .collect()
    }

    /// The schema roles are taken from.
    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }
}

impl FocusInner {
    fn forget(&self, uri: &Uri) {
        let overrides: Vec<RoleSignals> = self
            .overrides
            .borrow()
            .values()
            .map(|scoped| scoped.roles.clone())
            .collect();
        batch(|| {
            for signals in std::iter::once(&self.global).chain(overrides.iter()) {
                for (role, signal) in signals {
                    if signal.peek().as_ref() == Some(uri) {
                        tracing::debug!(target: "dapgraph_core::focus", %uri, role, "focused entity removed");
                        Focus::write(signals, role, None);
                    }
                }
            }
        });
    }
}

impl Drop for FocusInner {
    fn drop(&mut self) {
        if let Some(hook) = self.removal_hook.get_mut().take() {
            hook.unsubscribe();
        }
    }
}

impl fmt::Debug for Focus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Focus")
            .field("focused", &self.focused())
            .field("scopes", &self.inner.overrides.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Focus as seen from one scope.
#[derive(Clone, Debug)]
pub struct FocusContext {
    focus: Focus,
    scope: Option<String>,
}

impl FocusContext {
    /// Focused URI for `role`; tracked.
    ///
    /// In a scope, roles the scope owns read from the override alone;
    /// others fall back to the global focus.
    pub fn get(&self, role: &str) -> Option<Uri> {
        let inner = &self.focus.inner;
        if let Some(scope) = &self.scope {
            inner.scopes.get();
            let scoped = inner.overrides.borrow().get(scope).cloned();
            if let Some(scoped) = scoped {
                if let Some(uri) = scoped.roles.get(role).and_then(Signal::get) {
                    return Some(uri);
                }
                if scoped.owns(inner.schema.role_depth(role)) {
                    return None;
                }
            }
        }
        self.focus.get(role)
    }

    /// Focused entity for `role`, if still in the store; tracked.
    pub fn entity(&self, role: &str) -> Option<Entity> {
        let uri = self.get(role)?;
        self.focus.inner.store.get(uri.as_str())
    }

    /// The scope name (`None` = global).
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::derive;
    use crate::schema::{edges, kinds};
    use crate::EntitySpec;

    fn debug_tree() -> (Store, Focus) {
        let store = Store::new();
        for (uri, kind, parent) in [
            ("s1", kinds::SESSION, None),
            ("t1", kinds::THREAD, Some("s1")),
            ("t2", kinds::THREAD, Some("s1")),
            ("f1", kinds::FRAME, Some("t1")),
            ("f2", kinds::FRAME, Some("t2")),
            ("s2", kinds::SESSION, None),
        ] {
            store.add(EntitySpec::new(uri, kind)).expect("add");
            if let Some(parent) = parent {
                store.add_edge(edges::PARENT, uri, parent);
            }
        }
        let focus = Focus::new(store.clone(), Rc::new(Schema::default()));
        (store, focus)
    }

    #[test]
    fn focusing_a_frame_sets_its_ancestors() {
        let (_store, focus) = debug_tree();
        assert!(focus.focus("f1"));
        assert_eq!(focus.get("frame"), Some(Uri::new("f1")));
        assert_eq!(focus.get("thread"), Some(Uri::new("t1")));
        assert_eq!(focus.get("session"), Some(Uri::new("s1")));
    }

    #[test]
    fn focusing_a_session_does_not_pick_a_thread() {
        let (_store, focus) = debug_tree();
        assert!(focus.focus("s2"));
        assert_eq!(focus.get("session"), Some(Uri::new("s2")));
        assert_eq!(focus.get("thread"), None);
    }

    #[test]
    fn deeper_roles_survive_only_under_the_new_focus() {
        let (_store, focus) = debug_tree();
        focus.focus("f1");

        focus.focus("s1");
        assert_eq!(focus.get("frame"), Some(Uri::new("f1")));

        focus.focus("t2");
        assert_eq!(focus.get("thread"), Some(Uri::new("t2")));
        assert_eq!(focus.get("frame"), None);
    }

    #[test]
    fn unknown_or_non_role_entities_are_rejected() {
        let (store, focus) = debug_tree();
        store
            .add(EntitySpec::new("bp:1", kinds::BREAKPOINT))
            .expect("add");
        assert!(!focus.focus("missing"));
        assert!(!focus.focus("bp:1"));
        assert!(focus.focused().is_empty());
    }

    #[test]
    fn removal_clears_focus() {
        let (store, focus) = debug_tree();
        focus.focus("f1");
        focus.focus_in("left", "f2");

        store.remove("f1");
        assert_eq!(focus.get("frame"), None);
        assert_eq!(focus.get("thread"), Some(Uri::new("t1")));

        store.remove("f2");
        assert_eq!(focus.context(Some("left")).get("frame"), None);
    }

    #[test]
    fn scoped_override_shadows_and_clears() {
        let (_store, focus) = debug_tree();
        focus.focus("f1");
        let left = focus.context(Some("left"));
        let global = focus.context(None);

        let l = left.clone();
        let anchored = derive(move || l.get("frame"));
        assert_eq!(anchored.get(), Ok(Some(Uri::new("f1"))));

        focus.focus_in("left", "f2");
        assert_eq!(anchored.get(), Ok(Some(Uri::new("f2"))));
        assert_eq!(left.get("thread"), Some(Uri::new("t2")));
        assert_eq!(global.get("frame"), Some(Uri::new("f1")));

        focus.clear_override("left");
        assert_eq!(anchored.get(), Ok(Some(Uri::new("f1"))));
        assert_eq!(left.scope(), Some("left"));
    }

    #[test]
    fn scoped_session_does_not_borrow_the_global_thread() {
        let (_store, focus) = debug_tree();
        focus.focus("f1");
        let left = focus.context(Some("left"));
        let l = left.clone();
        let thread = derive(move || l.get("thread"));
        assert_eq!(thread.get(), Ok(Some(Uri::new("t1"))));

        assert!(focus.focus_in("left", "s2"));
        assert_eq!(left.get("session"), Some(Uri::new("s2")));
        assert_eq!(thread.get(), Ok(None));
        assert_eq!(left.get("frame"), None);
        assert_eq!(focus.get("thread"), Some(Uri::new("t1")));

        focus.clear_override("left");
        assert_eq!(thread.get(), Ok(Some(Uri::new("t1"))));
        assert_eq!(left.get("session"), Some(Uri::new("s1")));
    }

    #[test]
    fn scoped_thread_keeps_falling_back_for_unowned_roles() {
        let (store, focus) = debug_tree();
        store
            .add(EntitySpec::new("t9", kinds::THREAD))
            .expect("add orphan thread");
        focus.focus("f1");

        assert!(focus.focus_in("left", "t9"));
        let left = focus.context(Some("left"));
        assert_eq!(left.get("thread"), Some(Uri::new("t9")));
        assert_eq!(left.get("frame"), None);
        assert_eq!(left.get("session"), Some(Uri::new("s1")));
    }

    #[test]
    fn unfocus_clears_one_role() {
        let (_store, focus) = debug_tree();
        focus.focus("f1");
        focus.unfocus("frame");
        assert_eq!(focus.get("frame"), None);
        assert_eq!(focus.focused(), vec![Uri::new("s1"), Uri::new("t1")]);
    }
}
