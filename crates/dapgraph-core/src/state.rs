//! # Debug State
//!
//! One store with its focus, resolver and breakpoint service.
//!
//! Plugins normally share the thread's default instance through
//! [`DebugState::with_default`]; tests build their own with
//! [`DebugState::new`] so nothing leaks between them.

use crate::breakpoints::Breakpoints;
use crate::focus::Focus;
use crate::query::Resolver;
use crate::schema::Schema;
use crate::store::Store;
use crate::view::{View, ViewQuery, Window};
use crate::GraphError;
use std::rc::Rc;

/// Store, focus, resolver and breakpoints over one schema.
#[derive(Clone, Debug)]
pub struct DebugState {
    pub store: Store,
    pub focus: Focus,
    pub resolver: Resolver,
    pub breakpoints: Breakpoints,
    schema: Rc<Schema>,
}

thread_local! {
    static DEFAULT_STATE: DebugState = DebugState::new();
}

impl DebugState {
    /// An isolated instance with the debugger schema.
    pub fn new() -> Self {
        Self::with_schema(Schema::default())
    }

    /// An isolated instance with a custom schema.
    pub fn with_schema(schema: Schema) -> Self {
        let schema = Rc::new(schema);
        let store = Store::new();
        let focus = Focus::new(store.clone(), Rc::clone(&schema));
        let resolver = Resolver::new(store.clone(), focus.clone(), Rc::clone(&schema));
        let breakpoints = Breakpoints::new(store.clone());
        Self {
            store,
            focus,
            resolver,
            breakpoints,
            schema,
        }
    }

    /// Run `f` against this thread's default instance.
    pub fn with_default<R>(f: impl FnOnce(&DebugState) -> R) -> R {
        DEFAULT_STATE.with(f)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Open a view over this state's store.
    pub fn view(&self, query: ViewQuery, window: Window) -> Result<View, GraphError> {
        View::new(&self.store, query, window)
    }
}

impl Default for DebugState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntitySpec;
    use crate::schema::kinds;

    #[test]
    fn default_instance_is_shared_per_thread() {
        DebugState::with_default(|state| {
            state
                .store
                .add(EntitySpec::new("session:default", kinds::SESSION))
                .expect("add");
        });
        let seen = DebugState::with_default(|state| state.store.contains("session:default"));
        assert!(seen);
    }

    #[test]
    fn new_instances_are_isolated() {
        let a = DebugState::new();
        let b = DebugState::new();
        a.store
            .add(EntitySpec::new("session:1", kinds::SESSION))
            .expect("add");
        assert!(b.store.is_empty());
        assert!(a.focus.focus("session:1"));
        assert_eq!(
            a.resolver
                .resolve_one("@session")
                .expect("parse")
                .map(|s| s.uri().to_string()),
            Some("session:1".to_string())
        );
        assert_eq!(b.focus.get("session"), None);
    }

    #[test]
    fn custom_schema_aliases_resolve() {
        let state = DebugState::with_schema(Schema::default().with_collection("procs", kinds::SESSION));
        state
            .store
            .add(EntitySpec::new("session:1", kinds::SESSION))
            .expect("add");
        let found = state.resolver.resolve_all("procs").expect("parse");
        assert_eq!(found.len(), 1);
        assert_eq!(state.schema().collection_kind("procs"), kinds::SESSION);
        let view = state
            .view(ViewQuery::of_kind(kinds::SESSION), Window::default())
            .expect("view");
        assert_eq!(view.visible_total(), 1);
    }
}
