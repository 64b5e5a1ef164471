//! # Scenario Tests
//!
//! End-to-end checks of the public API against a small debug session:
//! query resolution, edge ordering, focus anchors, concurrent breakpoint
//! toggling, and disposal.

use dapgraph_core::schema::{edges, kinds};
use dapgraph_core::{
    DebugState, EntitySpec, Location, Signal, ToggleOutcome, Uri, View, ViewEventKind, ViewQuery,
    Window, derive, load_children, untracked,
};
use std::cell::Cell;
use std::rc::Rc;
use tokio::task::{LocalSet, yield_now};

// =============================================================================
// FIXTURE
// =============================================================================

/// s1 (running) and s2 (stopped); t1 under s1 with frames f1, f2.
fn session_tree() -> DebugState {
    let state = DebugState::new();
    let store = &state.store;
    for (uri, kind, props) in [
        ("session:1", kinds::SESSION, vec![("state", "running")]),
        ("session:2", kinds::SESSION, vec![("state", "stopped")]),
        ("thread:1", kinds::THREAD, vec![("state", "stopped")]),
        ("frame:1", kinds::FRAME, vec![("name", "main")]),
        ("frame:2", kinds::FRAME, vec![("name", "run")]),
    ] {
        let spec = props
            .into_iter()
            .fold(EntitySpec::new(uri, kind), |spec, (k, v)| spec.with(k, v));
        store.add(spec).expect("add");
    }
    store.add_edge(edges::PARENT, "thread:1", "session:1");
    store.add_edge(edges::PARENT, "frame:1", "thread:1");
    store.add_edge(edges::PARENT, "frame:2", "thread:1");
    state
}

fn uri_of(entity: Option<dapgraph_core::Entity>) -> Option<String> {
    entity.map(|e| e.uri().to_string())
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn filter_by_state() {
    let state = session_tree();
    let stopped = state
        .resolver
        .resolve_all("sessions(state=stopped)")
        .expect("parse");
    let uris: Vec<String> = stopped.iter().map(|e| e.uri().to_string()).collect();
    assert_eq!(uris, vec!["session:2"]);
}

#[test]
fn incoming_edges_keep_insertion_order() {
    let state = DebugState::new();
    for (uri, kind) in [
        ("S1", kinds::SESSION),
        ("T1", kinds::THREAD),
        ("T2", kinds::THREAD),
    ] {
        state.store.add(EntitySpec::new(uri, kind)).expect("add");
    }
    assert!(state.store.add_edge(edges::PARENT, "T1", "S1"));
    assert!(state.store.add_edge(edges::PARENT, "T2", "S1"));

    assert_eq!(
        state.store.edges_to("S1", edges::PARENT),
        vec![Uri::new("T1"), Uri::new("T2")]
    );
}

#[test]
fn session_anchor_walks_ancestors() {
    let state = session_tree();
    assert!(state.focus.focus("frame:1"));
    assert_eq!(
        uri_of(state.resolver.resolve_one("@session").expect("parse")),
        Some("session:1".into())
    );
    assert_eq!(
        uri_of(state.resolver.resolve_one("@thread").expect("parse")),
        Some("thread:1".into())
    );
}

#[tokio::test]
async fn concurrent_toggles_cancel_out() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let state = DebugState::new();
            let location = Location::new("/src/app.py", 3);

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let breakpoints = state.breakpoints.clone();
                    let location = location.clone();
                    tokio::task::spawn_local(async move {
                        breakpoints
                            .toggle_with(&location, || async {
                                yield_now().await;
                                true
                            })
                            .await
                    })
                })
                .collect();

            let mut added = 0;
            let mut removed = 0;
            for handle in handles {
                match handle.await.expect("join").expect("toggle") {
                    ToggleOutcome::Added(_) => added += 1,
                    ToggleOutcome::Removed(_) => removed += 1,
                    ToggleOutcome::Rejected => {}
                }
            }
            assert_eq!((added, removed), (1, 1));
            assert!(untracked(|| state.breakpoints.at_path("/src/app.py")).is_empty());
            assert!(untracked(|| state.breakpoints.find(&location)).is_none());
        })
        .await;
}

// =============================================================================
// PROPERTIES
// =============================================================================

#[test]
fn anchors_and_indices_round_trip() {
    let state = session_tree();
    state.focus.focus("frame:2");
    assert_eq!(
        uri_of(state.resolver.resolve_one("@frame").expect("parse")),
        Some("frame:2".into())
    );

    let all = state.resolver.resolve_all("sessions").expect("parse");
    let first = state.resolver.resolve_one("sessions[0]").expect("parse");
    assert_eq!(all.first().cloned(), first);

    let empty = DebugState::new();
    assert!(empty.resolver.resolve_all("sessions").expect("parse").is_empty());
    assert!(empty.resolver.resolve_one("sessions[0]").expect("parse").is_none());
}

#[test]
fn disposal_is_idempotent() {
    let state = session_tree();
    let view = View::new(&state.store, ViewQuery::of_kind(kinds::SESSION), Window::default())
        .expect("view");
    let view_events = Rc::new(Cell::new(0));
    let seen = Rc::clone(&view_events);
    let _view_sub = view.on(ViewEventKind::Change, move |_| seen.set(seen.get() + 1));

    let signal = Signal::new(1);
    let signal_events = Rc::new(Cell::new(0));
    let seen = Rc::clone(&signal_events);
    let _signal_sub = signal.watch(move |_| seen.set(seen.get() + 1));

    let s = signal.clone();
    let doubled = derive(move || s.get() * 2);
    let derived_events = Rc::new(Cell::new(0));
    let seen = Rc::clone(&derived_events);
    let _derived_sub = doubled.watch(move |_| seen.set(seen.get() + 1));

    view.dispose();
    view.dispose();
    doubled.dispose();
    doubled.dispose();
    signal.dispose();
    signal.dispose();

    state
        .store
        .add(EntitySpec::new("session:3", kinds::SESSION))
        .expect("add");
    assert!(signal.set(5).is_err());

    assert_eq!(view_events.get(), 0);
    assert_eq!(signal_events.get(), 0);
    assert_eq!(derived_events.get(), 0);
}

// =============================================================================
// ASYNC LOADING
// =============================================================================

#[tokio::test]
async fn lazily_loaded_variables_are_discarded_when_scope_goes_away() {
    let state = DebugState::new();
    let scope = state
        .store
        .add(EntitySpec::new("scope:1", kinds::SCOPE))
        .expect("add");

    let loaded = load_children(&state.store, &scope, edges::PARENT, || async {
        vec![EntitySpec::new("variable:1", kinds::VARIABLE).with("value", "42")]
    })
    .await
    .expect("load");
    assert_eq!(loaded.len(), 1);
    assert_eq!(
        state.store.edges_to("scope:1", edges::PARENT),
        vec![Uri::new("variable:1")]
    );

    let store = state.store.clone();
    let late = load_children(&state.store, &scope, edges::PARENT, || async move {
        store.remove("scope:1");
        vec![EntitySpec::new("variable:2", kinds::VARIABLE)]
    })
    .await
    .expect("load");
    assert!(late.is_empty());
    assert!(!state.store.contains("variable:2"));
}
