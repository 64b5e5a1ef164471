//! # Breakpoints
//!
//! Source breakpoints stored as entities: one `source` entity per file
//! path (deduplicated through the `source_by_path` index) and one
//! `breakpoint` entity per location, linked to its source by a `source`
//! edge.
//!
//! Toggling is look-up-then-add-or-remove around an adapter round trip,
//! so it holds a per-path [`KeyedMutex`] for the whole operation.

use crate::reactive::batch;
use crate::schema::{edges, kinds};
use crate::store::{Entity, Store};
use crate::task::KeyedMutex;
use crate::{EntitySpec, GraphError, Uri, Value};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Index of `source` entities keyed by their `path` property.
pub const SOURCE_BY_PATH: &str = "source_by_path";

/// Position of a breakpoint in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
}

impl Location {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column: None,
        }
    }

    #[must_use]
    pub fn at_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.path, self.line, column),
            None => write!(f, "{}:{}", self.path, self.line),
        }
    }
}

/// What a toggle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added(Entity),
    Removed(Uri),
    /// The adapter did not acknowledge; the store is unchanged.
    Rejected,
}

/// Breakpoint bookkeeping over a store.
#[derive(Clone)]
pub struct Breakpoints {
    store: Store,
    locks: KeyedMutex,
    counter: Rc<Cell<u64>>,
}

impl Breakpoints {
    /// Attach to `store`, defining the [`SOURCE_BY_PATH`] index.
    pub fn new(store: Store) -> Self {
        store.define_index(SOURCE_BY_PATH, kinds::SOURCE, |source| {
            let path = source.peek("path");
            (!path.is_nil()).then_some(path)
        });
        Self {
            store,
            locks: KeyedMutex::new(),
            counter: Rc::new(Cell::new(0)),
        }
    }

    /// The `source` entity for `path`, if one exists; tracked.
    pub fn source(&self, path: &str) -> Option<Entity> {
        self.store.get_one(SOURCE_BY_PATH, &Value::str(path))
    }

    /// Every breakpoint on `path`, in creation order; tracked.
    pub fn at_path(&self, path: &str) -> Vec<Entity> {
        let Some(source) = self.source(path) else {
            return Vec::new();
        };
        self.store
            .edges_to(source.uri().as_str(), edges::SOURCE)
            .iter()
            .filter_map(|uri| self.store.get(uri.as_str()))
            .filter(|entity| entity.kind() == kinds::BREAKPOINT)
            .collect()
    }

    /// The breakpoint a toggle at `location` would act on.
    ///
    /// Among breakpoints on the same line: an exact column match wins,
    /// then the first breakpoint without a column, then the one with the
    /// lowest column.
    pub fn find(&self, location: &Location) -> Option<Entity> {
        let line = i64::from(location.line);
        let on_line: Vec<Entity> = self
            .at_path(&location.path)
            .into_iter()
            .filter(|bp| bp.get("line").as_int() == Some(line))
            .collect();
        if on_line.is_empty() {
            return None;
        }
        let column_of = |bp: &Entity| bp.get("column").as_int();

        if let Some(wanted) = location.column.map(i64::from)
            && let Some(exact) = on_line.iter().find(|bp| column_of(bp) == Some(wanted))
        {
            return Some(exact.clone());
        }
        if let Some(bare) = on_line.iter().find(|bp| column_of(bp).is_none()) {
            return Some(bare.clone());
        }
        on_line.into_iter().min_by_key(column_of)
    }

    /// Toggle with no adapter round trip.
    pub async fn toggle(&self, location: &Location) -> Result<ToggleOutcome, GraphError> {
        self.toggle_with(location, || async { true }).await
    }

    /// Toggle the breakpoint at `location`.
    ///
    /// `ack` is awaited between the lookup and the write (the adapter
    /// round trip); returning `false` leaves the store untouched. Toggles
    /// on the same path run one at a time.
    pub async fn toggle_with<F, Fut>(
        &self,
        location: &Location,
        ack: F,
    ) -> Result<ToggleOutcome, GraphError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let _guard = self.locks.lock(&location.path).await;
        let existing = self.find(location);

        if !ack().await {
            tracing::debug!(target: "dapgraph_core::breakpoints", location = %location, "adapter rejected toggle");
            return Ok(ToggleOutcome::Rejected);
        }

        match existing {
            Some(bp) if bp.is_live() => {
                let uri = bp.uri().clone();
                self.store.remove(uri.as_str());
                tracing::debug!(target: "dapgraph_core::breakpoints", uri = %uri, "breakpoint removed");
                Ok(ToggleOutcome::Removed(uri))
            }
            _ => {
                let bp = self.insert(location)?;
                tracing::debug!(target: "dapgraph_core::breakpoints", uri = %bp.uri(), "breakpoint added");
                Ok(ToggleOutcome::Added(bp))
            }
        }
    }

    fn insert(&self, location: &Location) -> Result<Entity, GraphError> {
        batch(|| {
            let source = self.source_for(&location.path)?;
            let mut spec = EntitySpec::new(self.next_uri(), kinds::BREAKPOINT)
                .with("path", location.path.as_str())
                .with("line", location.line);
            if let Some(column) = location.column {
                spec = spec.with("column", column);
            }
            let bp = self.store.add(spec)?;
            self.store
                .add_edge(edges::SOURCE, bp.uri().as_str(), source.uri().as_str());
            Ok(bp)
        })
    }

    /// The source for `path`, creating `source:{path}` if none is indexed.
    ///
    /// A source already at that URI without a `path` is tagged and reused;
    /// any other occupant pushes the new source to `source:{path}#{n}`.
    fn source_for(&self, path: &str) -> Result<Entity, GraphError> {
        if let Some(source) = self.source(path) {
            return Ok(source);
        }
        let base = format!("source:{path}");
        let mut uri = base.clone();
        let mut n: u64 = 0;
        loop {
            match self.store.get(&uri) {
                None => {
                    return self
                        .store
                        .add(EntitySpec::new(uri, kinds::SOURCE).with("path", path));
                }
                Some(existing)
                    if existing.kind() == kinds::SOURCE && existing.peek("path").is_nil() =>
                {
                    existing.set("path", path)?;
                    tracing::debug!(target: "dapgraph_core::breakpoints", uri = %existing.uri(), "untagged source reused");
                    return Ok(existing);
                }
                Some(_) => {
                    n = n.wrapping_add(1);
                    uri = format!("{base}#{n}");
                }
            }
        }
    }

    fn next_uri(&self) -> String {
        loop {
            let n = self.counter.get().wrapping_add(1);
            self.counter.set(n);
            let uri = format!("breakpoint:{n}");
            if !self.store.contains(&uri) {
                return uri;
            }
        }
    }
}

impl fmt::Debug for Breakpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breakpoints")
            .field("locks", &self.locks)
            .field("issued", &self.counter.get())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::untracked;
    use tokio::task::{LocalSet, yield_now};

    fn place(store: &Store, uri: &str, line: u32, column: Option<u32>) {
        let mut spec = EntitySpec::new(uri, kinds::BREAKPOINT).with("line", line);
        if let Some(column) = column {
            spec = spec.with("column", column);
        }
        store.add(spec).expect("add breakpoint");
        store.add_edge(edges::SOURCE, uri, "source:/a.py");
    }

    fn with_source() -> (Store, Breakpoints) {
        let store = Store::new();
        let breakpoints = Breakpoints::new(store.clone());
        store
            .add(EntitySpec::new("source:/a.py", kinds::SOURCE).with("path", "/a.py"))
            .expect("add source");
        (store, breakpoints)
    }

    fn found(breakpoints: &Breakpoints, location: &Location) -> Option<String> {
        untracked(|| breakpoints.find(location)).map(|bp| bp.uri().to_string())
    }

    #[test]
    fn exact_column_wins() {
        let (store, breakpoints) = with_source();
        place(&store, "bp:1", 3, None);
        place(&store, "bp:2", 3, Some(9));
        place(&store, "bp:3", 3, Some(4));

        let loc = Location::new("/a.py", 3).at_column(4);
        assert_eq!(found(&breakpoints, &loc), Some("bp:3".into()));
    }

    #[test]
    fn column_less_breakpoint_is_next() {
        let (store, breakpoints) = with_source();
        place(&store, "bp:1", 3, Some(9));
        place(&store, "bp:2", 3, None);
        place(&store, "bp:3", 3, None);

        assert_eq!(found(&breakpoints, &Location::new("/a.py", 3)), Some("bp:2".into()));
        let loc = Location::new("/a.py", 3).at_column(1);
        assert_eq!(found(&breakpoints, &loc), Some("bp:2".into()));
    }

    #[test]
    fn lowest_column_is_last_resort() {
        let (store, breakpoints) = with_source();
        place(&store, "bp:1", 3, Some(9));
        place(&store, "bp:2", 3, Some(4));
        place(&store, "bp:3", 5, None);

        assert_eq!(found(&breakpoints, &Location::new("/a.py", 3)), Some("bp:2".into()));
        assert_eq!(found(&breakpoints, &Location::new("/a.py", 4)), None);
        assert_eq!(found(&breakpoints, &Location::new("/b.py", 3)), None);
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = Store::new();
        let breakpoints = Breakpoints::new(store.clone());
        let loc = Location::new("/a.py", 3);

        let first = breakpoints.toggle(&loc).await.expect("toggle");
        assert!(matches!(first, ToggleOutcome::Added(_)));
        assert_eq!(untracked(|| breakpoints.at_path("/a.py")).len(), 1);
        assert!(store.contains("source:/a.py"));

        let second = breakpoints.toggle(&loc).await.expect("toggle");
        assert!(matches!(second, ToggleOutcome::Removed(_)));
        assert!(untracked(|| breakpoints.at_path("/a.py")).is_empty());
    }

    #[tokio::test]
    async fn untagged_source_at_the_default_uri_is_reused() {
        let store = Store::new();
        let breakpoints = Breakpoints::new(store.clone());
        store
            .add(EntitySpec::new("source:/b.py", kinds::SOURCE))
            .expect("add bare source");

        let outcome = breakpoints
            .toggle(&Location::new("/b.py", 1))
            .await
            .expect("toggle");
        assert!(matches!(outcome, ToggleOutcome::Added(_)));
        assert_eq!(store.entities_of(kinds::SOURCE).len(), 1);
        let source = untracked(|| breakpoints.source("/b.py")).expect("indexed");
        assert_eq!(source.uri().as_str(), "source:/b.py");
        assert_eq!(untracked(|| breakpoints.at_path("/b.py")).len(), 1);
    }

    #[tokio::test]
    async fn occupied_default_uri_gets_a_suffix() {
        let store = Store::new();
        let breakpoints = Breakpoints::new(store.clone());
        store
            .add(EntitySpec::new("source:/c.py", kinds::SOURCE).with("path", "/elsewhere.py"))
            .expect("add source");
        store
            .add(EntitySpec::new("source:/c.py#1", kinds::OUTPUT))
            .expect("add output");

        breakpoints
            .toggle(&Location::new("/c.py", 2))
            .await
            .expect("toggle");
        let source = untracked(|| breakpoints.source("/c.py")).expect("indexed");
        assert_eq!(source.uri().as_str(), "source:/c.py#2");
        assert_eq!(
            store.get("source:/c.py").map(|s| s.peek("path")),
            Some(Value::str("/elsewhere.py"))
        );
    }

    #[tokio::test]
    async fn rejected_ack_changes_nothing() {
        let store = Store::new();
        let breakpoints = Breakpoints::new(store.clone());
        let loc = Location::new("/a.py", 3);

        let outcome = breakpoints
            .toggle_with(&loc, || async { false })
            .await
            .expect("toggle");
        assert_eq!(outcome, ToggleOutcome::Rejected);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn concurrent_toggles_serialize_per_path() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let store = Store::new();
                let breakpoints = Breakpoints::new(store.clone());
                let loc = Location::new("/a.py", 3);

                let slow_ack = || async {
                    yield_now().await;
                    yield_now().await;
                    true
                };
                let a = {
                    let (bps, loc) = (breakpoints.clone(), loc.clone());
                    tokio::task::spawn_local(async move { bps.toggle_with(&loc, slow_ack).await })
                };
                let b = {
                    let (bps, loc) = (breakpoints.clone(), loc.clone());
                    tokio::task::spawn_local(async move { bps.toggle_with(&loc, slow_ack).await })
                };

                let first = a.await.expect("join").expect("toggle");
                let second = b.await.expect("join").expect("toggle");
                assert!(matches!(first, ToggleOutcome::Added(_)));
                assert!(matches!(second, ToggleOutcome::Removed(_)));
                assert!(untracked(|| breakpoints.at_path("/a.py")).is_empty());
            })
            .await;
    }
}
