//! # dapgraph-core
//!
//! The reactive entity graph behind a Debug Adapter Protocol client.
//!
//! Debugger objects (sessions, threads, frames, scopes, variables, sources,
//! breakpoints, output) are URI-addressed entities in a [`Store`], related
//! by typed edges. Every entity property is a [`Signal`]; [`Derived`]
//! values recompute when the signals, edges or entities they read change.
//!
//! On top of the store:
//! - [`View`]: a live, windowed, sorted query with enter/leave/change events
//! - [`Resolver`]: the compact path/filter query language
//!   (`@session/threads(state=stopped)[0]/frames`)
//! - [`Focus`]: the current session/thread/frame/... with scoped overrides
//! - [`Breakpoints`]: source breakpoints with per-path serialized toggling
//!
//! ## Architectural Constraints
//!
//! - Single logical thread: handles are `Rc`-based and `!Send`
//! - Deterministic: `BTreeMap` only, no hashing, no floats
//! - Async only at explicit await points (`LocalSet` tasks, keyed mutexes);
//!   resumed tasks re-validate liveness before writing
//! - No DAP transport, no rendering, no process management

// =============================================================================
// MODULES
// =============================================================================

pub mod breakpoints;
pub mod focus;
pub mod formats;
pub mod primitives;
pub mod query;
pub mod reactive;
pub mod rollup;
pub mod schema;
pub mod state;
pub mod store;
pub mod task;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Edge, EntitySpec, GraphError, Uri, Value};

// =============================================================================
// RE-EXPORTS: Reactive Graph
// =============================================================================

pub use reactive::{Derived, Signal, Subscription, batch, derive, untracked};
pub use store::{Entity, PropertyChange, Store};
pub use view::{
    Predicate, PredicateOp, SortKey, View, ViewEvent, ViewEventKind, ViewIter, ViewQuery, Window,
};

// =============================================================================
// RE-EXPORTS: Queries & Focus
// =============================================================================

pub use focus::{Focus, FocusContext};
pub use query::{ParseError, ParseErrorKind, Pattern, Resolution, Resolver};
pub use schema::{Axis, Direction, Relation, Schema};

// =============================================================================
// RE-EXPORTS: Services
// =============================================================================

pub use breakpoints::{Breakpoints, Location, ToggleOutcome};
pub use rollup::{frame_count, session_is_leaf, stopped_thread_count};
pub use state::DebugState;
pub use task::{KeyGuard, KeyedMutex, Liveness, load_children, spawn_guarded};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{Snapshot, SnapshotHeader, snapshot_from_bytes, snapshot_to_bytes};
