//! # Reactive Primitives
//!
//! Single-threaded signals with automatic dependency tracking.
//!
//! - [`Signal`]: a settable value cell.
//! - [`Derived`]: a lazily evaluated, memoized value computed from other
//!   signals; re-evaluated once per [`batch`] when a dependency changes.
//! - [`Subscription`]: handle to remove a watcher.
//!
//! All state lives in a thread-local runtime. Signals are `!Send`.

mod derived;
mod runtime;
mod signal;
mod subscription;

pub use derived::{Derived, derive};
pub use runtime::{batch, untracked};
pub use signal::Signal;
pub use subscription::Subscription;

pub(crate) use runtime::{defer, is_tracking};
pub(crate) use subscription::WatcherList;
