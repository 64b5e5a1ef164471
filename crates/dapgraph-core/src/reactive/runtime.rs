//! Thread-local reactive runtime.
//!
//! Holds the dependency-tracking frame stack, the batch depth, the queue of
//! stale derived signals (ordered by height so a node is refreshed after all
//! of its sources), and the queue of deferred watcher notifications.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

pub(crate) type ReactiveId = u64;

/// Something a derived signal can depend on.
pub(crate) trait Source {
    fn id(&self) -> ReactiveId;
    /// 0 for plain signals, 1 + max(source height) for derived ones.
    fn height(&self) -> u32;
    fn add_observer(&self, id: ReactiveId, observer: Weak<dyn Observer>);
    fn remove_observer(&self, id: ReactiveId);
}

/// A derived signal as seen by its sources.
pub(crate) trait Observer {
    fn id(&self) -> ReactiveId;
    fn height(&self) -> u32;
    /// Returns `true` if the observer was fresh and is now stale.
    fn mark_stale(&self) -> bool;
    fn refresh(&self);
}

/// Dependents of a source, held weakly.
#[derive(Default)]
pub(crate) struct Observers {
    list: RefCell<Vec<(ReactiveId, Weak<dyn Observer>)>>,
}

impl Observers {
    pub(crate) fn add(&self, id: ReactiveId, observer: Weak<dyn Observer>) {
        let mut list = self.list.borrow_mut();
        if !list.iter().any(|(existing, _)| *existing == id) {
            list.push((id, observer));
        }
    }

    pub(crate) fn remove(&self, id: ReactiveId) {
        self.list.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn clear(&self) {
        self.list.borrow_mut().clear();
    }

    /// Whether no live dependent remains.
    pub(crate) fn is_empty(&self) -> bool {
        self.list
            .borrow()
            .iter()
            .all(|(_, weak)| weak.strong_count() == 0)
    }

    /// Mark every live dependent stale and queue it for refresh.
    pub(crate) fn mark_stale(&self) {
        let live: Vec<Rc<dyn Observer>> = {
            let mut list = self.list.borrow_mut();
            list.retain(|(_, weak)| weak.strong_count() > 0);
            list.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for observer in live {
            if observer.mark_stale() {
                enqueue(&observer);
            }
        }
    }
}

// =============================================================================
// RUNTIME STATE
// =============================================================================

#[derive(Default)]
struct Frame {
    owner: Option<ReactiveId>,
    sources: Vec<Rc<dyn Source>>,
    cyclic: bool,
}

#[derive(Default)]
struct Runtime {
    next_id: Cell<ReactiveId>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    stale: RefCell<BTreeMap<(u32, ReactiveId), Weak<dyn Observer>>>,
    effects: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    frames: RefCell<Vec<Frame>>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

pub(crate) fn next_id() -> ReactiveId {
    RUNTIME.with(|rt| {
        let id = rt.next_id.get().saturating_add(1);
        rt.next_id.set(id);
        id
    })
}

// =============================================================================
// BATCHING
// =============================================================================

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get().saturating_sub(1)));
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        RUNTIME.with(|rt| rt.flushing.set(false));
    }
}

/// Run `f` as one reactive transaction.
///
/// Signal writes inside `f` mark dependents stale but nothing recomputes and
/// no watcher runs until the outermost batch returns. Then every stale
/// derived signal is refreshed once, lowest height first, and watchers fire.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get().saturating_add(1)));
    let guard = BatchGuard;
    let result = f();
    drop(guard);
    if RUNTIME.with(|rt| rt.batch_depth.get() == 0) {
        flush();
    }
    result
}

fn flush() {
    if RUNTIME.with(|rt| rt.flushing.replace(true)) {
        // The outer flush loop picks up whatever was queued.
        return;
    }
    let _guard = FlushGuard;
    loop {
        while let Some(observer) = pop_stale() {
            observer.refresh();
        }
        let Some(effect) = RUNTIME.with(|rt| rt.effects.borrow_mut().pop_front()) else {
            break;
        };
        untracked(effect);
    }
}

fn pop_stale() -> Option<Rc<dyn Observer>> {
    RUNTIME.with(|rt| {
        loop {
            let (_, weak) = rt.stale.borrow_mut().pop_first()?;
            if let Some(observer) = weak.upgrade() {
                return Some(observer);
            }
        }
    })
}

pub(crate) fn enqueue(observer: &Rc<dyn Observer>) {
    RUNTIME.with(|rt| {
        rt.stale
            .borrow_mut()
            .insert((observer.height(), observer.id()), Rc::downgrade(observer));
    });
}

/// Queue a watcher notification for the end of the current flush.
pub(crate) fn defer(effect: impl FnOnce() + 'static) {
    RUNTIME.with(|rt| rt.effects.borrow_mut().push_back(Box::new(effect)));
}

// =============================================================================
// DEPENDENCY TRACKING
// =============================================================================

struct FrameGuard {
    armed: bool,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.armed {
            RUNTIME.with(|rt| {
                rt.frames.borrow_mut().pop();
            });
        }
    }
}

/// Result of running a compute function inside a tracking frame.
pub(crate) struct Evaluation<T> {
    pub value: T,
    pub sources: Vec<Rc<dyn Source>>,
    pub cyclic: bool,
}

/// Run `compute` recording every source it reads.
pub(crate) fn evaluate<T>(owner: ReactiveId, compute: impl FnOnce() -> T) -> Evaluation<T> {
    RUNTIME.with(|rt| {
        rt.frames.borrow_mut().push(Frame {
            owner: Some(owner),
            ..Frame::default()
        });
    });
    let mut guard = FrameGuard { armed: true };
    let value = compute();
    guard.armed = false;
    let frame = RUNTIME
        .with(|rt| rt.frames.borrow_mut().pop())
        .unwrap_or_default();
    Evaluation {
        value,
        sources: frame.sources,
        cyclic: frame.cyclic,
    }
}

/// Run `f` without registering any dependency.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.frames.borrow_mut().push(Frame::default()));
    let _guard = FrameGuard { armed: true };
    f()
}

/// Whether a derived signal is currently evaluating on this thread.
pub(crate) fn is_tracking() -> bool {
    RUNTIME.with(|rt| {
        rt.frames
            .borrow()
            .last()
            .is_some_and(|frame| frame.owner.is_some())
    })
}

/// Register a read of `source` with the innermost tracking frame.
pub(crate) fn track(source: impl FnOnce() -> Rc<dyn Source>) {
    RUNTIME.with(|rt| {
        let mut frames = rt.frames.borrow_mut();
        let Some(frame) = frames.last_mut() else {
            return;
        };
        if frame.owner.is_none() {
            return;
        }
        let source = source();
        let id = source.id();
        if !frame.sources.iter().any(|existing| existing.id() == id) {
            frame.sources.push(source);
        }
    });
}

/// Mark the frame of `owner` and every frame above it as cyclic.
pub(crate) fn flag_cycle(owner: ReactiveId) {
    RUNTIME.with(|rt| {
        let mut frames = rt.frames.borrow_mut();
        if let Some(pos) = frames.iter().rposition(|frame| frame.owner == Some(owner)) {
            for frame in frames.iter_mut().skip(pos) {
                frame.cyclic = true;
            }
        }
    });
}
