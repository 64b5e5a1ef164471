//! # Graph Benchmarks
//!
//! Performance benchmarks for dapgraph-core store, view and query operations.
//!
//! Run with: `cargo bench -p dapgraph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dapgraph_core::schema::{edges, kinds};
use dapgraph_core::{DebugState, EntitySpec, Store, View, ViewQuery, Window, batch};
use std::hint::black_box;

/// One session with `size` threads, each stopped thread holding 4 frames.
fn create_session(size: usize) -> DebugState {
    let state = DebugState::new();
    let store = &state.store;
    batch(|| {
        store
            .add(EntitySpec::new("session:1", kinds::SESSION))
            .expect("session");
        for i in 0..size {
            let thread = format!("thread:{i}");
            let stopped = i % 2 == 0;
            store
                .add(
                    EntitySpec::new(thread.as_str(), kinds::THREAD)
                        .with("state", if stopped { "stopped" } else { "running" }),
                )
                .expect("thread");
            store.add_edge(edges::PARENT, &thread, "session:1");
            if stopped {
                for f in 0..4 {
                    let frame = format!("frame:{i}:{f}");
                    store
                        .add(EntitySpec::new(frame.as_str(), kinds::FRAME))
                        .expect("frame");
                    store.add_edge(edges::PARENT, &frame, &thread);
                }
            }
        }
    });
    state
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_entity_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_insertion");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = Store::new();
                for i in 0..size {
                    let _ = store.add(EntitySpec::new(format!("variable:{i}"), kinds::VARIABLE));
                }
                black_box(store)
            });
        });
    }

    group.finish();
}

fn bench_edge_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_lookup");

    for size in [100, 1000].iter() {
        let state = create_session(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(state.store.edges_to("session:1", edges::PARENT)));
        });
    }

    group.finish();
}

fn bench_view_scroll(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_scroll");

    for size in [100, 1000].iter() {
        let state = create_session(*size);
        let view = View::new(
            &state.store,
            ViewQuery::of_kind(kinds::THREAD).sort_by("state", false),
            Window { offset: 0, limit: 20 },
        )
        .expect("view");

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut offset = 0;
            b.iter(|| {
                offset = (offset + 7) % size;
                view.scroll(offset).expect("scroll");
                black_box(view.items())
            });
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [100, 1000].iter() {
        let state = create_session(*size);
        state.focus.focus("frame:0:2");

        group.bench_with_input(BenchmarkId::new("filter", size), size, |b, _| {
            b.iter(|| black_box(state.resolver.resolve_all("threads(state=stopped)")));
        });
        group.bench_with_input(BenchmarkId::new("anchor_path", size), size, |b, _| {
            b.iter(|| {
                black_box(
                    state
                        .resolver
                        .resolve_all("@session/threads(state=stopped)[0]/frames"),
                )
            });
        });
        group.bench_with_input(BenchmarkId::new("anchor_offset", size), size, |b, _| {
            b.iter(|| black_box(state.resolver.resolve_one("@frame+1")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_entity_insertion,
    bench_edge_lookup,
    bench_view_scroll,
    bench_resolve
);
criterion_main!(benches);
