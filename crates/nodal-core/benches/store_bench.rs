//! Criterion benchmarks for the path-indexed store.
//!
//! Measures the subtree operations the pre-processor runs under the store
//! lock, against stores of increasing size:
//!
//! - **Lookup**: `get` of a deep path
//! - **Subtree**: `children_range` of one block among many
//! - **Rename**: moving a block and its ports back and forth
//!
//! Run with: `cargo bench -p nodal-core -- store/`
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nodal_core::{GraphObject, InternalKind, ObjectKind, Path, Properties, Store};

const BLOCK_COUNTS: &[usize] = &[16, 128, 1024];
const PORTS_PER_BLOCK: usize = 8;

fn add(store: &Store, path: &str, kind: ObjectKind) {
    let object = GraphObject::new(Path::new(path).unwrap(), kind, Properties::new());
    store.add(Arc::new(object)).unwrap();
}

/// `/main` with `blocks` internal blocks, each carrying input ports.
fn make_store(blocks: usize) -> Store {
    let store = Store::new();
    add(&store, "/main", ObjectKind::Graph);
    for b in 0..blocks {
        add(
            &store,
            &format!("/main/block{b}"),
            ObjectKind::internal(InternalKind::Control),
        );
        for p in 0..PORTS_PER_BLOCK {
            add(&store, &format!("/main/block{b}/in{p}"), ObjectKind::input());
        }
    }
    store
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/get");
    for &blocks in BLOCK_COUNTS {
        let store = make_store(blocks);
        let target = Path::new(format!("/main/block{}/in3", blocks / 2)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &blocks, |b, _| {
            b.iter(|| black_box(store.get(black_box(&target))));
        });
    }
    group.finish();
}

fn bench_children_range(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/children_range");
    for &blocks in BLOCK_COUNTS {
        let store = make_store(blocks);
        let parent = Path::new(format!("/main/block{}", blocks / 2)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &blocks, |b, _| {
            b.iter(|| black_box(store.children_range(black_box(&parent))));
        });
    }
    group.finish();
}

fn bench_rename(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/rename");
    for &blocks in BLOCK_COUNTS {
        let store = make_store(blocks);
        let from = Path::new("/main/block0").unwrap();
        let to = Path::new("/main/moved").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &blocks, |b, _| {
            b.iter(|| {
                store.rename(&from, &to).unwrap();
                store.rename(&to, &from).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lookup, bench_children_range, bench_rename);
criterion_main!(benches);
