// Index performance: insert/find/range throughput for both index kinds,
// and the one-shot lazy-build cost on first probe (spec.md §4.4).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusty_db::collation::Collation;
use rusty_db::common::{StorageRef, Value};
use rusty_db::index::{BTreeIndex, BuildMode, HashIndex, Index};
use std::sync::Arc;

fn empty_loader() -> rusty_db::index::IndexLoader {
    Arc::new(|| Ok(Vec::new()))
}

fn storage_ref(n: u64) -> StorageRef {
    StorageRef::PageHeap {
        page_id: n,
        slot_id: 0,
    }
}

fn bench_btree_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for size in [100i64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let index = BTreeIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
                for i in 0..size {
                    index
                        .add(&Value::Integer(black_box(i)), storage_ref(i as u64))
                        .unwrap();
                }
                black_box(&index);
            });
        });
    }

    group.finish();
}

fn bench_btree_find(c: &mut Criterion) {
    let index = BTreeIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
    for i in 0..10_000i64 {
        index.add(&Value::Integer(i), storage_ref(i as u64)).unwrap();
    }

    c.bench_function("btree_find", |b| {
        b.iter(|| {
            for i in (0..10_000i64).step_by(100) {
                black_box(index.find(&Value::Integer(i)).unwrap());
            }
        });
    });
}

fn bench_btree_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_range_scan");

    let index = BTreeIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
    for i in 0..10_000i64 {
        index.add(&Value::Integer(i), storage_ref(i as u64)).unwrap();
    }

    for range_size in [10i64, 100, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(range_size),
            &range_size,
            |b, &range_size| {
                let start = Value::Integer(5_000);
                let end = Value::Integer(5_000 + range_size);
                b.iter(|| {
                    black_box(index.find_range(Some(&start), Some(&end)).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_hash_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_index");

    group.bench_function("insert", |b| {
        b.iter(|| {
            let index = HashIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
            for i in 0..1_000i64 {
                index.add(&Value::Integer(i), storage_ref(i as u64)).unwrap();
            }
            black_box(&index);
        });
    });

    group.bench_function("find", |b| {
        let index = HashIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
        for i in 0..1_000i64 {
            index.add(&Value::Integer(i), storage_ref(i as u64)).unwrap();
        }
        b.iter(|| {
            for i in (0..1_000i64).step_by(10) {
                black_box(index.find(&Value::Integer(i)).unwrap());
            }
        });
    });

    group.finish();
}

fn bench_lazy_build_on_first_probe(c: &mut Criterion) {
    c.bench_function("lazy_build_first_probe", |b| {
        b.iter(|| {
            let loader: rusty_db::index::IndexLoader = Arc::new(|| {
                Ok((0..5_000i64)
                    .map(|i| (Value::Integer(i), storage_ref(i as u64)))
                    .collect())
            });
            let index = BTreeIndex::new(Collation::Binary, BuildMode::Lazy, loader);
            black_box(index.find(&Value::Integer(2_500)).unwrap());
        });
    });
}

fn bench_index_remove(c: &mut Criterion) {
    c.bench_function("btree_remove_half", |b| {
        b.iter(|| {
            let index = BTreeIndex::new(Collation::Binary, BuildMode::Eager, empty_loader());
            for i in 0..1_000i64 {
                index.add(&Value::Integer(i), storage_ref(i as u64)).unwrap();
            }
            for i in (0..1_000i64).step_by(2) {
                index.remove(&Value::Integer(i), storage_ref(i as u64)).unwrap();
            }
            black_box(&index);
        });
    });
}

criterion_group!(
    benches,
    bench_btree_insert,
    bench_btree_find,
    bench_btree_range_scan,
    bench_hash_index,
    bench_lazy_build_on_first_probe,
    bench_index_remove
);
criterion_main!(benches);
