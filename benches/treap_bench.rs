//! Benchmark for the persistent treap vs standard BTreeMap.
//!
//! Compares the persistent and in-place write paths against
//! `std::collections::BTreeMap` for common operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mvtreap::Treap;
use std::collections::BTreeMap;

fn keys(size: u64) -> Vec<[u8; 8]> {
    (0..size).map(|index| (index * 2_654_435_761 % size.max(1)).to_be_bytes()).collect()
}

// =============================================================================
// insert Benchmark
// =============================================================================

fn benchmark_insert(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("insert");

    for size in [100u64, 1000, 10000] {
        let keys = keys(size);

        group.bench_with_input(BenchmarkId::new("Treap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut map = Treap::new();
                for key in &keys {
                    map = map.insert(black_box(key), black_box(key));
                }
                black_box(map)
            });
        });

        group.bench_with_input(
            BenchmarkId::new("Treap::insert_mut", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let mut map = Treap::new();
                    for key in &keys {
                        map.insert_mut(black_box(key), black_box(key), None);
                    }
                    black_box(map)
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut map = BTreeMap::new();
                for key in &keys {
                    map.insert(black_box(key.to_vec()), black_box(key.to_vec()));
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

// =============================================================================
// get Benchmark
// =============================================================================

fn benchmark_get(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("get");

    for size in [100u64, 1000, 10000] {
        let keys = keys(size);
        let treap: Treap = keys.iter().map(|key| (key, key)).collect();
        let standard: BTreeMap<Vec<u8>, Vec<u8>> = keys
            .iter()
            .map(|key| (key.to_vec(), key.to_vec()))
            .collect();

        group.bench_with_input(BenchmarkId::new("Treap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut hits = 0usize;
                for key in &keys {
                    if treap.get(black_box(key)).is_some() {
                        hits += 1;
                    }
                }
                black_box(hits)
            });
        });

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut hits = 0usize;
                for key in &keys {
                    if standard.get(black_box(&key[..])).is_some() {
                        hits += 1;
                    }
                }
                black_box(hits)
            });
        });
    }

    group.finish();
}

// =============================================================================
// remove Benchmark
// =============================================================================

fn benchmark_remove(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("remove");

    for size in [100u64, 1000] {
        let keys = keys(size);
        let treap: Treap = keys.iter().map(|key| (key, key)).collect();

        group.bench_with_input(BenchmarkId::new("Treap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut map = treap.clone();
                for key in &keys {
                    map = map.remove(black_box(key));
                }
                black_box(map)
            });
        });

        group.bench_with_input(
            BenchmarkId::new("Treap::remove_mut", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let mut map = treap.clone();
                    for key in &keys {
                        map.remove_mut(black_box(key), None);
                    }
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

// =============================================================================
// iterate Benchmark
// =============================================================================

fn benchmark_iterate(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("iterate");

    for size in [1000u64, 10000] {
        let keys = keys(size);
        let treap: Treap = keys.iter().map(|key| (key, key)).collect();
        let standard: BTreeMap<Vec<u8>, Vec<u8>> = keys
            .iter()
            .map(|key| (key.to_vec(), key.to_vec()))
            .collect();

        group.bench_with_input(BenchmarkId::new("Treap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut total = 0usize;
                for (key, value) in &treap {
                    total += key.len() + value.len();
                }
                black_box(total)
            });
        });

        group.bench_with_input(BenchmarkId::new("BTreeMap", size), &size, |bencher, _| {
            bencher.iter(|| {
                let mut total = 0usize;
                for (key, value) in &standard {
                    total += key.len() + value.len();
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

// =============================================================================
// snapshot Benchmark
// =============================================================================

fn benchmark_snapshot_churn(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("snapshot_churn");

    for size in [1000u64] {
        let keys = keys(size);

        group.bench_with_input(
            BenchmarkId::new("Treap::insert_mut under snapshot", size),
            &size,
            |bencher, _| {
                bencher.iter(|| {
                    let mut map: Treap = keys.iter().map(|key| (key, key)).collect();
                    let view = map.clone();
                    let record = map.snapshot();
                    for key in &keys {
                        map.insert_mut(black_box(key), b"updated", None);
                    }
                    drop(view);
                    record.release();
                    black_box(map)
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert,
    benchmark_get,
    benchmark_remove,
    benchmark_iterate,
    benchmark_snapshot_churn
);
criterion_main!(benches);
