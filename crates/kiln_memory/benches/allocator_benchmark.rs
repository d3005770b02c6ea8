//! # Allocator Benchmark
//!
//! Hot-path costs of the two allocators:
//! - Region carve + release round trips across size classes
//! - Small-object pool slot churn against the general heap's baseline
//!
//! Run with: `cargo bench --package kiln_memory`

// Benchmarks don't need docs and may have intentionally unused code
#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_memory::{Region, SmallObjectPool};

/// Benchmark: Region allocate/release round trip per size class.
fn bench_region_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_round_trip");

    for size in [16usize, 64, 256, 1_024, 4_096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut region = Region::new(0);
            b.iter(|| {
                let handle = region.allocate(black_box(size)).unwrap();
                region.release(handle).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: Region churn with many live blocks, exercising the bin scan
/// and coalescing paths together.
fn bench_region_churn(c: &mut Criterion) {
    c.bench_function("region_churn_16_live", |b| {
        let mut region = Region::new(0);
        let mut live: Vec<_> = (0..16).map(|_| region.allocate(128).unwrap()).collect();
        let mut next = 0usize;
        b.iter(|| {
            region.release(live[next]).unwrap();
            live[next] = region.allocate(black_box(128)).unwrap();
            next = (next + 1) % live.len();
        });
    });
}

/// Benchmark: Pre-flight check on a fragmented region.
fn bench_can_satisfy(c: &mut Criterion) {
    c.bench_function("region_can_satisfy", |b| {
        let mut region = Region::new(0);
        let _spread: Vec<_> = (0..32).map(|_| region.allocate(100).unwrap()).collect();
        b.iter(|| black_box(region.can_satisfy(black_box(2_048))));
    });
}

/// Benchmark: Small-object pool slot churn per request size.
fn bench_small_pool_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("small_pool_churn");

    for size in [8usize, 24, 96, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut pool = SmallObjectPool::new();
            // Warm the class bin so growth cost stays out of the loop.
            let warm = pool.allocate(size);
            pool.deallocate(warm).unwrap();
            b.iter(|| {
                let handle = pool.allocate(black_box(size));
                pool.deallocate(handle).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: the general heap doing the same slot churn, as a baseline.
fn bench_heap_baseline(c: &mut Criterion) {
    c.bench_function("heap_baseline_96", |b| {
        b.iter(|| {
            let boxed = vec![0u8; black_box(96)].into_boxed_slice();
            black_box(boxed);
        });
    });
}

criterion_group!(
    benches,
    bench_region_round_trip,
    bench_region_churn,
    bench_can_satisfy,
    bench_small_pool_churn,
    bench_heap_baseline
);
criterion_main!(benches);
