//! Normalization, merge and diff performance benchmarks
//!
//! Measures the work done after solvers return: category assignment over
//! the dependency graph, canonical ordering, merging per-platform outcomes
//! into a hashed document, and diffing two documents.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use lockstep_benchmarks::{criterion_config, synthetic_outcomes, synthetic_packages, synthetic_spec};
use lockstep_core::Platform;
use lockstep_lock::{LockDiff, LockMerger};
use lockstep_solver::normalize::{assign_categories, canonicalize};

/// Benchmark category assignment and canonical ordering for one platform
fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let platform = Platform::new("linux-64").unwrap();

    for count in [50, 200, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        let spec = synthetic_spec(*count / 5, 1);
        let packages = synthetic_packages(*count, &platform);

        group.bench_with_input(BenchmarkId::new("assign_categories", count), &packages, |b, packages| {
            b.iter_batched(
                || packages.clone(),
                |mut packages| {
                    assign_categories(&mut packages, &spec);
                    black_box(packages)
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("canonicalize", count), &packages, |b, packages| {
            b.iter_batched(
                || packages.iter().rev().cloned().collect::<Vec<_>>(),
                |mut packages| {
                    canonicalize(&mut packages);
                    black_box(packages)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark merging outcomes into a document across platform counts
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.measurement_time(std::time::Duration::from_secs(10));
    let merger = LockMerger::new();

    for platforms in [1, 3, 5].iter() {
        for packages in [100, 500].iter() {
            group.throughput(Throughput::Elements((*platforms * *packages) as u64));
            let spec = synthetic_spec(20, *platforms);

            group.bench_with_input(
                BenchmarkId::new(format!("{platforms}_platforms"), packages),
                packages,
                |b, &packages| {
                    b.iter_batched(
                        || synthetic_outcomes(&spec, packages),
                        |outcomes| black_box(merger.merge(&spec, None, outcomes).unwrap()),
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

/// Benchmark diffing a lock against its predecessor
fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    let merger = LockMerger::new();

    for packages in [100, 1000].iter() {
        let spec = synthetic_spec(20, 3);
        let previous = merger
            .merge(&spec, None, synthetic_outcomes(&spec, *packages))
            .unwrap()
            .document;
        let current = merger
            .merge(&spec, None, synthetic_outcomes(&spec, *packages + *packages / 10))
            .unwrap()
            .document;

        group.bench_with_input(
            BenchmarkId::new("packages", packages),
            &(previous, current),
            |b, (previous, current)| {
                b.iter(|| black_box(LockDiff::between(previous, current)));
            },
        );
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_normalize, bench_merge, bench_diff
}
criterion_main!(benches);
