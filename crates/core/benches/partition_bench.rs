//! Criterion benchmarks for replica partitioning.
//!
//! Covers the per-rank partition path, the flat two-way `select_save_rank`,
//! and a whole-job plan resolved through `SelectionCache`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rankpart_core::{
    partition, select_save_rank, GroupKind, ParallelConfig, Purpose, RankGroup, SelectionCache,
    SyntheticGroups,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strided group of `len` ranks, as a tp=8 data-parallel group would look.
fn make_group(len: usize) -> RankGroup {
    RankGroup::from_range(0, len * 8, 8).expect("failed to build rank group")
}

// ---------------------------------------------------------------------------
// Per-rank selection
// ---------------------------------------------------------------------------

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");

    for &len in &[8, 256, 4096] {
        let ranks = make_group(len);
        let rank = ranks.ranks()[len - 1];
        group.bench_with_input(BenchmarkId::new("group_len", len), &len, |b, _| {
            b.iter(|| {
                partition(black_box(rank), black_box(&ranks), 4, Purpose::SaveModel)
                    .expect("partition failed")
            });
        });
    }
    group.finish();
}

fn bench_select_save_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_save_rank");

    for &len in &[8, 256, 4096] {
        let ranks: Vec<usize> = (0..len).collect();
        group.bench_with_input(BenchmarkId::new("group_len", len), &len, |b, _| {
            b.iter(|| {
                select_save_rank(black_box(&ranks), 2, black_box(len - 1))
                    .expect("select_save_rank failed")
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Whole-job plan
// ---------------------------------------------------------------------------

fn bench_job_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_plan");

    for &world_size in &[64, 1024, 8192] {
        let cfg = ParallelConfig::new(world_size, 8, 1)
            .expect("invalid parallel config")
            .with_local_world_size(8)
            .with_replica_count(2);
        let groups = SyntheticGroups::new(cfg).expect("invalid parallel config");
        let dp_groups = groups
            .all_groups(GroupKind::DataParallel)
            .expect("failed to synthesize groups");

        group.bench_with_input(
            BenchmarkId::new("world_size", world_size),
            &world_size,
            |b, _| {
                b.iter(|| {
                    let mut cache = SelectionCache::new();
                    for dp in &dp_groups {
                        for &rank in dp.ranks() {
                            black_box(
                                cache
                                    .select(rank, dp, 2, Purpose::SaveOptim)
                                    .expect("select failed"),
                            );
                        }
                    }
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

criterion_group!(selection, bench_partition, bench_select_save_rank);

criterion_group!(planning, bench_job_plan);

criterion_main!(selection, planning);
