use crate::config::ParallelConfig;
use crate::group::RankGroup;

/// Build a group from any rank iterator.
///
/// # Panics
/// Panics if the ranks do not form a valid group.
pub fn group(ranks: impl IntoIterator<Item = usize>) -> RankGroup {
    RankGroup::new(ranks.into_iter().collect()).expect("test ranks must form a valid group")
}

/// 8 ranks, tp=2, pp=2, one host of 8 ranks.
pub fn megatron_8x_tp2_pp2() -> ParallelConfig {
    ParallelConfig {
        world_size: 8,
        tensor_parallel_size: 2,
        pipeline_parallel_size: 2,
        local_world_size: 8,
        ..ParallelConfig::single_process()
    }
}

/// Pure data parallelism over `hosts * ranks_per_host` ranks.
pub fn multi_host_dp(hosts: usize, ranks_per_host: usize, replica_count: usize) -> ParallelConfig {
    ParallelConfig::data_parallel(hosts * ranks_per_host)
        .with_local_world_size(ranks_per_host)
        .with_replica_count(replica_count)
}
