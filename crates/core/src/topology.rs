//! Communicator membership, synthesized or supplied.
//!
//! The partitioner never talks to a communication library. It needs only the
//! ordered ranks of one communicator, which the host framework provides via
//! [`GroupSource`]. [`SyntheticGroups`] derives the same lists from a
//! [`ParallelConfig`] for callers (and tests) that have no framework at hand.
//!
//! # Rank order
//!
//! Ranks are laid out tensor-parallel fastest, then context, then data, then
//! pipeline. For a pipeline stage `s` the stage block is
//! `[s * W/pp, (s + 1) * W/pp)` and:
//!
//! | Group | Members of the stage block |
//! |-------|----------------------------|
//! | data-parallel | stride `tp * cp` |
//! | data-parallel with context | stride `tp` |
//! | expert data-parallel | stride `tp * ep` |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ParallelConfig;
use crate::error::{ConfigError, Result};
use crate::group::RankGroup;

/// Which communicator a rank group describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Ranks holding identical model shards.
    DataParallel,
    /// Data-parallel group spanning the context-parallel dimension.
    DataParallelWithContext,
    /// Data-parallel group of expert (MoE) parameters.
    ExpertDataParallel,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupKind::DataParallel => "data_parallel",
            GroupKind::DataParallelWithContext => "data_parallel_with_context",
            GroupKind::ExpertDataParallel => "expert_data_parallel",
        };
        f.write_str(name)
    }
}

/// Framework hook: the ordered global ranks of the communicator of `kind`
/// that `rank` belongs to.
pub trait GroupSource: Send + Sync {
    fn group_ranks(&self, kind: GroupKind, rank: usize) -> Result<RankGroup>;
}

/// Derives communicator membership from a [`ParallelConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticGroups {
    config: ParallelConfig,
}

impl SyntheticGroups {
    /// Validates `config` once; every later query relies on it.
    pub fn new(config: ParallelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    /// Stride between consecutive members of a group of `kind`.
    fn stride(&self, kind: GroupKind) -> usize {
        let tp = self.config.tensor_parallel_size;
        match kind {
            GroupKind::DataParallel => tp * self.config.context_parallel_size,
            GroupKind::DataParallelWithContext => tp,
            GroupKind::ExpertDataParallel => tp * self.config.expert_parallel_size,
        }
    }

    pub fn data_parallel_group(&self, rank: usize) -> Result<RankGroup> {
        self.group_ranks(GroupKind::DataParallel, rank)
    }

    pub fn data_parallel_group_with_context(&self, rank: usize) -> Result<RankGroup> {
        self.group_ranks(GroupKind::DataParallelWithContext, rank)
    }

    pub fn expert_data_parallel_group(&self, rank: usize) -> Result<RankGroup> {
        self.group_ranks(GroupKind::ExpertDataParallel, rank)
    }

    /// Every group of `kind`, ordered by first rank.
    pub fn all_groups(&self, kind: GroupKind) -> Result<Vec<RankGroup>> {
        let block = self.config.ranks_per_pipeline_stage();
        let stride = self.stride(kind);
        let mut groups = Vec::with_capacity(self.config.pipeline_parallel_size * stride);
        for stage in 0..self.config.pipeline_parallel_size {
            let start = stage * block;
            for offset in 0..stride {
                groups.push(RankGroup::from_range(start + offset, start + block, stride)?);
            }
        }
        Ok(groups)
    }
}

impl GroupSource for SyntheticGroups {
    fn group_ranks(&self, kind: GroupKind, rank: usize) -> Result<RankGroup> {
        if rank >= self.config.world_size {
            return Err(ConfigError::RankNotInGroup {
                rank,
                group_len: self.config.world_size,
            });
        }
        let block = self.config.ranks_per_pipeline_stage();
        let start = (rank / block) * block;
        let stride = self.stride(kind);
        let first = start + (rank - start) % stride;
        RankGroup::from_range(first, start + block, stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(cfg: ParallelConfig) -> SyntheticGroups {
        SyntheticGroups::new(cfg).unwrap()
    }

    #[test]
    fn pure_data_parallel_is_whole_world() {
        let g = groups(ParallelConfig::data_parallel(8));
        for rank in 0..8 {
            assert_eq!(
                g.data_parallel_group(rank).unwrap().ranks(),
                &[0, 1, 2, 3, 4, 5, 6, 7]
            );
        }
    }

    #[test]
    fn tensor_and_pipeline_parallel_groups() {
        // 16 ranks, tp=2, pp=2 -> dp=4; stage blocks [0,8) and [8,16).
        let g = groups(ParallelConfig::new(16, 2, 2).unwrap());
        assert_eq!(g.data_parallel_group(0).unwrap().ranks(), &[0, 2, 4, 6]);
        assert_eq!(g.data_parallel_group(5).unwrap().ranks(), &[1, 3, 5, 7]);
        assert_eq!(g.data_parallel_group(10).unwrap().ranks(), &[8, 10, 12, 14]);
    }

    #[test]
    fn context_parallel_widens_stride() {
        // 16 ranks, tp=2, cp=2 -> dp=4.
        let cfg = ParallelConfig::new(16, 2, 1)
            .unwrap()
            .with_context_parallel(2);
        let g = groups(cfg);
        assert_eq!(g.data_parallel_group(1).unwrap().ranks(), &[1, 5, 9, 13]);
        assert_eq!(
            g.data_parallel_group_with_context(1).unwrap().ranks(),
            &[1, 3, 5, 7, 9, 11, 13, 15]
        );
    }

    #[test]
    fn expert_data_parallel_groups() {
        // 16 ranks, tp=2, ep=2 -> expert dp group stride 4.
        let cfg = ParallelConfig::new(16, 2, 1).unwrap().with_expert_parallel(2);
        let g = groups(cfg);
        assert_eq!(
            g.expert_data_parallel_group(6).unwrap().ranks(),
            &[2, 6, 10, 14]
        );
    }

    #[test]
    fn all_groups_partition_the_world() {
        let g = groups(ParallelConfig::new(24, 2, 3).unwrap());
        let all = g.all_groups(GroupKind::DataParallel).unwrap();
        assert_eq!(all.len(), 6);
        let mut seen: Vec<usize> = all.iter().flat_map(|g| g.ranks().to_vec()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..24).collect::<Vec<_>>());
        for group in &all {
            for &rank in group.ranks() {
                assert_eq!(&g.data_parallel_group(rank).unwrap(), group);
            }
        }
    }

    #[test]
    fn rank_outside_world_is_fatal() {
        let g = groups(ParallelConfig::data_parallel(4));
        assert_eq!(
            g.data_parallel_group(4),
            Err(ConfigError::RankNotInGroup {
                rank: 4,
                group_len: 4
            })
        );
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let cfg = ParallelConfig::data_parallel(8).with_context_parallel(3);
        assert!(SyntheticGroups::new(cfg).is_err());
    }
}
