//! Save and load plans for the host training loop.
//!
//! The training loop asks a strategy what this rank should do for a
//! checkpoint; the strategy looks up the rank's communicator through a
//! [`GroupSource`] and runs the replica partition fresh on every call.
//!
//! ```ignore
//! let groups = SyntheticGroups::new(config)?;
//! let strategy = ReplicaStrategy::new(config, groups, GroupKind::DataParallel);
//! let plan = strategy.save_plan(rank)?;
//! if plan.write_model { /* persist model shard */ }
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ParallelConfig;
use crate::error::Result;
use crate::group::RankGroup;
use crate::replica::{partition, select_save_rank, LoadRole, Purpose, SelectionResult};
use crate::topology::{GroupKind, GroupSource};

/// What a rank writes during a checkpoint save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePlan {
    pub write_model: bool,
    pub write_optim: bool,
    pub selection: SelectionResult,
}

impl SavePlan {
    /// Rank writes nothing and only joins barriers.
    pub fn is_idle(&self) -> bool {
        !self.write_model && !self.write_optim
    }
}

/// What a rank does during a checkpoint load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub role: LoadRole,
    /// Rank whose broadcast every receiver in the replica waits for.
    pub broadcast_src: usize,
    /// Members of the broadcast communicator.
    pub group: RankGroup,
    pub selection: SelectionResult,
}

pub trait SaveStrategy {
    fn save_plan(&self, rank: usize) -> Result<SavePlan>;
}

pub trait LoadStrategy {
    fn load_plan(&self, rank: usize) -> Result<LoadPlan>;
}

/// Replica-aware strategy over one kind of communicator.
///
/// Optimizer writers of expert data-parallel groups follow the two-way
/// [`select_save_rank`] split; every other writer comes from the N-way
/// partition.
#[derive(Debug, Clone)]
pub struct ReplicaStrategy<G> {
    config: ParallelConfig,
    source: G,
    kind: GroupKind,
}

impl<G: GroupSource> ReplicaStrategy<G> {
    pub fn new(config: ParallelConfig, source: G, kind: GroupKind) -> Self {
        Self {
            config,
            source,
            kind,
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    fn select(&self, rank: usize, purpose: Purpose) -> Result<(RankGroup, SelectionResult)> {
        let group = self.source.group_ranks(self.kind, rank)?;
        let (replica_count, host_degradation) = self.config.effective_replica_count();
        let mut selection = partition(rank, &group, replica_count, purpose)?;
        if selection.degradation.is_none() {
            selection.degradation = host_degradation;
        }
        Ok((group, selection))
    }
}

impl<G: GroupSource> SaveStrategy for ReplicaStrategy<G> {
    fn save_plan(&self, rank: usize) -> Result<SavePlan> {
        let (group, selection) = self.select(rank, Purpose::SaveModel)?;
        let write_optim = match self.kind {
            GroupKind::ExpertDataParallel => {
                let position = group.require_position(rank)?;
                select_save_rank(group.ranks(), selection.replica_count, position)? == rank
            }
            _ => selection.is_optim_writer(rank),
        };
        Ok(SavePlan {
            write_model: selection.is_model_writer(rank),
            write_optim,
            selection,
        })
    }
}

impl<G: GroupSource> LoadStrategy for ReplicaStrategy<G> {
    fn load_plan(&self, rank: usize) -> Result<LoadPlan> {
        let (_, selection) = self.select(rank, Purpose::LoadBroadcast)?;
        Ok(LoadPlan {
            role: selection.load_role(rank),
            broadcast_src: selection.selected_model_rank,
            group: selection.process_group_ranks.clone(),
            selection,
        })
    }
}
