//! Re-derivation after the rank set changes.
//!
//! Surviving ranks already agree on the old and new rank lists (the
//! orchestrator settles the new topology before calling in), so everything
//! here is set arithmetic over those two lists. The new selection is always
//! a full [`partition`] of the new group; membership is never patched
//! incrementally.

use serde::{Deserialize, Serialize};

use super::partition::{partition, Purpose, ReplicaPartition, SelectionResult};
use crate::error::{ConfigError, Result};
use crate::group::RankGroup;

/// Whether a topology change shrank, grew or kept the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    ScaleIn,
    ScaleOut,
    Unchanged,
}

/// A change of live ranks agreed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleEvent {
    pub old_rank_group: RankGroup,
    pub new_rank_group: RankGroup,
    /// Rank declared faulted, if the change was fault-driven.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faulted_rank: Option<usize>,
}

impl ScaleEvent {
    pub fn new(old_rank_group: RankGroup, new_rank_group: RankGroup) -> Self {
        Self {
            old_rank_group,
            new_rank_group,
            faulted_rank: None,
        }
    }

    pub fn with_faulted_rank(mut self, rank: usize) -> Self {
        self.faulted_rank = Some(rank);
        self
    }

    /// A same-sized group with different members counts as scale-in, which
    /// then rejects the unknown ranks.
    pub fn kind(&self) -> ScaleKind {
        let (old, new) = (self.old_rank_group.len(), self.new_rank_group.len());
        if self.faulted_rank.is_none() && self.old_rank_group == self.new_rank_group {
            ScaleKind::Unchanged
        } else if new > old && self.faulted_rank.is_none() {
            ScaleKind::ScaleOut
        } else {
            ScaleKind::ScaleIn
        }
    }

    /// Recompute `rank`'s view of the new topology.
    pub fn recompute(
        &self,
        rank: usize,
        replica_count: usize,
        purpose: Purpose,
    ) -> Result<ScaleOutcome> {
        match self.kind() {
            ScaleKind::Unchanged => Ok(ScaleOutcome::Unchanged(partition(
                rank,
                &self.new_rank_group,
                replica_count,
                purpose,
            )?)),
            ScaleKind::ScaleOut => Ok(ScaleOutcome::ScaleOut(recompute_after_scale_out(
                rank,
                &self.old_rank_group,
                &self.new_rank_group,
                replica_count,
                purpose,
            )?)),
            ScaleKind::ScaleIn => Ok(ScaleOutcome::ScaleIn(recompute_after_scale_in(
                rank,
                &self.old_rank_group,
                &self.new_rank_group,
                self.faulted_rank,
                replica_count,
                purpose,
            )?)),
        }
    }
}

/// Result of [`ScaleEvent::recompute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleOutcome {
    ScaleIn(ScaleInOutcome),
    ScaleOut(ScaleOutOutcome),
    Unchanged(SelectionResult),
}

impl ScaleOutcome {
    /// Selection against the new group.
    pub fn selection(&self) -> &SelectionResult {
        match self {
            ScaleOutcome::ScaleIn(o) => &o.selection,
            ScaleOutcome::ScaleOut(o) => &o.selection,
            ScaleOutcome::Unchanged(s) => s,
        }
    }
}

/// Where the removed ranks sat in the old partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleInReport {
    /// Positions in the old group whose ranks are gone, ascending.
    pub fault_indices_in_old_group: Vec<usize>,
    /// Of those, the ones in the caller's old replica, as offsets from the
    /// replica's first position.
    pub fault_local_indices_in_replica: Vec<usize>,
    /// A removed rank sat in replica 0.
    pub was_first_replica_faulted: bool,
    /// A removed rank sat in the caller's replica.
    pub fault_in_my_replica: bool,
}

/// What happened to one replica of the old partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplicaChange {
    Unaffected,
    /// Lost members, none of them a designated writer.
    Shrunk { removed: Vec<usize> },
    /// Lost a designated writer. `successor`, the first surviving member,
    /// now carries this replica's data.
    WriterLost {
        removed: Vec<usize>,
        lost_writer: usize,
        successor: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleInOutcome {
    pub report: ScaleInReport,
    /// One entry per old replica, in replica order.
    pub replicas: Vec<ReplicaChange>,
    /// Selection against the new group.
    pub selection: SelectionResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleOutOutcome {
    /// Ranks present only in the new group, ascending.
    pub added: Vec<usize>,
    pub selection: SelectionResult,
}

/// Locate removed ranks in the old partition, classify each old replica and
/// re-partition `new_rank_group` for `rank`.
///
/// `rank` must be a survivor: present in both groups.
pub fn recompute_after_scale_in(
    rank: usize,
    old_rank_group: &RankGroup,
    new_rank_group: &RankGroup,
    faulted_rank: Option<usize>,
    replica_count: usize,
    purpose: Purpose,
) -> Result<ScaleInOutcome> {
    if let Some(&added) = new_rank_group
        .ranks()
        .iter()
        .find(|&&r| !old_rank_group.contains(r))
    {
        return Err(ConfigError::ScaleInAddedRank { rank: added });
    }
    if let Some(faulted) = faulted_rank {
        old_rank_group.require_position(faulted)?;
        if new_rank_group.contains(faulted) {
            return Err(ConfigError::FaultedRankNotRemoved { rank: faulted });
        }
    }

    let old = ReplicaPartition::new(old_rank_group.clone(), replica_count);
    let my_replica = old.replica_of(rank)?;

    let fault_indices_in_old_group: Vec<usize> = old_rank_group
        .ranks()
        .iter()
        .enumerate()
        .filter(|(_, &r)| !new_rank_group.contains(r))
        .map(|(pos, _)| pos)
        .collect();

    let mut replicas = Vec::with_capacity(old.replica_count());
    for (index, bounds) in old.bounds().iter().enumerate() {
        let removed: Vec<usize> = old_rank_group.ranks()[bounds.clone()]
            .iter()
            .copied()
            .filter(|&r| !new_rank_group.contains(r))
            .collect();
        if removed.is_empty() {
            replicas.push(ReplicaChange::Unaffected);
            continue;
        }
        if removed.len() == bounds.len() {
            return Err(ConfigError::EmptyReplicaAfterScaleIn { replica: index });
        }

        let (optim, model) = old.writers(index);
        let lost_writer = [optim, model].into_iter().find(|w| removed.contains(w));
        match lost_writer {
            Some(lost_writer) => {
                let successor = old
                    .replica(index)
                    .iter()
                    .copied()
                    .find(|&r| new_rank_group.contains(r))
                    .ok_or(ConfigError::EmptyReplicaAfterScaleIn { replica: index })?;
                tracing::info!(
                    replica = index,
                    lost_writer,
                    successor,
                    "replica writer removed by scale-in"
                );
                replicas.push(ReplicaChange::WriterLost {
                    removed,
                    lost_writer,
                    successor,
                });
            }
            None => replicas.push(ReplicaChange::Shrunk { removed }),
        }
    }

    let my_bounds = old.bounds()[my_replica].clone();
    let fault_local_indices_in_replica: Vec<usize> = fault_indices_in_old_group
        .iter()
        .filter(|&&pos| my_bounds.contains(&pos))
        .map(|&pos| pos - my_bounds.start)
        .collect();
    let was_first_replica_faulted = fault_indices_in_old_group
        .iter()
        .any(|pos| old.bounds()[0].contains(pos));
    let fault_in_my_replica = !fault_local_indices_in_replica.is_empty();

    let selection = partition(rank, new_rank_group, replica_count, purpose)?;

    tracing::debug!(
        rank,
        removed = fault_indices_in_old_group.len(),
        was_first_replica_faulted,
        fault_in_my_replica,
        "recomputed replicas after scale-in"
    );

    Ok(ScaleInOutcome {
        report: ScaleInReport {
            fault_indices_in_old_group,
            fault_local_indices_in_replica,
            was_first_replica_faulted,
            fault_in_my_replica,
        },
        replicas,
        selection,
    })
}

/// Check `new_rank_group` only adds ranks and re-partition it for `rank`.
pub fn recompute_after_scale_out(
    rank: usize,
    old_rank_group: &RankGroup,
    new_rank_group: &RankGroup,
    replica_count: usize,
    purpose: Purpose,
) -> Result<ScaleOutOutcome> {
    if new_rank_group.len() < old_rank_group.len() {
        return Err(ConfigError::ScaleOutShrunk {
            old_len: old_rank_group.len(),
            new_len: new_rank_group.len(),
        });
    }

    // Old ranks must appear in `new` in the same relative order.
    let mut cursor = new_rank_group.ranks().iter();
    for &existing in old_rank_group.ranks() {
        if !cursor.any(|&r| r == existing) {
            return Err(ConfigError::ScaleOutReordered { rank: existing });
        }
    }

    let added: Vec<usize> = new_rank_group
        .ranks()
        .iter()
        .copied()
        .filter(|&r| !old_rank_group.contains(r))
        .collect();

    let selection = partition(rank, new_rank_group, replica_count, purpose)?;

    tracing::debug!(rank, added = added.len(), "recomputed replicas after scale-out");

    Ok(ScaleOutOutcome { added, selection })
}
