//! Replica partitioning and writer-rank selection.
//!
//! A data-parallel [`RankGroup`] of `N` ranks is split into `r` contiguous
//! replica slices. Every rank runs the same arithmetic on the same inputs and
//! therefore agrees on membership and writers without communicating.
//!
//! # Boundary rule
//!
//! With `base = N / r`, slice `k < r - 1` covers positions
//! `[k * base, (k + 1) * base)` and the last slice covers
//! `[(r - 1) * base, N)`, absorbing any remainder:
//!
//! ```text
//! N = 10, r = 3:   [0 1 2] [3 4 5] [6 7 8 9]
//! ```
//!
//! # Writers
//!
//! With more than one replica, the first rank of each slice writes optimizer
//! state and the second writes model state. A single-rank slice does both.
//! With one replica, `group[0]` does both.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Degradation, Result};
use crate::group::RankGroup;

/// Why a selection is being made. Does not change which ranks are chosen,
/// only how the caller interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    SaveOptim,
    SaveModel,
    LoadBroadcast,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::SaveOptim => "save_optim",
            Purpose::SaveModel => "save_model",
            Purpose::LoadBroadcast => "load_broadcast",
        };
        f.write_str(name)
    }
}

/// A rank group split into contiguous replica slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaPartition {
    group: RankGroup,
    bounds: Vec<Range<usize>>,
    requested: usize,
    degradation: Option<Degradation>,
}

impl ReplicaPartition {
    /// Split `group` into `replica_count` slices.
    ///
    /// Never fails: a count of 0 or 1 means one replica, and a count larger
    /// than the group degrades to one replica with a logged warning.
    pub fn new(group: RankGroup, replica_count: usize) -> Self {
        let requested = replica_count;
        let len = group.len();
        let mut degradation = None;
        let mut count = replica_count.max(1);

        if count > 1 && len / count < 1 {
            let d = Degradation::ReplicaCountExceedsGroup {
                requested,
                group_len: len,
            };
            tracing::warn!(requested, group_len = len, "{d}");
            degradation = Some(d);
            count = 1;
        }

        let base = len / count;
        let bounds = (0..count)
            .map(|k| {
                let start = k * base;
                let end = if k + 1 == count { len } else { start + base };
                start..end
            })
            .collect();

        Self {
            group,
            bounds,
            requested,
            degradation,
        }
    }

    /// The unpartitioned group.
    pub fn group(&self) -> &RankGroup {
        &self.group
    }

    /// Position ranges of every slice, in replica order.
    pub fn bounds(&self) -> &[Range<usize>] {
        &self.bounds
    }

    /// Number of slices actually produced.
    pub fn replica_count(&self) -> usize {
        self.bounds.len()
    }

    /// Replica count the caller asked for.
    pub fn requested_replica_count(&self) -> usize {
        self.requested
    }

    pub fn degradation(&self) -> Option<Degradation> {
        self.degradation
    }

    /// Ranks of slice `index`.
    ///
    /// # Panics
    /// Panics if `index >= replica_count()`.
    pub fn replica(&self, index: usize) -> &[usize] {
        &self.group.ranks()[self.bounds[index].clone()]
    }

    /// Ranks of slice `index` as a standalone group.
    pub fn replica_group(&self, index: usize) -> Result<RankGroup> {
        let range = self
            .bounds
            .get(index)
            .cloned()
            .ok_or(ConfigError::IndexOutOfRange {
                index,
                len: self.bounds.len(),
            })?;
        self.group.slice(range)
    }

    /// Iterator over all slices in replica order.
    pub fn replicas(&self) -> impl Iterator<Item = &[usize]> + '_ {
        (0..self.bounds.len()).map(move |i| self.replica(i))
    }

    /// Slice index that owns `position` in the group.
    pub fn replica_index_of_position(&self, position: usize) -> Option<usize> {
        self.bounds.iter().position(|b| b.contains(&position))
    }

    /// Slice index that owns `rank`.
    pub fn replica_of(&self, rank: usize) -> Result<usize> {
        let position = self.group.require_position(rank)?;
        // Every in-range position belongs to exactly one slice.
        Ok(self
            .replica_index_of_position(position)
            .unwrap_or(self.bounds.len() - 1))
    }

    /// `(optim_writer, model_writer)` of slice `index`.
    pub fn writers(&self, index: usize) -> (usize, usize) {
        if self.replica_count() == 1 {
            let first = self.group.first();
            return (first, first);
        }
        let slice = self.replica(index);
        let optim = slice[0];
        let model = slice.get(1).copied().unwrap_or(optim);
        (optim, model)
    }

    /// Resolve the selection for `rank`.
    pub fn select(&self, rank: usize, purpose: Purpose) -> Result<SelectionResult> {
        let replica_index = self.replica_of(rank)?;
        let (selected_optim_rank, selected_model_rank) = self.writers(replica_index);
        let process_group_ranks = self.replica_group(replica_index)?;

        tracing::debug!(
            rank,
            %purpose,
            replica_index,
            replica_count = self.replica_count(),
            selected_optim_rank,
            selected_model_rank,
            "resolved replica selection"
        );

        Ok(SelectionResult {
            selected_model_rank,
            selected_optim_rank,
            process_group_ranks,
            all_group_ranks: self.group.clone(),
            replica_index,
            replica_count: self.replica_count(),
            purpose,
            degradation: self.degradation,
        })
    }
}

/// Writers and membership of the replica containing the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Writes (save) or sources and broadcasts (load) model state.
    pub selected_model_rank: usize,
    /// Writes or independently loads optimizer state.
    pub selected_optim_rank: usize,
    /// Members of the caller's replica.
    pub process_group_ranks: RankGroup,
    /// The group before partitioning.
    pub all_group_ranks: RankGroup,
    /// Index of the caller's replica.
    pub replica_index: usize,
    /// Number of replicas after any degradation.
    pub replica_count: usize,
    pub purpose: Purpose,
    /// Set when the requested replica count could not be honoured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
}

impl SelectionResult {
    /// Whether `rank` persists model state for its replica.
    pub fn is_model_writer(&self, rank: usize) -> bool {
        self.selected_model_rank == rank
    }

    /// Whether `rank` persists optimizer state for its replica.
    pub fn is_optim_writer(&self, rank: usize) -> bool {
        self.selected_optim_rank == rank
    }

    /// Role of `rank` when loading with [`Purpose::LoadBroadcast`].
    pub fn load_role(&self, rank: usize) -> LoadRole {
        load_role(rank, self)
    }
}

/// Part a rank plays in a broadcast load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadRole {
    /// Reads model state from storage and broadcasts it to the replica.
    Source,
    /// Reads the optimizer shard from storage in parallel with the source.
    OptimLoader,
    /// Only receives broadcasts; never touches storage.
    Receiver,
}

/// Classify `rank` within `selection`.
///
/// When model and optimizer writers coincide that rank is the [`LoadRole::Source`].
pub fn load_role(rank: usize, selection: &SelectionResult) -> LoadRole {
    if rank == selection.selected_model_rank {
        LoadRole::Source
    } else if rank == selection.selected_optim_rank {
        LoadRole::OptimLoader
    } else {
        LoadRole::Receiver
    }
}

/// Partition `rank_group` into `replica_count` replicas and resolve the
/// writers of the replica containing `rank`.
///
/// Fails only if `rank` is not a member of `rank_group`.
pub fn partition(
    rank: usize,
    rank_group: &RankGroup,
    replica_count: usize,
    purpose: Purpose,
) -> Result<SelectionResult> {
    ReplicaPartition::new(rank_group.clone(), replica_count).select(rank, purpose)
}
