//! Error and degradation types for replica partitioning.
//!
//! [`ConfigError`] is fatal: the caller handed in a topology that does not
//! match its own rank or violates a group invariant. [`Degradation`] is the
//! non-fatal counterpart: the requested replica count could not be honoured
//! and the partitioner fell back to a single replica.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration errors. Always propagated to the caller unhandled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A rank group with no members.
    #[error("empty rank group")]
    EmptyGroup,

    /// Rank group not in ascending order.
    #[error("rank group is not sorted: rank {rank} follows {previous}")]
    UnsortedGroup { previous: usize, rank: usize },

    /// Rank group lists the same rank twice.
    #[error("rank group contains duplicate rank {rank}")]
    DuplicateRank { rank: usize },

    /// Caller's rank is absent from the group it asked about.
    #[error("rank {rank} not found in supplied rank group of size {group_len}")]
    RankNotInGroup { rank: usize, group_len: usize },

    /// Positional index outside the group.
    #[error("index {index} out of range for rank group of size {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Scale-in removed every member of a replica.
    #[error("scale-in leaves replica {replica} with zero members")]
    EmptyReplicaAfterScaleIn { replica: usize },

    /// Scale-in group contains a rank the old group did not have.
    #[error("scale-in introduced rank {rank} absent from the old rank group")]
    ScaleInAddedRank { rank: usize },

    /// Declared faulted rank is still present after scale-in.
    #[error("faulted rank {rank} was not removed by scale-in")]
    FaultedRankNotRemoved { rank: usize },

    /// Scale-out lost or reordered a pre-existing rank.
    #[error("scale-out removed or reordered existing rank {rank}")]
    ScaleOutReordered { rank: usize },

    /// Scale-out produced a smaller group than before.
    #[error("scale-out shrank rank group from {old_len} to {new_len}")]
    ScaleOutShrunk { old_len: usize, new_len: usize },

    /// Parallelism sizes that cannot describe a valid job.
    #[error("invalid parallel configuration: {reason}")]
    InvalidParallelism { reason: String },
}

/// Non-fatal fallbacks applied to a requested replica count.
///
/// Both variants mean the partitioner continued with a single replica.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Not every replica could receive at least one rank.
    #[error("replica count {requested} exceeds rank group of size {group_len}, using 1 replica")]
    ReplicaCountExceedsGroup { requested: usize, group_len: usize },

    /// Fewer hosts than requested replicas.
    #[error("replica count {requested} exceeds {hosts} available hosts, using 1 replica")]
    InsufficientHosts { requested: usize, hosts: usize },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
