//! Replica partitioning and writer-rank selection for data-parallel groups.
//!
//! Every rank of a distributed job computes, locally and without
//! communication, how its data-parallel group splits into redundant
//! replicas and which ranks of its replica write model and optimizer state.
//! Identical inputs give identical answers on every rank.
//!
//! - [`ParallelConfig`] - job-wide parallelism degrees and replica count
//! - [`RankGroup`] - validated ordered rank list of one communicator
//! - [`replica::partition`] - N-way replica split with model/optim writers
//! - [`replica::select_save_rank`] - two-way split with one writer per half
//! - [`ScaleEvent`] - re-derivation after scale-in or scale-out
//! - [`ReplicaStrategy`] - save/load plans for the host training loop
//!
//! # Usage
//!
//! ```
//! use rankpart_core::{partition, Purpose, RankGroup};
//!
//! let group = RankGroup::from_range(0, 8, 1).unwrap();
//! let sel = partition(5, &group, 4, Purpose::SaveModel).unwrap();
//! assert_eq!(sel.process_group_ranks.ranks(), &[4, 5]);
//! assert_eq!(sel.selected_optim_rank, 4);
//! assert_eq!(sel.selected_model_rank, 5);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod group;
pub mod replica;
pub mod strategy;
pub mod topology;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::SelectionCache;
pub use config::{ParallelConfig, RankIdentity};
pub use error::{ConfigError, Degradation, Result};
pub use group::RankGroup;
pub use replica::{
    load_role, partition, recompute_after_scale_in, recompute_after_scale_out, select_save_rank,
    LoadRole, Purpose, ReplicaChange, ReplicaPartition, ScaleEvent, ScaleInOutcome, ScaleInReport,
    ScaleKind, ScaleOutOutcome, ScaleOutcome, SelectionResult,
};
pub use strategy::{LoadPlan, LoadStrategy, ReplicaStrategy, SavePlan, SaveStrategy};
pub use topology::{GroupKind, GroupSource, SyntheticGroups};
