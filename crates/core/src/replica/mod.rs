//! Replica partitioning of rank groups.
//!
//! - [`ReplicaPartition`] / [`partition`] - N-way split with model/optim writers
//! - [`select_save_rank`] - two-way split with a single writer per half
//! - [`ScaleEvent`] - re-derivation after ranks are removed or added

mod partition;
mod save_rank;
mod scale;

pub use partition::{load_role, partition, LoadRole, Purpose, ReplicaPartition, SelectionResult};
pub use save_rank::select_save_rank;
pub use scale::{
    recompute_after_scale_in, recompute_after_scale_out, ReplicaChange, ScaleEvent, ScaleInOutcome,
    ScaleInReport, ScaleKind, ScaleOutOutcome, ScaleOutcome,
};
