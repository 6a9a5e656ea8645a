//! Shared test utilities for rankpart-core.
//!
//! This module provides a caller-supplied [`GroupSource`](crate::topology::GroupSource)
//! and a few canonical job topologies for unit and integration tests.

mod explicit_groups;
mod topologies;

pub use explicit_groups::ExplicitGroups;
pub use topologies::{group, megatron_8x_tp2_pp2, multi_host_dp};
