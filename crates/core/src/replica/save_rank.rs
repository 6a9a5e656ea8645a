//! Single-writer selection for optimizer shards.
//!
//! Unlike [`super::partition`], this path only ever splits a group in two:
//! any replica count above one is treated as two. Ranks in the first half of
//! the group defer to position 0, ranks in the second half to position
//! `len / 2`.

use crate::error::{ConfigError, Result};

/// Writer for the rank at `local_rank_index` in `group_ranks`.
pub fn select_save_rank(
    group_ranks: &[usize],
    replica_count: usize,
    local_rank_index: usize,
) -> Result<usize> {
    let group_size = group_ranks.len();
    if group_size == 0 {
        return Err(ConfigError::EmptyGroup);
    }
    if local_rank_index >= group_size {
        return Err(ConfigError::IndexOutOfRange {
            index: local_rank_index,
            len: group_size,
        });
    }
    if group_size == 1 {
        return Ok(group_ranks[0]);
    }

    let replica_count = if replica_count > 1 { 2 } else { 1 };
    let replica_group_len = group_size / replica_count;
    let replica_group_idx = local_rank_index / replica_group_len;
    let selected = (replica_group_idx * replica_group_len) % group_size;
    Ok(group_ranks[selected])
}
