//! Explicitly invalidated memo of replica partitions.
//!
//! Partitioning is cheap, but a planner that resolves every rank of a large
//! job re-partitions the same group thousands of times. [`SelectionCache`]
//! keeps one [`ReplicaPartition`] per `(group, replica_count)` until the
//! owner invalidates it. It is a plain value owned by its caller, and a
//! [`ScaleEvent`] must be fed through [`SelectionCache::on_scale_event`]
//! before any lookup against the new topology.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::group::RankGroup;
use crate::replica::{Purpose, ReplicaPartition, ScaleEvent, SelectionResult};

/// `(group fingerprint, group length, requested replica count)`.
type CacheKey = (u64, usize, usize);

#[derive(Debug, Default)]
pub struct SelectionCache {
    entries: BTreeMap<CacheKey, ReplicaPartition>,
    generation: u64,
    hits: u64,
    misses: u64,
}

impl SelectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Partition of `group`, computed on first use.
    pub fn partition(&mut self, group: &RankGroup, replica_count: usize) -> &ReplicaPartition {
        let key = (group.fingerprint(), group.len(), replica_count);
        let fresh = match self.entries.get(&key) {
            Some(cached) => cached.group() != group,
            None => true,
        };
        if fresh {
            self.misses += 1;
            self.entries
                .insert(key, ReplicaPartition::new(group.clone(), replica_count));
        } else {
            self.hits += 1;
        }
        &self.entries[&key]
    }

    /// Cached equivalent of [`crate::replica::partition`].
    pub fn select(
        &mut self,
        rank: usize,
        group: &RankGroup,
        replica_count: usize,
        purpose: Purpose,
    ) -> Result<SelectionResult> {
        self.partition(group, replica_count).select(rank, purpose)
    }

    /// Drop every entry.
    pub fn invalidate(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    /// Invalidate for a topology change.
    pub fn on_scale_event(&mut self, event: &ScaleEvent) {
        tracing::debug!(
            kind = ?event.kind(),
            dropped = self.entries.len(),
            generation = self.generation + 1,
            "invalidating selection cache"
        );
        self.invalidate();
    }

    /// Bumped on every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
