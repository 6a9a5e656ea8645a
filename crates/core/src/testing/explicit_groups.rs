use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};
use crate::group::RankGroup;
use crate::topology::{GroupKind, GroupSource};

/// A group source that returns fixed, caller-supplied communicators,
/// standing in for the framework's group introspection.
#[derive(Debug, Clone, Default)]
pub struct ExplicitGroups {
    groups: BTreeMap<GroupKind, Vec<RankGroup>>,
}

impl ExplicitGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one communicator of `kind`.
    pub fn with_group(mut self, kind: GroupKind, group: RankGroup) -> Self {
        self.groups.entry(kind).or_default().push(group);
        self
    }
}

impl GroupSource for ExplicitGroups {
    fn group_ranks(&self, kind: GroupKind, rank: usize) -> Result<RankGroup> {
        self.groups
            .get(&kind)
            .and_then(|groups| groups.iter().find(|g| g.contains(rank)))
            .cloned()
            .ok_or(ConfigError::RankNotInGroup { rank, group_len: 0 })
    }
}
