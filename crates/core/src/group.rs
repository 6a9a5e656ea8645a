//! Ordered rank groups.
//!
//! A [`RankGroup`] is the ordered list of global ranks in one communicator,
//! e.g. one data-parallel group. Every index computation in this crate runs
//! over a `RankGroup`, so the invariants are checked once at construction:
//! non-empty, strictly ascending, no duplicates.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Non-empty, strictly ascending list of global ranks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RankGroup {
    ranks: Vec<usize>,
}

impl RankGroup {
    /// Validate and wrap a list of ranks.
    ///
    /// Ranks are not re-sorted: a group handed in out of order is a topology
    /// mismatch on the caller's side and is reported as such.
    pub fn new(ranks: Vec<usize>) -> Result<Self> {
        if ranks.is_empty() {
            return Err(ConfigError::EmptyGroup);
        }
        for pair in ranks.windows(2) {
            let (previous, rank) = (pair[0], pair[1]);
            if previous == rank {
                return Err(ConfigError::DuplicateRank { rank });
            }
            if previous > rank {
                return Err(ConfigError::UnsortedGroup { previous, rank });
            }
        }
        Ok(Self { ranks })
    }

    /// Ranks `start, start + step, ...` below `end`.
    ///
    /// # Panics
    /// Panics if `step == 0`.
    pub fn from_range(start: usize, end: usize, step: usize) -> Result<Self> {
        assert!(step > 0, "step must be > 0");
        Self::new((start..end).step_by(step).collect())
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Always `false`; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// First (lowest) rank.
    pub fn first(&self) -> usize {
        self.ranks[0]
    }

    pub fn contains(&self, rank: usize) -> bool {
        self.ranks.binary_search(&rank).is_ok()
    }

    /// Position of `rank` within the group.
    pub fn position(&self, rank: usize) -> Option<usize> {
        self.ranks.binary_search(&rank).ok()
    }

    /// Like [`position`][Self::position], but a missing rank is fatal.
    pub fn require_position(&self, rank: usize) -> Result<usize> {
        self.position(rank).ok_or(ConfigError::RankNotInGroup {
            rank,
            group_len: self.len(),
        })
    }

    /// Sub-group covering `range` positions. A sub-slice of a valid group is
    /// valid, so this only fails on an empty or out-of-bounds range.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        if range.end > self.len() {
            return Err(ConfigError::IndexOutOfRange {
                index: range.end,
                len: self.len(),
            });
        }
        if range.is_empty() {
            return Err(ConfigError::EmptyGroup);
        }
        Ok(Self {
            ranks: self.ranks[range].to_vec(),
        })
    }

    /// Order-sensitive fingerprint used as a cache key.
    pub fn fingerprint(&self) -> u64 {
        // FNV-1a over the little-endian rank bytes; stable across processes.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for rank in &self.ranks {
            for byte in (*rank as u64).to_le_bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        hash
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.ranks
    }
}

impl TryFrom<Vec<usize>> for RankGroup {
    type Error = ConfigError;

    fn try_from(ranks: Vec<usize>) -> Result<Self> {
        Self::new(ranks)
    }
}

impl<'de> Deserialize<'de> for RankGroup {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let ranks = Vec::<usize>::deserialize(deserializer)?;
        Self::new(ranks).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for RankGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, rank) in self.ranks.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{rank}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_sorted_unique() {
        let g = RankGroup::new(vec![0, 2, 4]).unwrap();
        assert_eq!(g.ranks(), &[0, 2, 4]);
        assert_eq!(g.len(), 3);
        assert_eq!(g.first(), 0);
        assert!(!g.is_empty());
    }

    #[test]
    fn new_rejects_empty() {
        assert_eq!(RankGroup::new(vec![]), Err(ConfigError::EmptyGroup));
    }

    #[test]
    fn new_rejects_unsorted() {
        assert_eq!(
            RankGroup::new(vec![0, 4, 2]),
            Err(ConfigError::UnsortedGroup {
                previous: 4,
                rank: 2
            })
        );
    }

    #[test]
    fn new_rejects_duplicates() {
        assert_eq!(
            RankGroup::new(vec![1, 1, 2]),
            Err(ConfigError::DuplicateRank { rank: 1 })
        );
    }

    #[test]
    fn from_range_strided() {
        let g = RankGroup::from_range(1, 16, 4).unwrap();
        assert_eq!(g.ranks(), &[1, 5, 9, 13]);
    }

    #[test]
    fn position_and_require_position() {
        let g = RankGroup::new(vec![3, 7, 11]).unwrap();
        assert_eq!(g.position(7), Some(1));
        assert_eq!(g.position(8), None);
        assert!(g.contains(11));
        assert_eq!(
            g.require_position(37),
            Err(ConfigError::RankNotInGroup {
                rank: 37,
                group_len: 3
            })
        );
    }

    #[test]
    fn slice_bounds() {
        let g = RankGroup::from_range(0, 8, 1).unwrap();
        assert_eq!(g.slice(2..5).unwrap().ranks(), &[2, 3, 4]);
        assert!(g.slice(4..4).is_err());
        assert!(g.slice(6..9).is_err());
    }

    #[test]
    fn fingerprint_is_order_and_content_sensitive() {
        let a = RankGroup::new(vec![0, 1, 2]).unwrap();
        let b = RankGroup::new(vec![0, 1, 3]).unwrap();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn deserialize_validates() {
        let ok: RankGroup = serde_json::from_str("[0,2,4]").unwrap();
        assert_eq!(ok.ranks(), &[0, 2, 4]);
        assert!(serde_json::from_str::<RankGroup>("[]").is_err());
        assert!(serde_json::from_str::<RankGroup>("[2,1]").is_err());
    }

    #[test]
    fn display_compact() {
        let g = RankGroup::new(vec![0, 8, 16]).unwrap();
        assert_eq!(g.to_string(), "[0,8,16]");
    }
}
