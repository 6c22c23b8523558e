//! Contiguous ownership map for a distributed index space.
//!
//! A global index range `[0, M)` is split into `P` contiguous slices,
//! one per rank, with a uniform block size: each logical index carries
//! `b` scalar components stored contiguously.

use std::ops::Range;
use std::sync::Arc;

use crate::comm::Communicator;
use crate::error::{InterpError, Result};

/// Immutable description of a block-partitioned index space.
///
/// `owner_begin[r]` is the first global index owned by rank `r`;
/// `owner_begin[P]` is the global size. Slices are contiguous and
/// non-overlapping by construction.
pub struct IndexMap {
    comm: Arc<dyn Communicator>,
    block_size: usize,
    owner_begin: Vec<usize>,
}

impl IndexMap {
    /// Build a map from an explicit ownership table.
    ///
    /// The table must have `size + 1` entries, start at zero, and be
    /// non-decreasing.
    pub fn new(
        comm: Arc<dyn Communicator>,
        block_size: usize,
        owner_begin: Vec<usize>,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(InterpError::Config("block size must be at least 1".into()));
        }
        if owner_begin.len() != comm.size() + 1 {
            return Err(InterpError::Config(format!(
                "ownership table has {} entries, expected {}",
                owner_begin.len(),
                comm.size() + 1
            )));
        }
        if owner_begin[0] != 0 {
            return Err(InterpError::Config(
                "ownership table must start at index 0".into(),
            ));
        }
        if owner_begin.windows(2).any(|w| w[0] > w[1]) {
            return Err(InterpError::Config(
                "ownership table must be non-decreasing".into(),
            ));
        }
        Ok(Self {
            comm,
            block_size,
            owner_begin,
        })
    }

    /// Build a map collectively from this rank's local count.
    /// Collective on the communicator.
    pub fn from_local_count(
        comm: Arc<dyn Communicator>,
        block_size: usize,
        local_count: usize,
    ) -> Result<Self> {
        let counts = comm.all_gather_count(local_count);
        let mut owner_begin = Vec::with_capacity(counts.len() + 1);
        owner_begin.push(0);
        let mut total = 0;
        for n in counts {
            total += n;
            owner_begin.push(total);
        }
        Self::new(comm, block_size, owner_begin)
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Total number of logical indices across all ranks.
    pub fn global_count(&self) -> usize {
        *self.owner_begin.last().unwrap()
    }

    /// Global indices owned by this rank.
    pub fn local_range(&self) -> Range<usize> {
        let r = self.comm.rank();
        self.owner_begin[r]..self.owner_begin[r + 1]
    }

    /// Number of logical indices owned by this rank.
    pub fn local_count(&self) -> usize {
        self.local_range().len()
    }

    /// The full ownership table, `size + 1` entries.
    pub fn owner_begin(&self) -> &[usize] {
        &self.owner_begin
    }

    /// Rank owning `global`. `global` must be in range.
    pub fn owner_of(&self, global: usize) -> usize {
        assert!(global < self.global_count(), "global index out of range");
        // Last rank whose slice starts at or before `global`. Empty
        // slices never win: their successor starts at the same index.
        self.owner_begin.partition_point(|&b| b <= global) - 1
    }

    pub fn owns(&self, global: usize) -> bool {
        self.local_range().contains(&global)
    }

    /// Translate an owned global index to its local offset.
    pub fn to_local(&self, global: usize) -> usize {
        assert!(self.owns(global), "global index not owned by this rank");
        global - self.local_range().start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;

    fn single(block_size: usize, count: usize) -> IndexMap {
        IndexMap::new(Arc::new(SingleProcessComm), block_size, vec![0, count]).unwrap()
    }

    #[test]
    fn single_process_owns_everything() {
        let map = single(3, 10);
        assert_eq!(map.global_count(), 10);
        assert_eq!(map.local_count(), 10);
        assert_eq!(map.local_range(), 0..10);
        assert!(map.owns(0));
        assert!(map.owns(9));
        assert_eq!(map.owner_of(4), 0);
        assert_eq!(map.to_local(4), 4);
    }

    #[test]
    fn from_local_count_matches_explicit() {
        let map =
            IndexMap::from_local_count(Arc::new(SingleProcessComm), 2, 6).unwrap();
        assert_eq!(map.owner_begin(), &[0, 6]);
        assert_eq!(map.block_size(), 2);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let err = IndexMap::new(Arc::new(SingleProcessComm), 0, vec![0, 4]);
        assert!(err.is_err());
    }

    #[test]
    fn bad_table_is_rejected() {
        assert!(IndexMap::new(Arc::new(SingleProcessComm), 1, vec![0, 4, 8]).is_err());
        assert!(IndexMap::new(Arc::new(SingleProcessComm), 1, vec![1, 4]).is_err());
    }
}
