//! Distributed vector with contiguous local storage.

use std::sync::Arc;

use crate::map::IndexMap;
use crate::scalar::{self, Scalar};

/// A vector partitioned across ranks by an [`IndexMap`].
///
/// Each rank stores `block_size * local_count` scalars for its owned
/// slice of the index space; no remote storage is assumed.
pub struct DistVector {
    map: Arc<IndexMap>,
    values: Vec<Scalar>,
}

impl DistVector {
    /// Create a zero vector over `map`.
    pub fn new(map: Arc<IndexMap>) -> Self {
        let len = map.block_size() * map.local_count();
        Self {
            map,
            values: vec![scalar::zero(); len],
        }
    }

    pub fn map(&self) -> &Arc<IndexMap> {
        &self.map
    }

    /// Borrow the local storage.
    pub fn local(&self) -> &[Scalar] {
        &self.values
    }

    /// Mutably borrow the local storage.
    pub fn local_mut(&mut self) -> &mut [Scalar] {
        &mut self.values
    }

    /// Set every local component to zero.
    pub fn zero(&mut self) {
        self.values.fill(scalar::zero());
    }

    /// Copy local components from another vector over the same layout.
    pub fn copy_from(&mut self, other: &DistVector) {
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "copy_from layout mismatch"
        );
        self.values.copy_from_slice(&other.values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use crate::scalar::from_real;

    fn map(block_size: usize, count: usize) -> Arc<IndexMap> {
        Arc::new(
            IndexMap::new(Arc::new(SingleProcessComm), block_size, vec![0, count]).unwrap(),
        )
    }

    #[test]
    fn new_vector_is_zero_and_sized_by_blocks() {
        let v = DistVector::new(map(3, 4));
        assert_eq!(v.local().len(), 12);
        assert!(v.local().iter().all(|&s| s == from_real(0.0)));
    }

    #[test]
    fn copy_and_zero() {
        let m = map(1, 3);
        let mut a = DistVector::new(m.clone());
        let mut b = DistVector::new(m);
        a.local_mut().copy_from_slice(&[from_real(1.0), from_real(2.0), from_real(3.0)]);
        b.copy_from(&a);
        assert_eq!(b.local(), a.local());
        b.zero();
        assert!(b.local().iter().all(|&s| s == from_real(0.0)));
    }
}
