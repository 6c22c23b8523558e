//! Communication backend abstraction.
//!
//! Provides a trait for inter-process coordination (collective count
//! and payload exchanges, point-to-point neighbor exchange) and a
//! no-op single-process implementation.

use crate::scalar::Scalar;

/// Reduction applied on the receiving side of a reverse halo exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combine {
    Add,
}

/// One neighbor's outgoing block in a point-to-point exchange.
pub struct NeighborSend<'a> {
    pub rank: usize,
    pub data: &'a [Scalar],
}

/// One neighbor's incoming block. `buf` is filled on return.
pub struct NeighborRecv<'a> {
    pub rank: usize,
    pub buf: &'a mut [Scalar],
}

/// Abstraction over inter-process communication.
///
/// Implementations: `SingleProcessComm` (no-op), `MpiComm` (via the
/// mpi crate, feature `distributed`).
pub trait Communicator: Send + Sync {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of ranks.
    fn size(&self) -> usize;

    /// Synchronization barrier.
    fn barrier(&self);

    /// True when `other` addresses the same process group, so that
    /// collectives issued on either handle match up.
    fn congruent(&self, other: &dyn Communicator) -> bool;

    /// Identity tag used by the congruence check.
    fn backend_name(&self) -> &'static str;

    /// Gather one count from every rank, in rank order.
    fn all_gather_count(&self, local: usize) -> Vec<usize>;

    /// Exchange `send.len() / size()` values with every rank. The
    /// result holds the same number of values from each source rank,
    /// in rank order.
    fn all_to_all_counts(&self, send: &[usize]) -> Vec<usize>;

    /// Variable-count exchange of index payloads. `send` is laid out
    /// as `size()` consecutive blocks sized by `send_counts`; the
    /// result is laid out by `recv_counts`.
    fn all_to_all_indices(
        &self,
        send: &[usize],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<usize>;

    /// Variable-count exchange of scalar payloads. Layout as in
    /// [`Communicator::all_to_all_indices`].
    fn all_to_all_scalars(
        &self,
        send: &[Scalar],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<Scalar>;

    /// Pairwise exchange with a set of neighbor ranks. The send and
    /// receive rank sets may differ; both must be sorted ascending.
    /// Blocks until every block has been delivered.
    fn exchange_scalars(&self, sends: &[NeighborSend<'_>], recvs: &mut [NeighborRecv<'_>]);
}

/// No-op communication backend for single-process execution.
///
/// Collectives pass local data through unchanged; there are no
/// neighbor ranks to exchange with.
pub struct SingleProcessComm;

impl Communicator for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn congruent(&self, other: &dyn Communicator) -> bool {
        other.backend_name() == self.backend_name() && other.size() == 1
    }

    fn backend_name(&self) -> &'static str {
        "single-process"
    }

    fn all_gather_count(&self, local: usize) -> Vec<usize> {
        vec![local]
    }

    fn all_to_all_counts(&self, send: &[usize]) -> Vec<usize> {
        send.to_vec()
    }

    fn all_to_all_indices(
        &self,
        send: &[usize],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<usize> {
        assert_eq!(send_counts, recv_counts, "single-process count mismatch");
        send.to_vec()
    }

    fn all_to_all_scalars(
        &self,
        send: &[Scalar],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<Scalar> {
        assert_eq!(send_counts, recv_counts, "single-process count mismatch");
        send.to_vec()
    }

    fn exchange_scalars(&self, sends: &[NeighborSend<'_>], recvs: &mut [NeighborRecv<'_>]) {
        // Single process: no neighbors, nothing to exchange.
        assert!(
            sends.is_empty() && recvs.is_empty(),
            "single process has no neighbor ranks"
        );
    }
}
