//! MPI communication backend.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `Communicator` using `mpi::traits::*` for the collective
//! exchanges and point-to-point neighbor transfers.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! # Wire layout
//!
//! Index payloads travel as `u64` and scalar payloads as `f64` words
//! (two per scalar when the `complex` feature is active), so only
//! primitive MPI datatypes are involved.
//!
//! # Neighbor exchange
//!
//! Point-to-point transfers use blocking send/recv with rank-based
//! ordering: the lower-ranked process sends first, the higher-ranked
//! receives first. This cannot deadlock as long as both peers name
//! each other, which the halo setup guarantees.

use crate::comm::{Communicator, NeighborRecv, NeighborSend};
use crate::scalar::{self, Scalar};

use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

/// MPI-based communication backend.
///
/// Wraps the MPI world communicator. Requires `mpi::initialize()` to
/// have been called before construction.
pub struct MpiComm;

impl MpiComm {
    /// Create a new MPI communication backend.
    ///
    /// Panics if MPI has not been initialized via `mpi::initialize()`.
    pub fn new() -> Self {
        Self
    }

    fn all_to_all_v_u64(
        &self,
        send: &[u64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<u64> {
        let world = SimpleCommunicator::world();
        let (sc, sd) = counts_displs(send_counts);
        let (rc, rd) = counts_displs(recv_counts);
        let total: usize = recv_counts.iter().sum();
        let mut recv = vec![0u64; total];
        {
            let send_part = Partition::new(send, &sc[..], &sd[..]);
            let mut recv_part = PartitionMut::new(&mut recv[..], &rc[..], &rd[..]);
            world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }
        recv
    }

    fn all_to_all_v_f64(
        &self,
        send: &[f64],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<f64> {
        let world = SimpleCommunicator::world();
        let (sc, sd) = counts_displs(send_counts);
        let (rc, rd) = counts_displs(recv_counts);
        let total: usize = recv_counts.iter().sum();
        let mut recv = vec![0.0f64; total];
        {
            let send_part = Partition::new(send, &sc[..], &sd[..]);
            let mut recv_part = PartitionMut::new(&mut recv[..], &rc[..], &rd[..]);
            world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }
        recv
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

fn counts_displs(counts: &[usize]) -> (Vec<Count>, Vec<Count>) {
    let mut c = Vec::with_capacity(counts.len());
    let mut d = Vec::with_capacity(counts.len());
    let mut offset: Count = 0;
    for &n in counts {
        c.push(n as Count);
        d.push(offset);
        offset += n as Count;
    }
    (c, d)
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        SimpleCommunicator::world().rank() as usize
    }

    fn size(&self) -> usize {
        SimpleCommunicator::world().size() as usize
    }

    fn barrier(&self) {
        SimpleCommunicator::world().barrier();
    }

    fn congruent(&self, other: &dyn Communicator) -> bool {
        // Both handles wrap the world communicator, so matching
        // backend, size and rank means the process groups coincide.
        other.backend_name() == self.backend_name()
            && other.size() == self.size()
            && other.rank() == self.rank()
    }

    fn backend_name(&self) -> &'static str {
        "mpi"
    }

    fn all_gather_count(&self, local: usize) -> Vec<usize> {
        let world = SimpleCommunicator::world();
        let local = local as u64;
        let mut out = vec![0u64; world.size() as usize];
        world.all_gather_into(&local, &mut out[..]);
        out.into_iter().map(|v| v as usize).collect()
    }

    fn all_to_all_counts(&self, send: &[usize]) -> Vec<usize> {
        let world = SimpleCommunicator::world();
        let wire: Vec<u64> = send.iter().map(|&v| v as u64).collect();
        let mut recv = vec![0u64; send.len()];
        world.all_to_all_into(&wire[..], &mut recv[..]);
        recv.into_iter().map(|v| v as usize).collect()
    }

    fn all_to_all_indices(
        &self,
        send: &[usize],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<usize> {
        let wire: Vec<u64> = send.iter().map(|&v| v as u64).collect();
        self.all_to_all_v_u64(&wire, send_counts, recv_counts)
            .into_iter()
            .map(|v| v as usize)
            .collect()
    }

    fn all_to_all_scalars(
        &self,
        send: &[Scalar],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Vec<Scalar> {
        let width = scalar::WIRE_WIDTH;
        let wire = scalar::pack(send);
        let sc: Vec<usize> = send_counts.iter().map(|&n| n * width).collect();
        let rc: Vec<usize> = recv_counts.iter().map(|&n| n * width).collect();
        let recv_wire = self.all_to_all_v_f64(&wire, &sc, &rc);
        let mut out = vec![scalar::zero(); recv_wire.len() / width];
        scalar::unpack_into(&recv_wire, &mut out);
        out
    }

    fn exchange_scalars(&self, sends: &[NeighborSend<'_>], recvs: &mut [NeighborRecv<'_>]) {
        let world = SimpleCommunicator::world();
        let my_rank = world.rank() as usize;

        let mut peers: Vec<usize> = sends
            .iter()
            .map(|s| s.rank)
            .chain(recvs.iter().map(|r| r.rank))
            .collect();
        peers.sort_unstable();
        peers.dedup();

        for peer in peers {
            let send_wire: Option<Vec<f64>> = sends
                .iter()
                .find(|s| s.rank == peer)
                .map(|s| scalar::pack(s.data));
            let recv_pos = recvs.iter().position(|r| r.rank == peer);
            let process = world.process_at_rank(peer as i32);

            if my_rank < peer {
                if let Some(wire) = &send_wire {
                    process.send(&wire[..]);
                }
                if let Some(pos) = recv_pos {
                    let buf = &mut *recvs[pos].buf;
                    let mut wire = vec![0.0f64; buf.len() * scalar::WIRE_WIDTH];
                    process.receive_into(&mut wire[..]);
                    scalar::unpack_into(&wire, buf);
                }
            } else {
                if let Some(pos) = recv_pos {
                    let buf = &mut *recvs[pos].buf;
                    let mut wire = vec![0.0f64; buf.len() * scalar::WIRE_WIDTH];
                    process.receive_into(&mut wire[..]);
                    scalar::unpack_into(&wire, buf);
                }
                if let Some(wire) = &send_wire {
                    process.send(&wire[..]);
                }
            }
        }
    }
}
