//! Halo exchange for non-local vector components.
//!
//! Built once per operator from the input map and the sorted table of
//! distinct non-local global indices the operator references. The
//! forward direction gathers those remote components into a local
//! buffer; the reverse direction scatter-adds local contributions back
//! to the owning ranks.
//!
//! Both directions expose a begin/end bracket so callers can run local
//! work between the two calls. The current transport is blocking and
//! completes inside `begin_*`; the bracket is kept so the call sites
//! do not change when the transport does.
//! TODO: overlap transfers with local compute via non-blocking
//! send/recv once the transport supports it.

use std::sync::Arc;

use crate::comm::{Combine, Communicator, NeighborRecv, NeighborSend};
use crate::map::IndexMap;
use crate::scalar::{self, Scalar};

/// Point-to-point gather/scatter plan for a fixed set of non-local
/// indices over an input map.
pub struct HaloExchange {
    comm: Arc<dyn Communicator>,
    block_size: usize,
    /// Ranks we receive forward data from, ascending.
    recv_ranks: Vec<usize>,
    /// Segment bounds into the halo buffer per recv rank, in logical
    /// index units; `recv_offsets[recv_ranks.len()]` is the table size.
    recv_offsets: Vec<usize>,
    /// Ranks we send forward data to, ascending.
    send_ranks: Vec<usize>,
    /// Segment bounds into `send_local` per send rank.
    send_offsets: Vec<usize>,
    /// Local indices of owned components requested by the send ranks,
    /// concatenated in rank order.
    send_local: Vec<usize>,
}

impl HaloExchange {
    /// Negotiate the exchange plan for `ext`, a strictly increasing
    /// table of non-local global indices over `map`. Collective on the
    /// map's communicator: every rank must call this, even with an
    /// empty table.
    pub fn new(map: &IndexMap, ext: &[usize]) -> Self {
        assert!(
            ext.windows(2).all(|w| w[0] < w[1]),
            "halo table must be strictly increasing"
        );
        assert!(
            ext.iter().all(|&g| !map.owns(g)),
            "halo table must hold non-local indices only"
        );

        let comm = map.comm().clone();
        let size = comm.size();

        // `ext` is sorted and ownership is contiguous, so indices
        // requested from the same rank are already adjacent.
        let mut request_counts = vec![0usize; size];
        for &g in ext {
            request_counts[map.owner_of(g)] += 1;
        }

        let incoming_counts = comm.all_to_all_counts(&request_counts);
        let requested = comm.all_to_all_indices(ext, &request_counts, &incoming_counts);

        let local_start = map.local_range().start;
        let send_local: Vec<usize> = requested
            .iter()
            .map(|&g| {
                assert!(map.owns(g), "peer requested an index we do not own");
                g - local_start
            })
            .collect();

        let mut recv_ranks = Vec::new();
        let mut recv_offsets = vec![0];
        for (r, &n) in request_counts.iter().enumerate() {
            if n > 0 {
                recv_ranks.push(r);
                recv_offsets.push(recv_offsets.last().unwrap() + n);
            }
        }

        let mut send_ranks = Vec::new();
        let mut send_offsets = vec![0];
        for (r, &n) in incoming_counts.iter().enumerate() {
            if n > 0 {
                send_ranks.push(r);
                send_offsets.push(send_offsets.last().unwrap() + n);
            }
        }

        Self {
            comm,
            block_size: map.block_size(),
            recv_ranks,
            recv_offsets,
            send_ranks,
            send_offsets,
            send_local,
        }
    }

    /// Number of logical indices in the halo table.
    pub fn ext_count(&self) -> usize {
        *self.recv_offsets.last().unwrap()
    }

    /// Begin filling `ext_buf` with the remote components of `src`.
    /// Between this call and [`HaloExchange::end_forward`], `ext_buf`
    /// must not be touched.
    pub fn begin_forward(&self, src: &[Scalar], ext_buf: &mut [Scalar]) {
        let b = self.block_size;
        assert_eq!(ext_buf.len(), b * self.ext_count(), "halo buffer size");

        // Pack the owned components every peer asked for.
        let mut packed = Vec::with_capacity(self.send_local.len() * b);
        for &li in &self.send_local {
            packed.extend_from_slice(&src[b * li..b * (li + 1)]);
        }

        let sends: Vec<NeighborSend<'_>> = self
            .send_ranks
            .iter()
            .enumerate()
            .map(|(k, &rank)| NeighborSend {
                rank,
                data: &packed[b * self.send_offsets[k]..b * self.send_offsets[k + 1]],
            })
            .collect();

        let mut recvs = Vec::with_capacity(self.recv_ranks.len());
        let mut rest = ext_buf;
        for (k, &rank) in self.recv_ranks.iter().enumerate() {
            let n = b * (self.recv_offsets[k + 1] - self.recv_offsets[k]);
            let (head, tail) = rest.split_at_mut(n);
            recvs.push(NeighborRecv { rank, buf: head });
            rest = tail;
        }

        self.comm.exchange_scalars(&sends, &mut recvs);
    }

    /// Complete the forward transfer begun by
    /// [`HaloExchange::begin_forward`].
    pub fn end_forward(&self) {}

    /// Begin scatter-adding `ext_buf` back to the owning ranks'
    /// slices of `dst`. Between this call and
    /// [`HaloExchange::end_reverse`], `ext_buf` must not be touched.
    pub fn begin_reverse(&self, ext_buf: &[Scalar], dst: &mut [Scalar], combine: Combine) {
        let b = self.block_size;
        assert_eq!(ext_buf.len(), b * self.ext_count(), "halo buffer size");

        // Roles swap relative to the forward direction: the halo
        // segments go back to their owners, and the components we own
        // come back to us.
        let sends: Vec<NeighborSend<'_>> = self
            .recv_ranks
            .iter()
            .enumerate()
            .map(|(k, &rank)| NeighborSend {
                rank,
                data: &ext_buf[b * self.recv_offsets[k]..b * self.recv_offsets[k + 1]],
            })
            .collect();

        let mut incoming = vec![scalar::zero(); self.send_local.len() * b];
        let mut recvs = Vec::with_capacity(self.send_ranks.len());
        let mut rest = &mut incoming[..];
        for (k, &rank) in self.send_ranks.iter().enumerate() {
            let n = b * (self.send_offsets[k + 1] - self.send_offsets[k]);
            let (head, tail) = rest.split_at_mut(n);
            recvs.push(NeighborRecv { rank, buf: head });
            rest = tail;
        }

        self.comm.exchange_scalars(&sends, &mut recvs);

        match combine {
            Combine::Add => {
                for (j, &li) in self.send_local.iter().enumerate() {
                    for k in 0..b {
                        dst[b * li + k] += incoming[b * j + k];
                    }
                }
            }
        }
    }

    /// Complete the reverse transfer begun by
    /// [`HaloExchange::begin_reverse`].
    pub fn end_reverse(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use std::sync::Arc;

    #[test]
    fn empty_table_single_process() {
        let map =
            IndexMap::new(Arc::new(SingleProcessComm), 2, vec![0, 5]).unwrap();
        let halo = HaloExchange::new(&map, &[]);
        assert_eq!(halo.ext_count(), 0);

        let src = vec![scalar::zero(); 10];
        let mut ext: Vec<Scalar> = Vec::new();
        halo.begin_forward(&src, &mut ext);
        halo.end_forward();

        let mut dst = vec![scalar::zero(); 10];
        halo.begin_reverse(&ext, &mut dst, Combine::Add);
        halo.end_reverse();
        assert!(dst.iter().all(|&s| s == scalar::zero()));
    }
}
