//! Row staging and redistribution.
//!
//! Before finalisation, interpolation rows are appended to one of two
//! staging buffers: `local` for rows whose output index this rank
//! owns, `remote` for everything else. At finalisation the remote
//! buffer is routed to the owning ranks with one all-to-all of counts
//! and four variable-count exchanges.

use tracing::warn;

use crate::comm::Communicator;
use crate::map::IndexMap;
use crate::scalar::{self, Scalar};

/// Append-only rows in struct-of-arrays layout: row output indices,
/// a CSR-style pointer, and the packed `(input index, weight)` pairs.
/// The flat arrays keep the wire layout free of padding when blocks
/// are shipped between ranks.
#[derive(Debug)]
pub(crate) struct RowBlocks {
    /// Output global index per staged row.
    pub nums: Vec<usize>,
    /// `rowp[i]..rowp[i + 1]` bounds row `i` in `vars`/`weights`.
    pub rowp: Vec<usize>,
    pub vars: Vec<usize>,
    pub weights: Vec<Scalar>,
}

impl RowBlocks {
    pub fn new() -> Self {
        Self {
            nums: Vec::new(),
            rowp: vec![0],
            vars: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Append one row. Amortised O(1) per entry.
    pub fn push_row(&mut self, num: usize, vars: &[usize], weights: &[Scalar]) {
        assert_eq!(vars.len(), weights.len(), "row weight/index length mismatch");
        self.nums.push(num);
        self.vars.extend_from_slice(vars);
        self.weights.extend_from_slice(weights);
        self.rowp.push(self.vars.len());
    }

    /// Number of staged rows.
    pub fn len(&self) -> usize {
        self.nums.len()
    }

    /// Total number of staged `(input index, weight)` entries.
    pub fn entry_count(&self) -> usize {
        self.vars.len()
    }

    /// Borrow row `i` as `(out_global, input indices, weights)`.
    pub fn row(&self, i: usize) -> (usize, &[usize], &[Scalar]) {
        let span = self.rowp[i]..self.rowp[i + 1];
        (
            self.nums[i],
            &self.vars[span.clone()],
            &self.weights[span],
        )
    }
}

fn prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(counts.len() + 1);
    out.push(0);
    for &n in counts {
        out.push(out.last().unwrap() + n);
    }
    out
}

/// Route every staged remote row to the rank that owns its output
/// index, and collect the rows other ranks staged for us. Collective
/// on the output map's communicator; consumes the remote buffer.
///
/// Routing is best effort: receivers re-check ownership of every
/// incoming row during assembly and discard mismatches there.
pub(crate) fn route_to_owners(remote: RowBlocks, out_map: &IndexMap) -> RowBlocks {
    let comm = out_map.comm();
    let size = comm.size();

    // Per-destination tallies of rows and entries.
    let dests: Vec<usize> = remote.nums.iter().map(|&n| out_map.owner_of(n)).collect();
    let mut row_counts = vec![0usize; size];
    let mut entry_counts = vec![0usize; size];
    for (i, &d) in dests.iter().enumerate() {
        row_counts[d] += 1;
        entry_counts[d] += remote.rowp[i + 1] - remote.rowp[i];
    }

    // Regroup so rows bound for the same rank are contiguous, rows in
    // staging order within each group and entries tracking their rows.
    let row_displ = prefix_sum(&row_counts);
    let entry_displ = prefix_sum(&entry_counts);
    let mut send_nums = vec![0usize; remote.len()];
    let mut send_sizes = vec![0usize; remote.len()];
    let mut send_vars = vec![0usize; remote.entry_count()];
    let mut send_weights = vec![scalar::zero(); remote.entry_count()];
    let mut row_cursor = row_displ.clone();
    let mut entry_cursor = entry_displ.clone();
    for (i, &d) in dests.iter().enumerate() {
        let (num, vars, weights) = remote.row(i);
        let r = row_cursor[d];
        row_cursor[d] += 1;
        send_nums[r] = num;
        send_sizes[r] = vars.len();
        let e = entry_cursor[d];
        entry_cursor[d] += vars.len();
        send_vars[e..e + vars.len()].copy_from_slice(vars);
        send_weights[e..e + weights.len()].copy_from_slice(weights);
    }
    drop(remote);

    // One exchange of (row, entry) count pairs, then the four payload
    // arrays partitioned by those counts.
    let mut count_pairs = Vec::with_capacity(2 * size);
    for r in 0..size {
        count_pairs.push(row_counts[r]);
        count_pairs.push(entry_counts[r]);
    }
    let in_pairs = comm.all_to_all_counts(&count_pairs);
    let in_row_counts: Vec<usize> = in_pairs.iter().step_by(2).copied().collect();
    let in_entry_counts: Vec<usize> = in_pairs.iter().skip(1).step_by(2).copied().collect();

    let in_nums = comm.all_to_all_indices(&send_nums, &row_counts, &in_row_counts);
    let in_sizes = comm.all_to_all_indices(&send_sizes, &row_counts, &in_row_counts);
    let in_vars = comm.all_to_all_indices(&send_vars, &entry_counts, &in_entry_counts);
    let in_weights = comm.all_to_all_scalars(&send_weights, &entry_counts, &in_entry_counts);

    let mut incoming = RowBlocks::new();
    incoming.nums = in_nums;
    incoming.vars = in_vars;
    incoming.weights = in_weights;
    incoming.rowp = prefix_sum(&in_sizes);

    if incoming.rowp.last() != Some(&incoming.vars.len()) {
        // Counts and payloads disagree; keep the consistent prefix so
        // the malformed tail degrades to empty rows.
        warn!(
            rank = comm.rank(),
            "redistribution payload does not match per-row counts"
        );
        let limit = incoming.vars.len().min(incoming.weights.len());
        incoming.vars.truncate(limit);
        incoming.weights.truncate(limit);
        for p in incoming.rowp.iter_mut() {
            *p = (*p).min(limit);
        }
    }
    incoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleProcessComm;
    use crate::scalar::from_real;
    use std::sync::Arc;

    #[test]
    fn push_and_read_back_rows() {
        let mut rows = RowBlocks::new();
        rows.push_row(4, &[0, 2], &[from_real(1.0), from_real(2.0)]);
        rows.push_row(7, &[5], &[from_real(3.0)]);
        rows.push_row(1, &[], &[]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows.entry_count(), 3);
        let (num, vars, weights) = rows.row(0);
        assert_eq!(num, 4);
        assert_eq!(vars, &[0, 2]);
        assert_eq!(weights, &[from_real(1.0), from_real(2.0)]);
        let (num, vars, _) = rows.row(2);
        assert_eq!(num, 1);
        assert!(vars.is_empty());
    }

    #[test]
    fn single_process_routing_returns_rows_unchanged() {
        // With one rank every remote row is destined for ourselves;
        // the exchange must hand the rows back intact.
        let map = IndexMap::new(Arc::new(SingleProcessComm), 1, vec![0, 8]).unwrap();
        let mut remote = RowBlocks::new();
        remote.push_row(3, &[1, 2], &[from_real(0.5), from_real(0.5)]);
        remote.push_row(6, &[0], &[from_real(1.0)]);

        let incoming = route_to_owners(remote, &map);
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming.row(0).0, 3);
        assert_eq!(incoming.row(1).0, 6);
        assert_eq!(incoming.row(0).1, &[1, 2]);
        assert_eq!(incoming.row(1).2, &[from_real(1.0)]);
    }
}
