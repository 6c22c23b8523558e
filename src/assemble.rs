//! CSR assembly for the finalised operator.
//!
//! Consumes the locally staged rows plus the rows received during
//! redistribution and produces the two-part CSR form: `diag` for
//! columns owned by this rank's slice of the input map, `offd` for
//! columns that live on other ranks. `offd` columns are re-indexed
//! into a sorted table of distinct non-local global indices, which
//! later parameterises the halo exchange.

use tracing::warn;

use crate::map::IndexMap;
use crate::scalar::{self, Scalar};
use crate::staging::RowBlocks;

/// One CSR half of the operator. After assembly each row is sorted
/// ascending by column with no duplicates.
#[derive(Debug)]
pub(crate) struct CsrPart {
    pub rowp: Vec<usize>,
    pub cols: Vec<usize>,
    pub w: Vec<Scalar>,
}

impl CsrPart {
    pub fn nnz(&self) -> usize {
        self.cols.len()
    }
}

/// Assembly output: the CSR pair, the halo index table, and the
/// count of discarded misrouted rows.
pub(crate) struct Assembled {
    pub diag: CsrPart,
    pub offd: CsrPart,
    pub ext: Vec<usize>,
    pub dropped_rows: usize,
}

/// Build the finalised CSR pair from staged and received rows.
///
/// Every contribution row is translated to a local row index; its
/// entries are classified against the input map's ownership range,
/// placed, deduplicated by summing, re-indexed and normalised so each
/// non-empty row's weights sum to one.
pub(crate) fn build(
    local: &RowBlocks,
    incoming: &RowBlocks,
    in_map: &IndexMap,
    out_map: &IndexMap,
) -> Assembled {
    let n = out_map.local_count();
    let out_range = out_map.local_range();
    let in_range = in_map.local_range();
    let rank = out_map.rank();

    // Sizing pass: per-row entry counts for both halves. Incoming
    // rows are re-checked against our ownership range; a mismatch is
    // a routing bug upstream and the row is discarded, not trusted.
    let mut diag_rowp = vec![0usize; n + 1];
    let mut offd_rowp = vec![0usize; n + 1];
    let mut dropped_rows = 0usize;
    for block in [local, incoming] {
        for i in 0..block.len() {
            let (num, vars, _) = block.row(i);
            if !out_range.contains(&num) {
                warn!(rank, out_global = num, "discarding row not owned here");
                dropped_rows += 1;
                continue;
            }
            let row = num - out_range.start;
            for &g in vars {
                if in_range.contains(&g) {
                    diag_rowp[row + 1] += 1;
                } else {
                    offd_rowp[row + 1] += 1;
                }
            }
        }
    }

    for i in 0..n {
        diag_rowp[i + 1] += diag_rowp[i];
        offd_rowp[i + 1] += offd_rowp[i];
    }

    // Placement pass: write global column indices and weights into
    // their buckets. Duplicate columns are permitted here.
    let mut diag = CsrPart {
        cols: vec![0usize; diag_rowp[n]],
        w: vec![scalar::zero(); diag_rowp[n]],
        rowp: diag_rowp,
    };
    let mut offd = CsrPart {
        cols: vec![0usize; offd_rowp[n]],
        w: vec![scalar::zero(); offd_rowp[n]],
        rowp: offd_rowp,
    };
    let mut diag_cursor = diag.rowp[..n].to_vec();
    let mut offd_cursor = offd.rowp[..n].to_vec();
    for block in [local, incoming] {
        for i in 0..block.len() {
            let (num, vars, weights) = block.row(i);
            if !out_range.contains(&num) {
                continue;
            }
            let row = num - out_range.start;
            for (&g, &wv) in vars.iter().zip(weights) {
                if in_range.contains(&g) {
                    let j = diag_cursor[row];
                    diag.cols[j] = g;
                    diag.w[j] = wv;
                    diag_cursor[row] += 1;
                } else {
                    let j = offd_cursor[row];
                    offd.cols[j] = g;
                    offd.w[j] = wv;
                    offd_cursor[row] += 1;
                }
            }
        }
    }

    sort_dedup_rows(&mut diag);
    sort_dedup_rows(&mut offd);

    // Distinct non-local input indices, ascending; `offd` columns
    // become positions in this table.
    let mut ext = offd.cols.clone();
    ext.sort_unstable();
    ext.dedup();
    for c in &mut offd.cols {
        *c = ext.partition_point(|&v| v < *c);
    }

    // Owned input columns switch to local numbering.
    for c in &mut diag.cols {
        *c -= in_range.start;
    }

    normalize_rows(&mut diag, &mut offd);

    Assembled {
        diag,
        offd,
        ext,
        dropped_rows,
    }
}

/// Sort each row by column and merge duplicate columns by summing
/// their weights. Compacts the arrays in place.
fn sort_dedup_rows(part: &mut CsrPart) {
    let n = part.rowp.len() - 1;
    let mut new_rowp = vec![0usize; n + 1];
    let mut scratch: Vec<(usize, Scalar)> = Vec::new();
    let mut write = 0usize;
    for i in 0..n {
        let span = part.rowp[i]..part.rowp[i + 1];
        scratch.clear();
        scratch.extend(
            part.cols[span.clone()]
                .iter()
                .copied()
                .zip(part.w[span].iter().copied()),
        );
        scratch.sort_unstable_by_key(|&(c, _)| c);

        let row_start = write;
        for &(c, wv) in &scratch {
            if write > row_start && part.cols[write - 1] == c {
                part.w[write - 1] += wv;
            } else {
                part.cols[write] = c;
                part.w[write] = wv;
                write += 1;
            }
        }
        new_rowp[i + 1] = write;
    }
    part.rowp = new_rowp;
    part.cols.truncate(write);
    part.w.truncate(write);
}

/// Divide each row's weights by their sum across both halves. Rows
/// whose sum is exactly zero (in particular empty rows) are left
/// alone and produce zero output.
fn normalize_rows(diag: &mut CsrPart, offd: &mut CsrPart) {
    let n = diag.rowp.len() - 1;
    for i in 0..n {
        let mut s = scalar::zero();
        for j in diag.rowp[i]..diag.rowp[i + 1] {
            s += diag.w[j];
        }
        for j in offd.rowp[i]..offd.rowp[i + 1] {
            s += offd.w[j];
        }
        if !scalar::is_zero(s) {
            for j in diag.rowp[i]..diag.rowp[i + 1] {
                diag.w[j] /= s;
            }
            for j in offd.rowp[i]..offd.rowp[i + 1] {
                offd.w[j] /= s;
            }
        }
    }
}
