//! Block-sparse interpolation operator between two distributed
//! vectors.
//!
//! The operator represents a rectangular matrix mapping a vector over
//! the input map to a vector over the output map, with one scalar
//! weight fanned out across each block of components. It is used in
//! both directions: `apply` for prolongation and `apply_transpose`
//! for restriction (or vice versa, depending on which map is the
//! coarse one).
//!
//! Lifecycle: construct from the two maps, stage rows with
//! [`Interp::add_row`] from any rank, then call [`Interp::finalize`]
//! once (collective). After finalisation the apply operations may be
//! called any number of times; the staging buffers are gone and the
//! operator is immutable.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use crate::assemble::{self, CsrPart};
use crate::comm::{Combine, Communicator};
use crate::error::{InterpError, Result};
use crate::halo::HaloExchange;
use crate::kernels::{self, KernelFn};
use crate::map::IndexMap;
use crate::scalar::{self, Scalar};
use crate::staging::{self, RowBlocks};
use crate::vector::DistVector;

/// Weights below this magnitude are omitted from [`Interp::dump_to`].
const DUMP_THRESHOLD: f64 = 1e-12;

enum State {
    Staging {
        local: RowBlocks,
        remote: RowBlocks,
    },
    Finalized {
        diag: CsrPart,
        offd: CsrPart,
        halo: HaloExchange,
        /// Halo buffer, `block_size * ext_count` scalars.
        x_ext: Vec<Scalar>,
    },
}

/// Distributed block-sparse interpolation operator.
pub struct Interp {
    in_map: Arc<IndexMap>,
    out_map: Arc<IndexMap>,
    block_size: usize,
    mult_add: KernelFn,
    mult_transpose_add: KernelFn,
    state: State,
}

impl Interp {
    /// Create an empty operator between `in_map` and `out_map`.
    ///
    /// The maps must share their block size and their communicator
    /// (identical or congruent process groups).
    pub fn new(in_map: Arc<IndexMap>, out_map: Arc<IndexMap>) -> Result<Self> {
        if in_map.block_size() != out_map.block_size() {
            return Err(InterpError::Config(format!(
                "block sizes do not match: input {} vs output {}",
                in_map.block_size(),
                out_map.block_size()
            )));
        }
        if !in_map.comm().congruent(&**out_map.comm()) {
            return Err(InterpError::Config(
                "communicators are neither identical nor congruent".into(),
            ));
        }

        let block_size = in_map.block_size();
        let (mult_add, mult_transpose_add) = kernels::select(block_size);
        Ok(Self {
            in_map,
            out_map,
            block_size,
            mult_add,
            mult_transpose_add,
            state: State::Staging {
                local: RowBlocks::new(),
                remote: RowBlocks::new(),
            },
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn input_map(&self) -> &Arc<IndexMap> {
        &self.in_map
    }

    pub fn output_map(&self) -> &Arc<IndexMap> {
        &self.out_map
    }

    /// Number of output rows owned by this rank.
    pub fn local_rows(&self) -> usize {
        self.out_map.local_count()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized { .. })
    }

    /// Nonzero counts of the local and remote-column halves, once
    /// finalised.
    pub fn nnz(&self) -> Option<(usize, usize)> {
        match &self.state {
            State::Finalized { diag, offd, .. } => Some((diag.nnz(), offd.nnz())),
            State::Staging { .. } => None,
        }
    }

    /// Stage one interpolation row: output index `out_global` draws
    /// from `in_globals` with the given weights. Rows may be staged
    /// from any rank; rows for the same output accumulate. Duplicate
    /// `(out, in)` pairs are summed during finalisation.
    ///
    /// An out-of-range `out_global` is logged and discarded, as are
    /// out-of-range input entries. Staging after finalisation is a
    /// usage error.
    pub fn add_row(
        &mut self,
        out_global: usize,
        weights: &[Scalar],
        in_globals: &[usize],
    ) -> Result<()> {
        assert_eq!(
            weights.len(),
            in_globals.len(),
            "add_row weight/index length mismatch"
        );
        let rank = self.out_map.rank();
        let State::Staging { local, remote } = &mut self.state else {
            return Err(InterpError::Usage(format!(
                "rank {rank}: add_row after finalize"
            )));
        };

        if out_global >= self.out_map.global_count() {
            warn!(
                rank,
                out_global, "discarding row with out-of-range output index"
            );
            return Ok(());
        }

        let m_in = self.in_map.global_count();
        let bucket = if self.out_map.owns(out_global) {
            local
        } else {
            remote
        };
        if in_globals.iter().all(|&g| g < m_in) {
            bucket.push_row(out_global, in_globals, weights);
        } else {
            warn!(
                rank,
                out_global, "dropping out-of-range input entries from row"
            );
            let mut kept_vars = Vec::with_capacity(in_globals.len());
            let mut kept_w = Vec::with_capacity(weights.len());
            for (&g, &wv) in in_globals.iter().zip(weights) {
                if g < m_in {
                    kept_vars.push(g);
                    kept_w.push(wv);
                }
            }
            bucket.push_row(out_global, &kept_vars, &kept_w);
        }
        Ok(())
    }

    /// Finish assembly. Collective on the communicator: every rank
    /// must call this exactly once, even if it staged nothing.
    ///
    /// Rows staged for outputs owned elsewhere are shipped to their
    /// owners; the combined contributions are assembled into the
    /// local/remote CSR pair, deduplicated, normalised, and the halo
    /// exchange for the remote columns is established.
    pub fn finalize(&mut self) -> Result<()> {
        let rank = self.out_map.rank();
        if self.is_finalized() {
            return Err(InterpError::Usage(format!(
                "rank {rank}: finalize called twice"
            )));
        }
        let _span = debug_span!("finalize", rank).entered();

        let State::Staging { local, remote } = std::mem::replace(
            &mut self.state,
            State::Staging {
                local: RowBlocks::new(),
                remote: RowBlocks::new(),
            },
        ) else {
            unreachable!("finalized state handled above");
        };

        let staged_local = local.len();
        let staged_remote = remote.len();
        let incoming = staging::route_to_owners(remote, &self.out_map);
        let routed_in = incoming.len();

        let built = assemble::build(&local, &incoming, &self.in_map, &self.out_map);
        drop(local);
        drop(incoming);

        let halo = HaloExchange::new(&self.in_map, &built.ext);
        let x_ext = vec![scalar::zero(); self.block_size * built.ext.len()];

        debug!(
            rows = self.local_rows(),
            staged_local,
            staged_remote,
            routed_in,
            dropped = built.dropped_rows,
            diag_nnz = built.diag.nnz(),
            offd_nnz = built.offd.nnz(),
            ext = built.ext.len(),
            "interpolation finalised"
        );

        self.state = State::Finalized {
            diag: built.diag,
            offd: built.offd,
            halo,
            x_ext,
        };
        Ok(())
    }

    /// `y := P x`. Collective; `x` lives over the input map and `y`
    /// over the output map.
    pub fn apply(&mut self, x: &DistVector, y: &mut DistVector) -> Result<()> {
        y.zero();
        self.apply_accumulate(x, y)
    }

    /// `y := z + P x`. Pass `z = None` to accumulate into the
    /// existing contents of `y` (the aliased case).
    pub fn apply_add(
        &mut self,
        x: &DistVector,
        z: Option<&DistVector>,
        y: &mut DistVector,
    ) -> Result<()> {
        if let Some(z) = z {
            y.copy_from(z);
        }
        self.apply_accumulate(x, y)
    }

    /// `y := P^T x`. Collective; `x` lives over the output map and
    /// `y` over the input map.
    pub fn apply_transpose(&mut self, x: &DistVector, y: &mut DistVector) -> Result<()> {
        y.zero();
        self.apply_transpose_accumulate(x, y)
    }

    /// `y := z + P^T x`. Pass `z = None` to accumulate into the
    /// existing contents of `y`.
    pub fn apply_transpose_add(
        &mut self,
        x: &DistVector,
        z: Option<&DistVector>,
        y: &mut DistVector,
    ) -> Result<()> {
        if let Some(z) = z {
            y.copy_from(z);
        }
        self.apply_transpose_accumulate(x, y)
    }

    fn apply_accumulate(&mut self, x: &DistVector, y: &mut DistVector) -> Result<()> {
        let b = self.block_size;
        let mult_add = self.mult_add;
        let rank = self.out_map.rank();
        assert_eq!(
            x.local().len(),
            b * self.in_map.local_count(),
            "input vector does not match the input map"
        );
        assert_eq!(
            y.local().len(),
            b * self.out_map.local_count(),
            "output vector does not match the output map"
        );
        let State::Finalized {
            diag,
            offd,
            halo,
            x_ext,
        } = &mut self.state
        else {
            return Err(InterpError::Usage(format!(
                "rank {rank}: apply before finalize"
            )));
        };

        // Ship the remote components while the owned half multiplies.
        halo.begin_forward(x.local(), x_ext);
        mult_add(b, &diag.rowp, &diag.cols, &diag.w, x.local(), y.local_mut());
        halo.end_forward();
        mult_add(b, &offd.rowp, &offd.cols, &offd.w, &x_ext[..], y.local_mut());
        Ok(())
    }

    fn apply_transpose_accumulate(&mut self, x: &DistVector, y: &mut DistVector) -> Result<()> {
        let b = self.block_size;
        let mult_transpose_add = self.mult_transpose_add;
        let rank = self.out_map.rank();
        assert_eq!(
            x.local().len(),
            b * self.out_map.local_count(),
            "input vector does not match the output map"
        );
        assert_eq!(
            y.local().len(),
            b * self.in_map.local_count(),
            "output vector does not match the input map"
        );
        let State::Finalized {
            diag,
            offd,
            halo,
            x_ext,
        } = &mut self.state
        else {
            return Err(InterpError::Usage(format!(
                "rank {rank}: apply_transpose before finalize"
            )));
        };

        // Remote-column contributions go through the halo buffer and
        // are accumulated at their owners while the owned half
        // multiplies in place.
        x_ext.fill(scalar::zero());
        mult_transpose_add(b, &offd.rowp, &offd.cols, &offd.w, x.local(), x_ext);
        halo.begin_reverse(&x_ext[..], y.local_mut(), Combine::Add);
        mult_transpose_add(b, &diag.rowp, &diag.cols, &diag.w, x.local(), y.local_mut());
        halo.end_reverse();
        Ok(())
    }

    /// Write a human-readable listing of the locally owned weights to
    /// `out`, one row per line. Remote-column entries are not listed.
    pub fn dump_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let rank = self.out_map.rank();
        let State::Finalized { diag, .. } = &self.state else {
            return Err(InterpError::Usage(format!(
                "rank {rank}: dump before finalize"
            )));
        };
        writeln!(out, "Interp")?;
        for i in 0..self.local_rows() {
            writeln!(out, "Row: {}", i)?;
            for j in diag.rowp[i]..diag.rowp[i + 1] {
                let wr = scalar::real(diag.w[j]);
                if wr.abs() > DUMP_THRESHOLD {
                    write!(out, "({},{:.6}) ", diag.cols[j], wr)?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Write the [`Interp::dump_to`] listing to a file at `path`.
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        self.dump_to(&mut file)
    }
}
