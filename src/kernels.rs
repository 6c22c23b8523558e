//! Block mat-vec kernels.
//!
//! The operator stores one scalar weight per block of `b` vector
//! components, so the inner product loops fan each weight out across
//! the block. The generic kernels handle any block size; unrolled
//! variants cover the sizes that dominate structural meshes
//! (1, 2, 3, 5 and 6 components per node). A pair of function
//! pointers is selected once at construction.
//!
//! Summation order within a block is fixed: unrolled variants must
//! produce bit-identical results to the generic loop.

use crate::scalar::Scalar;

/// `y[b*i + k] += w[j] * x[b*cols[j] + k]` over all rows `i`, entries
/// `j` in the row, and block components `k`. Same signature for the
/// transpose kernels with `i` and `cols[j]` swapped.
pub(crate) type KernelFn = fn(usize, &[usize], &[usize], &[Scalar], &[Scalar], &mut [Scalar]);

/// Select the forward and transpose kernels for a block size.
pub(crate) fn select(bsize: usize) -> (KernelFn, KernelFn) {
    match bsize {
        1 => (mult_add_1, mult_transpose_add_1),
        2 => (mult_add_2, mult_transpose_add_2),
        3 => (mult_add_3, mult_transpose_add_3),
        5 => (mult_add_5, mult_transpose_add_5),
        6 => (mult_add_6, mult_transpose_add_6),
        _ => (mult_add_generic, mult_transpose_add_generic),
    }
}

pub(crate) fn mult_add_generic(
    bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = cols[j];
            for k in 0..bsize {
                y[bsize * i + k] += w[j] * x[bsize * c + k];
            }
        }
    }
}

pub(crate) fn mult_transpose_add_generic(
    bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = cols[j];
            for k in 0..bsize {
                y[bsize * c + k] += w[j] * x[bsize * i + k];
            }
        }
    }
}

fn mult_add_1(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            y[i] += w[j] * x[cols[j]];
        }
    }
}

fn mult_transpose_add_1(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            y[cols[j]] += w[j] * x[i];
        }
    }
}

fn mult_add_2(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 2 * cols[j];
            y[2 * i] += w[j] * x[c];
            y[2 * i + 1] += w[j] * x[c + 1];
        }
    }
}

fn mult_transpose_add_2(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 2 * cols[j];
            y[c] += w[j] * x[2 * i];
            y[c + 1] += w[j] * x[2 * i + 1];
        }
    }
}

fn mult_add_3(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 3 * cols[j];
            y[3 * i] += w[j] * x[c];
            y[3 * i + 1] += w[j] * x[c + 1];
            y[3 * i + 2] += w[j] * x[c + 2];
        }
    }
}

fn mult_transpose_add_3(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 3 * cols[j];
            y[c] += w[j] * x[3 * i];
            y[c + 1] += w[j] * x[3 * i + 1];
            y[c + 2] += w[j] * x[3 * i + 2];
        }
    }
}

fn mult_add_5(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 5 * cols[j];
            y[5 * i] += w[j] * x[c];
            y[5 * i + 1] += w[j] * x[c + 1];
            y[5 * i + 2] += w[j] * x[c + 2];
            y[5 * i + 3] += w[j] * x[c + 3];
            y[5 * i + 4] += w[j] * x[c + 4];
        }
    }
}

fn mult_transpose_add_5(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 5 * cols[j];
            y[c] += w[j] * x[5 * i];
            y[c + 1] += w[j] * x[5 * i + 1];
            y[c + 2] += w[j] * x[5 * i + 2];
            y[c + 3] += w[j] * x[5 * i + 3];
            y[c + 4] += w[j] * x[5 * i + 4];
        }
    }
}

fn mult_add_6(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 6 * cols[j];
            y[6 * i] += w[j] * x[c];
            y[6 * i + 1] += w[j] * x[c + 1];
            y[6 * i + 2] += w[j] * x[c + 2];
            y[6 * i + 3] += w[j] * x[c + 3];
            y[6 * i + 4] += w[j] * x[c + 4];
            y[6 * i + 5] += w[j] * x[c + 5];
        }
    }
}

fn mult_transpose_add_6(
    _bsize: usize,
    rowp: &[usize],
    cols: &[usize],
    w: &[Scalar],
    x: &[Scalar],
    y: &mut [Scalar],
) {
    for i in 0..rowp.len() - 1 {
        for j in rowp[i]..rowp[i + 1] {
            let c = 6 * cols[j];
            y[c] += w[j] * x[6 * i];
            y[c + 1] += w[j] * x[6 * i + 1];
            y[c + 2] += w[j] * x[6 * i + 2];
            y[c + 3] += w[j] * x[6 * i + 3];
            y[c + 4] += w[j] * x[6 * i + 4];
            y[c + 5] += w[j] * x[6 * i + 5];
        }
    }
}
