//! Single-process operator tests.
//!
//! These run the full lifecycle (stage, finalize, apply) over the
//! no-op communication backend. Multi-rank behaviour is covered by
//! `tests/distributed_test.rs`.

#![cfg(not(feature = "complex"))]

use std::sync::Arc;

use approx::assert_relative_eq;
use prolong::{DistVector, IndexMap, Interp, SingleProcessComm};

fn single_map(block_size: usize, count: usize) -> Arc<IndexMap> {
    Arc::new(IndexMap::new(Arc::new(SingleProcessComm), block_size, vec![0, count]).unwrap())
}

fn vector_of(map: &Arc<IndexMap>, values: &[f64]) -> DistVector {
    let mut v = DistVector::new(map.clone());
    v.local_mut().copy_from_slice(values);
    v
}

/// Two output points drawing from three inputs, scalar blocks.
fn two_by_three() -> (Interp, Arc<IndexMap>, Arc<IndexMap>) {
    let in_map = single_map(1, 3);
    let out_map = single_map(1, 2);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();
    p.add_row(0, &[1.0, 1.0], &[0, 1]).unwrap();
    p.add_row(1, &[2.0], &[2]).unwrap();
    p.finalize().unwrap();
    (p, in_map, out_map)
}

#[test]
fn averaging_rows_normalise_and_apply() {
    let (mut p, in_map, out_map) = two_by_three();
    assert_eq!(p.nnz(), Some((3, 0)));

    let x = vector_of(&in_map, &[4.0, 6.0, 10.0]);
    let mut y = DistVector::new(out_map);
    p.apply(&x, &mut y).unwrap();
    assert_eq!(y.local(), &[5.0, 10.0]);
}

#[test]
fn block_components_share_the_row_weights() {
    let in_map = single_map(3, 2);
    let out_map = single_map(3, 1);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();
    p.add_row(0, &[3.0, 1.0], &[0, 1]).unwrap();
    p.finalize().unwrap();

    let x = vector_of(&in_map, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let mut y = DistVector::new(out_map);
    p.apply(&x, &mut y).unwrap();
    assert_eq!(y.local(), &[1.75, 2.75, 3.75]);
}

#[test]
fn duplicate_input_indices_collapse() {
    let in_map = single_map(1, 6);
    let out_map = single_map(1, 1);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();
    p.add_row(0, &[1.0, 2.0], &[5, 5]).unwrap();
    p.finalize().unwrap();
    assert_eq!(p.nnz(), Some((1, 0)));

    let x = vector_of(&in_map, &[0.0, 0.0, 0.0, 0.0, 0.0, 7.0]);
    let mut y = DistVector::new(out_map);
    p.apply(&x, &mut y).unwrap();
    // Collapsed weight 3 normalises to 1.
    assert_eq!(y.local(), &[7.0]);
}

#[test]
fn forward_and_transpose_are_adjoint() {
    let (mut p, in_map, out_map) = two_by_three();

    let x = vector_of(&in_map, &[1.0, 2.0, 3.0]);
    let y = vector_of(&out_map, &[7.0, 11.0]);

    let mut px = DistVector::new(out_map);
    p.apply(&x, &mut px).unwrap();
    let mut pty = DistVector::new(in_map);
    p.apply_transpose(&y, &mut pty).unwrap();

    let lhs: f64 = px.local().iter().zip(y.local()).map(|(a, b)| a * b).sum();
    let rhs: f64 = x.local().iter().zip(pty.local()).map(|(a, b)| a * b).sum();
    assert_eq!(lhs, 43.5);
    assert_relative_eq!(lhs, rhs, max_relative = 1e-14);
}

#[test]
fn apply_is_linear() {
    let (mut p, in_map, out_map) = two_by_three();
    let x1 = vector_of(&in_map, &[1.0, -2.0, 0.5]);
    let x2 = vector_of(&in_map, &[3.0, 0.25, -1.0]);
    let (alpha, beta) = (2.5, -0.75);

    let combined = vector_of(
        &in_map,
        &[
            alpha * 1.0 + beta * 3.0,
            alpha * -2.0 + beta * 0.25,
            alpha * 0.5 + beta * -1.0,
        ],
    );

    let mut y1 = DistVector::new(out_map.clone());
    let mut y2 = DistVector::new(out_map.clone());
    let mut yc = DistVector::new(out_map);
    p.apply(&x1, &mut y1).unwrap();
    p.apply(&x2, &mut y2).unwrap();
    p.apply(&combined, &mut yc).unwrap();

    for i in 0..2 {
        assert_relative_eq!(
            yc.local()[i],
            alpha * y1.local()[i] + beta * y2.local()[i],
            max_relative = 1e-13
        );
    }
}

#[test]
fn positive_rows_preserve_constants() {
    let in_map = single_map(1, 4);
    let out_map = single_map(1, 3);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();
    p.add_row(0, &[1.0, 1.0], &[0, 1]).unwrap();
    p.add_row(1, &[3.0, 1.0], &[1, 2]).unwrap();
    p.add_row(2, &[2.0, 2.0, 4.0], &[1, 2, 3]).unwrap();
    p.finalize().unwrap();

    let ones = vector_of(&in_map, &[1.0; 4]);
    let mut y = DistVector::new(out_map);
    p.apply(&ones, &mut y).unwrap();
    assert_eq!(y.local(), &[1.0, 1.0, 1.0]);
}

#[test]
fn apply_add_offsets_the_product() {
    let (mut p, in_map, out_map) = two_by_three();
    let x = vector_of(&in_map, &[4.0, 6.0, 10.0]);
    let z = vector_of(&out_map, &[100.0, 200.0]);

    let mut y = DistVector::new(out_map.clone());
    p.apply_add(&x, Some(&z), &mut y).unwrap();
    assert_eq!(y.local(), &[105.0, 210.0]);

    // Aliased form: accumulate into the existing contents.
    let mut y = vector_of(&out_map, &[100.0, 200.0]);
    p.apply_add(&x, None, &mut y).unwrap();
    assert_eq!(y.local(), &[105.0, 210.0]);
}

#[test]
fn apply_transpose_add_offsets_the_product() {
    let (mut p, in_map, out_map) = two_by_three();
    let y = vector_of(&out_map, &[7.0, 11.0]);
    let z = vector_of(&in_map, &[1.0, 1.0, 1.0]);

    let mut out = DistVector::new(in_map.clone());
    p.apply_transpose_add(&y, Some(&z), &mut out).unwrap();
    assert_eq!(out.local(), &[4.5, 4.5, 12.0]);

    let mut out = vector_of(&in_map, &[1.0, 1.0, 1.0]);
    p.apply_transpose_add(&y, None, &mut out).unwrap();
    assert_eq!(out.local(), &[4.5, 4.5, 12.0]);
}

#[test]
fn empty_rows_produce_zero_output() {
    let in_map = single_map(1, 2);
    let out_map = single_map(1, 3);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();
    p.add_row(1, &[2.0], &[0]).unwrap();
    p.finalize().unwrap();

    let x = vector_of(&in_map, &[5.0, 6.0]);
    let mut y = vector_of(&out_map, &[9.0, 9.0, 9.0]);
    p.apply(&x, &mut y).unwrap();
    assert_eq!(y.local(), &[0.0, 5.0, 0.0]);
}

#[test]
fn lifecycle_misuse_is_reported() {
    let in_map = single_map(1, 2);
    let out_map = single_map(1, 2);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();

    let x_in = DistVector::new(in_map.clone());
    let x_out = DistVector::new(out_map.clone());
    let mut y_out = DistVector::new(out_map);
    let mut y_in = DistVector::new(in_map);
    assert!(p.apply(&x_in, &mut y_out).is_err());
    assert!(p.apply_transpose(&x_out, &mut y_in).is_err());

    p.add_row(0, &[1.0], &[0]).unwrap();
    p.finalize().unwrap();
    assert!(p.finalize().is_err());
    assert!(p.add_row(1, &[1.0], &[1]).is_err());

    // The failed calls left the operator usable.
    assert!(p.apply(&x_in, &mut y_out).is_ok());
    assert!(p.apply_transpose(&x_out, &mut y_in).is_ok());
}

#[test]
fn out_of_range_rows_and_entries_are_dropped() {
    let in_map = single_map(1, 3);
    let out_map = single_map(1, 2);
    let mut p = Interp::new(in_map.clone(), out_map.clone()).unwrap();

    // Row for a nonexistent output: logged and ignored.
    p.add_row(9, &[1.0], &[0]).unwrap();
    // Entry for a nonexistent input: dropped from the row.
    p.add_row(0, &[1.0, 1.0], &[0, 17]).unwrap();
    p.finalize().unwrap();
    assert_eq!(p.nnz(), Some((1, 0)));

    let x = vector_of(&in_map, &[3.0, 0.0, 0.0]);
    let mut y = DistVector::new(out_map);
    p.apply(&x, &mut y).unwrap();
    // The surviving entry is normalised on its own.
    assert_eq!(y.local(), &[3.0, 0.0]);
}

#[test]
fn mismatched_block_sizes_are_rejected() {
    let in_map = single_map(2, 3);
    let out_map = single_map(3, 2);
    assert!(Interp::new(in_map, out_map).is_err());
}

#[test]
fn dump_lists_owned_weights() {
    let (p, _, _) = two_by_three();
    let mut out = Vec::new();
    p.dump_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Row: 0"));
    assert!(text.contains("(0,0.500000)"));
    assert!(text.contains("(1,0.500000)"));
    assert!(text.contains("(2,1.000000)"));
}

#[test]
fn dump_before_finalize_is_an_error() {
    let in_map = single_map(1, 2);
    let out_map = single_map(1, 2);
    let p = Interp::new(in_map, out_map).unwrap();
    let mut out = Vec::new();
    assert!(p.dump_to(&mut out).is_err());
}
