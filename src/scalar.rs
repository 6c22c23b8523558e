//! Scalar type selection.
//!
//! The operator is compiled for a single scalar type: `f64` by default,
//! `Complex64` with the `complex` feature. Interpolation weights and
//! vector components share this type. The helpers below isolate the few
//! places where the real and complex cases differ (the zero test used
//! by row normalisation, the real part used by the dump threshold, and
//! the wire layout used by the MPI backend).

#[cfg(feature = "complex")]
pub type Scalar = num_complex::Complex64;

#[cfg(not(feature = "complex"))]
pub type Scalar = f64;

/// Number of `f64` words a scalar occupies on the wire.
#[cfg(all(feature = "distributed", feature = "complex"))]
pub(crate) const WIRE_WIDTH: usize = 2;

#[cfg(all(feature = "distributed", not(feature = "complex")))]
pub(crate) const WIRE_WIDTH: usize = 1;

#[inline]
pub fn zero() -> Scalar {
    #[cfg(feature = "complex")]
    {
        num_complex::Complex64::new(0.0, 0.0)
    }
    #[cfg(not(feature = "complex"))]
    {
        0.0
    }
}

/// Build a scalar from a real value (imaginary part zero).
#[inline]
pub fn from_real(r: f64) -> Scalar {
    #[cfg(feature = "complex")]
    {
        num_complex::Complex64::new(r, 0.0)
    }
    #[cfg(not(feature = "complex"))]
    {
        r
    }
}

/// Real part of a scalar.
#[inline]
pub fn real(s: Scalar) -> f64 {
    #[cfg(feature = "complex")]
    {
        s.re
    }
    #[cfg(not(feature = "complex"))]
    {
        s
    }
}

/// Exact zero test. Rows whose weight sum is exactly zero are left
/// unnormalised, so no tolerance is applied here.
#[inline]
pub fn is_zero(s: Scalar) -> bool {
    s == zero()
}

/// Flatten scalars into `f64` words for transport.
#[cfg(feature = "distributed")]
pub(crate) fn pack(values: &[Scalar]) -> Vec<f64> {
    let mut wire = Vec::with_capacity(values.len() * WIRE_WIDTH);
    for &v in values {
        #[cfg(feature = "complex")]
        {
            wire.push(v.re);
            wire.push(v.im);
        }
        #[cfg(not(feature = "complex"))]
        {
            wire.push(v);
        }
    }
    wire
}

/// Inverse of [`pack`], writing into an existing scalar buffer.
#[cfg(feature = "distributed")]
pub(crate) fn unpack_into(wire: &[f64], out: &mut [Scalar]) {
    assert_eq!(wire.len(), out.len() * WIRE_WIDTH);
    for (i, slot) in out.iter_mut().enumerate() {
        #[cfg(feature = "complex")]
        {
            *slot = num_complex::Complex64::new(wire[2 * i], wire[2 * i + 1]);
        }
        #[cfg(not(feature = "complex"))]
        {
            *slot = wire[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(is_zero(zero()));
        assert!(!is_zero(from_real(1.0)));
    }

    #[test]
    fn real_roundtrip() {
        assert_eq!(real(from_real(2.5)), 2.5);
    }
}
