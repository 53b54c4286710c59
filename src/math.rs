//! Conversions between scalars and arbitrary precision integers.
use elliptic_curve::{Field, PrimeField};
use num_bigint::BigUint;

use crate::compat::CSCurve;

/// Convert a scalar into an integer in `[0, q)`.
pub fn biguint_from_scalar<C: CSCurve>(s: &C::Scalar) -> BigUint {
    BigUint::from_bytes_be(s.to_repr().as_ref())
}

/// Reduce an integer modulo the order of the curve.
pub fn scalar_from_biguint<C: CSCurve>(x: &BigUint) -> C::Scalar {
    let base = C::Scalar::from(256u64);
    x.to_bytes_be()
        .into_iter()
        .fold(C::Scalar::ZERO, |acc, byte| {
            acc * base + C::Scalar::from(u64::from(byte))
        })
}
