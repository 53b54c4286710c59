//! Ring-Pedersen commitment parameters.
//!
//! These are the public values `(N, s, t)`, with `s` and `t` both in the
//! subgroup of squares of `Z_N^*`, and the owner knowing `λ` with `s = t^λ`.
use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Signed};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::BITS_INT_MOD_N,
    hash::{Hash, WriteHash},
    paillier::{self, sample_unit},
};

/// The reasons Pedersen parameters can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PedersenError {
    #[error("modulus has {0} bits, expected {}", BITS_INT_MOD_N)]
    ModulusSize(u64),
    #[error("modulus is even")]
    EvenModulus,
    #[error("{0} is not in the range (1, N)")]
    OutOfRange(&'static str),
    #[error("s and t are equal")]
    Degenerate,
    #[error("{0} is not a unit modulo N")]
    NotUnit(&'static str),
}

/// Public parameters for Pedersen commitments modulo `N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    n: BigUint,
    s: BigUint,
    t: BigUint,
}

impl Parameters {
    pub fn new(n: BigUint, s: BigUint, t: BigUint) -> Self {
        Self { n, s, t }
    }

    /// Generate parameters sharing the modulus of a Paillier key.
    pub fn generate(rng: &mut impl CryptoRngCore, sk: &paillier::SecretKey) -> Self {
        let n = sk.public().n().clone();
        let tau = sample_unit(rng, &n);
        let t = tau.modpow(&BigUint::from(2u32), &n);
        let lambda = rng.gen_biguint_below(sk.phi());
        let s = t.modpow(&lambda, &n);
        Self { n, s, t }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn s(&self) -> &BigUint {
        &self.s
    }

    pub fn t(&self) -> &BigUint {
        &self.t
    }

    /// Check that these parameters are well formed.
    pub fn validate(&self) -> Result<(), PedersenError> {
        let bits = self.n.bits();
        if bits != BITS_INT_MOD_N as u64 {
            return Err(PedersenError::ModulusSize(bits));
        }
        if self.n.is_even() {
            return Err(PedersenError::EvenModulus);
        }
        for (name, x) in [("s", &self.s), ("t", &self.t)] {
            if *x <= BigUint::one() || *x >= self.n {
                return Err(PedersenError::OutOfRange(name));
            }
            if !x.gcd(&self.n).is_one() {
                return Err(PedersenError::NotUnit(name));
            }
        }
        if self.s == self.t {
            return Err(PedersenError::Degenerate);
        }
        Ok(())
    }

    /// Commit to `x` with randomness `y`, as `s^x t^y mod N`.
    pub fn commit(&self, x: &BigInt, y: &BigInt) -> BigUint {
        let s_x = pow_signed(&self.s, x, &self.n);
        let t_y = pow_signed(&self.t, y, &self.n);
        (s_x * t_y) % &self.n
    }
}

/// Raise a unit to a possibly negative exponent.
fn pow_signed(base: &BigUint, e: &BigInt, n: &BigUint) -> BigUint {
    let out = base.modpow(e.magnitude(), n);
    if e.is_negative() {
        // Validated parameters only ever hold units.
        out.modinv(n).unwrap_or_default()
    } else {
        out
    }
}

impl WriteHash for Parameters {
    fn write_hash(&self, hash: &mut Hash) {
        hash.write_uint(&self.n);
        hash.write_uint(&self.s);
        hash.write_uint(&self.t);
    }
}
