//! A minimal implementation of Paillier encryption.
//!
//! We only need what the multiplicative-to-additive conversions in presigning
//! use: encryption, homomorphic addition, multiplication by a constant,
//! and decryption. The generator is fixed to `N + 1`.
use std::fmt;

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_prime::{nt_funcs::is_prime, RandPrime};
use num_traits::{One, Zero};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{BITS_BLUM_PRIME, BITS_INT_MOD_N},
    hash::{Hash, WriteHash},
};

/// The reasons Paillier key material can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaillierError {
    #[error("modulus has {0} bits, expected {}", BITS_INT_MOD_N)]
    ModulusSize(u64),
    #[error("modulus is even")]
    EvenModulus,
    #[error("ciphertext is not a unit modulo N^2")]
    InvalidCiphertext,
    #[error("bad prime factor: {0}")]
    BadPrime(&'static str),
}

/// Sample a uniform element of `Z_n^*`.
pub(crate) fn sample_unit(rng: &mut impl CryptoRngCore, n: &BigUint) -> BigUint {
    loop {
        let x = rng.gen_biguint_below(n);
        if !x.is_zero() && x.gcd(n).is_one() {
            return x;
        }
    }
}

/// A Paillier ciphertext, an element of `Z_{N^2}^*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(BigUint);

impl Ciphertext {
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_value(value: BigUint) -> Self {
        Self(value)
    }
}

/// The randomness used to produce a ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce(BigUint);

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce([redacted])")
    }
}

/// A Paillier public key, consisting of a modulus `N = p * q`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    n: BigUint,
}

impl PublicKey {
    pub fn new(n: BigUint) -> Self {
        Self { n }
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn nn(&self) -> BigUint {
        &self.n * &self.n
    }

    /// Check that this modulus has the right size, and is odd.
    ///
    /// This doesn't check that the modulus is a product of two primes,
    /// which would require a proof from the owner of the key.
    pub fn validate(&self) -> Result<(), PaillierError> {
        let bits = self.n.bits();
        if bits != BITS_INT_MOD_N as u64 {
            return Err(PaillierError::ModulusSize(bits));
        }
        if self.n.is_even() {
            return Err(PaillierError::EvenModulus);
        }
        Ok(())
    }

    /// Check that a ciphertext is a unit modulo `N^2`.
    pub fn validate_ciphertext(&self, c: &Ciphertext) -> Result<(), PaillierError> {
        if c.0.is_zero() || c.0 >= self.nn() || !c.0.gcd(&self.n).is_one() {
            return Err(PaillierError::InvalidCiphertext);
        }
        Ok(())
    }

    /// Encrypt a message, which gets reduced modulo `N`.
    pub fn encrypt(&self, rng: &mut impl CryptoRngCore, m: &BigInt) -> (Ciphertext, Nonce) {
        let nonce = Nonce(sample_unit(rng, &self.n));
        (self.encrypt_with_nonce(m, &nonce), nonce)
    }

    /// Encrypt a message, with some explicit randomness.
    pub fn encrypt_with_nonce(&self, m: &BigInt, nonce: &Nonce) -> Ciphertext {
        let nn = self.nn();
        let m = m
            .mod_floor(&BigInt::from(self.n.clone()))
            .to_biguint()
            .unwrap_or_default();
        // (1 + N)^m = 1 + m N (mod N^2)
        let g_m = (BigUint::one() + &m * &self.n) % &nn;
        let rho_n = nonce.0.modpow(&self.n, &nn);
        Ciphertext((g_m * rho_n) % &nn)
    }

    /// Homomorphically add the plaintexts of two ciphertexts.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
        Ciphertext((&a.0 * &b.0) % self.nn())
    }

    /// Homomorphically multiply the plaintext of a ciphertext by a constant.
    pub fn mul(&self, c: &Ciphertext, k: &BigUint) -> Ciphertext {
        Ciphertext(c.0.modpow(k, &self.nn()))
    }
}

impl WriteHash for PublicKey {
    fn write_hash(&self, hash: &mut Hash) {
        hash.write_uint(&self.n);
    }
}

/// A Paillier secret key, holding the totient of the modulus.
#[derive(Clone)]
pub struct SecretKey {
    public: PublicKey,
    phi: BigUint,
    mu: BigUint,
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public)
            .field("phi", &"[redacted]")
            .finish()
    }
}

impl SecretKey {
    /// Create a secret key from two distinct Blum primes.
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self, PaillierError> {
        let three = BigUint::from(3u32);
        let four = BigUint::from(4u32);
        for x in [&p, &q] {
            if x.bits() != BITS_BLUM_PRIME as u64 {
                return Err(PaillierError::BadPrime("wrong size"));
            }
            if x % &four != three {
                return Err(PaillierError::BadPrime("not congruent to 3 mod 4"));
            }
            if !is_prime(x, None).probably() {
                return Err(PaillierError::BadPrime("not prime"));
            }
        }
        if p == q {
            return Err(PaillierError::BadPrime("factors are equal"));
        }

        let public = PublicKey::new(&p * &q);
        public.validate()?;

        let phi = (&p - 1u32) * (&q - 1u32);
        let mu = phi
            .modinv(public.n())
            .ok_or(PaillierError::BadPrime("phi(N) is not invertible mod N"))?;

        Ok(Self {
            public,
            phi,
            mu,
        })
    }

    /// Generate a fresh secret key.
    ///
    /// This is slow, taking on the order of seconds.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        let mut blum_prime = || loop {
            let p: BigUint = rng.gen_prime(BITS_BLUM_PRIME, None);
            if p.bits() == BITS_BLUM_PRIME as u64 && &p % 4u32 == BigUint::from(3u32) {
                return p;
            }
        };
        loop {
            let p = blum_prime();
            let q = blum_prime();
            if let Ok(sk) = Self::from_primes(p, q) {
                return sk;
            }
        }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Euler's totient of the modulus.
    pub(crate) fn phi(&self) -> &BigUint {
        &self.phi
    }

    /// Decrypt a ciphertext, returning the plaintext in `[0, N)`.
    pub fn decrypt(&self, c: &Ciphertext) -> Result<BigUint, PaillierError> {
        self.public.validate_ciphertext(c)?;
        let n = self.public.n();
        let nn = self.public.nn();
        // L(x) = (x - 1) / N
        let x = c.0.modpow(&self.phi, &nn);
        let l = (x - 1u32) / n;
        Ok((l * &self.mu) % n)
    }
}
