//! The transcript hash used throughout the protocols.
//!
//! A single [`Hash`] state is used wherever we need to derive a challenge,
//! a commitment, or a session identifier. It is an extendable-output function
//! built on Meow, so any amount of output can be squeezed out of it, and every
//! state starts from a domain separation label, so that no two uses of the
//! underlying primitive can collide.
use ck_meow::Meow;
use num_bigint::{BigInt, BigUint, Sign};
use rand_core::{CryptoRng, CryptoRngCore, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{
    compat::{CSCurve, SerializablePoint},
    constants::{BITS_INT_MOD_N, BYTES_INT_MOD_N, COMMIT_LABEL, HASH_BYTES, TRANSCRIPT_LABEL},
    party::PartyId,
    serde::encode,
};

const TAG_BYTES: u8 = 0x00;
const TAG_POINTS: u8 = 0x01;
const TAG_INT_FIXED: u8 = 0x02;
const TAG_INT_TAGGED: u8 = 0x03;
const TAG_NESTED: u8 = 0x04;

/// Something which knows how to write itself into a transcript.
///
/// This is how composite values, like public keys, become part of a transcript.
/// Implementations should only use the typed writing methods of [`Hash`].
pub trait WriteHash {
    fn write_hash(&self, hash: &mut Hash);
}

/// One value to write into a transcript.
///
/// This is the closed set of things a transcript can absorb, each with its own
/// unambiguous encoding:
///
/// - byte strings are length prefixed,
/// - points use their canonical encoding, and the sequence is length prefixed,
/// - integers are tagged by which of their two encodings is used,
/// - nested values write themselves, after a tag of their own.
pub enum HashItem<'a, C: CSCurve> {
    Bytes(&'a [u8]),
    Points(&'a [C::ProjectivePoint]),
    Int(&'a BigInt),
    Nested(&'a dyn WriteHash),
}

impl<'a, C: CSCurve> HashItem<'a, C> {
    fn write_into(&self, hash: &mut Hash) {
        match self {
            HashItem::Bytes(data) => hash.write_bytes(data),
            HashItem::Points(points) => hash.write_points::<C>(points),
            HashItem::Int(x) => hash.write_int(x),
            HashItem::Nested(value) => {
                hash.absorb(&[TAG_NESTED]);
                value.write_hash(hash);
            }
        }
    }
}

/// A domain separated, extendable-output hash state.
#[derive(Clone)]
pub struct Hash {
    meow: Meow,
    /// Whether or not the last operation on the state was absorbing data.
    absorbing: bool,
}

impl Hash {
    /// Create a fresh transcript for this protocol.
    pub fn new() -> Self {
        Self::with_label(TRANSCRIPT_LABEL)
    }

    /// Create a fresh state separated from every other use by a given label.
    pub fn with_label(label: &[u8]) -> Self {
        Self {
            meow: Meow::new(label),
            absorbing: false,
        }
    }

    fn absorb(&mut self, data: &[u8]) {
        self.meow.ad(data, self.absorbing);
        self.absorbing = true;
    }

    /// Write raw bytes into the state.
    ///
    /// Writing `a` then `b` is the same as writing `a || b`.
    pub fn write(&mut self, data: &[u8]) {
        self.absorb(data);
    }

    /// Write a sequence of typed values into the state.
    pub fn write_typed<C: CSCurve>(&mut self, items: &[HashItem<'_, C>]) {
        for item in items {
            item.write_into(self);
        }
    }

    /// Write a length prefixed byte string.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.absorb(&[TAG_BYTES]);
        self.absorb(&(data.len() as u64).to_be_bytes());
        self.absorb(data);
    }

    /// Write a sequence of points, using their canonical encoding.
    pub fn write_points<C: CSCurve>(&mut self, points: &[C::ProjectivePoint]) {
        self.absorb(&[TAG_POINTS]);
        self.absorb(&(points.len() as u64).to_be_bytes());
        for point in points {
            let encoded = encode(&SerializablePoint::<C>::from_projective(point));
            self.absorb(&(encoded.len() as u64).to_be_bytes());
            self.absorb(&encoded);
        }
    }

    /// Write a signed integer.
    pub fn write_int(&mut self, x: &BigInt) {
        self.write_integer(x.sign(), x.magnitude());
    }

    /// Write a non-negative integer.
    pub fn write_uint(&mut self, x: &BigUint) {
        let sign = if x.bits() == 0 {
            Sign::NoSign
        } else {
            Sign::Plus
        };
        self.write_integer(sign, x);
    }

    fn write_integer(&mut self, sign: Sign, magnitude: &BigUint) {
        let bytes = magnitude.to_bytes_be();
        // Positive values modulo N have a fixed width encoding, everything
        // else gets a sign and a length. The tag keeps the two apart.
        if sign == Sign::Plus && magnitude.bits() <= BITS_INT_MOD_N as u64 {
            let mut out = vec![0u8; 1 + BYTES_INT_MOD_N];
            out[0] = TAG_INT_FIXED;
            out[1 + BYTES_INT_MOD_N - bytes.len()..].copy_from_slice(&bytes);
            self.absorb(&out);
        } else {
            let sign = match sign {
                Sign::Minus => 0u8,
                Sign::NoSign => 1u8,
                Sign::Plus => 2u8,
            };
            self.absorb(&[TAG_INT_TAGGED, sign]);
            self.absorb(&(bytes.len() as u64).to_be_bytes());
            self.absorb(&bytes);
        }
    }

    /// Squeeze some bytes out of the state.
    ///
    /// # Panics
    ///
    /// Reading less than [`HASH_BYTES`] at once is a bug in the caller.
    pub fn read_bytes(&mut self, len: usize) -> Vec<u8> {
        assert!(
            len >= HASH_BYTES,
            "tried to read {len} bytes from a transcript, at least {HASH_BYTES} are needed"
        );
        let mut out = vec![0u8; len];
        self.meow.prf(&mut out, false);
        self.absorbing = false;
        out
    }

    /// Squeeze a single digest out of a copy of this state.
    pub fn digest(&self) -> [u8; HASH_BYTES] {
        let mut out = [0u8; HASH_BYTES];
        out.copy_from_slice(&self.clone().read_bytes(HASH_BYTES));
        out
    }

    /// Clone this state, and write the identity of a party into the clone.
    ///
    /// This binds whatever is derived from the clone to both the shared
    /// transcript and that specific party.
    pub fn clone_with_id(&self, id: &PartyId) -> Self {
        let mut out = self.clone();
        out.write_bytes(id.as_bytes());
        out
    }

    /// Create a source of randomness from a copy of this state.
    pub fn reader(&self) -> HashReader {
        HashReader {
            meow: self.meow.clone(),
            started: false,
        }
    }

    /// Derive a challenge scalar from a copy of this state.
    pub fn challenge<C: CSCurve>(&self) -> C::Scalar {
        <C::Scalar as elliptic_curve::Field>::random(&mut self.reader())
    }

    /// Commit to everything written into this state so far.
    ///
    /// The commitment is bound to a random decommitment, which needs to be
    /// revealed along with the committed values.
    pub fn commit(&self, rng: &mut impl CryptoRngCore) -> (Commitment, Decommitment) {
        let mut decommitment = [0u8; HASH_BYTES];
        rng.fill_bytes(&mut decommitment);
        let decommitment = Decommitment(decommitment);
        (self.commitment(&decommitment), decommitment)
    }

    /// Check that a commitment matches the values written into this state.
    pub fn decommit(&self, commitment: &Commitment, decommitment: &Decommitment) -> bool {
        self.commitment(decommitment)
            .0
            .ct_eq(&commitment.0)
            .into()
    }

    fn commitment(&self, decommitment: &Decommitment) -> Commitment {
        let mut hash = Hash::with_label(COMMIT_LABEL);
        hash.write_bytes(&self.digest());
        hash.write_bytes(&decommitment.0);
        Commitment(hash.digest())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream of pseudorandom bytes squeezed out of a transcript.
///
/// This is useful in proofs, which need the output of the hash as randomness.
pub struct HashReader {
    meow: Meow,
    started: bool,
}

impl RngCore for HashReader {
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.meow.prf(dest, self.started);
        self.started = true;
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for HashReader {}

/// Represents a commitment to some value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment([u8; HASH_BYTES]);

/// The randomness needed to open a [`Commitment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment([u8; HASH_BYTES]);
