//! Parameters fixed at compile time.
//!
//! Every party in a session must agree on these, so they are not something
//! a caller can change at runtime.

/// The output length of the transcript hash, in bytes.
///
/// This is the length of a session identifier, and also the smallest amount
/// of output that may be squeezed out of a transcript in one go.
pub const HASH_BYTES: usize = 32;

/// The size of Paillier and Pedersen moduli, in bits.
pub const BITS_INT_MOD_N: usize = 2048;

/// The size of Paillier and Pedersen moduli, in bytes.
///
/// Integers which fit are written to transcripts with exactly this width.
pub const BYTES_INT_MOD_N: usize = BITS_INT_MOD_N / 8;

/// The size of each of the two primes making up a Paillier modulus.
pub const BITS_BLUM_PRIME: usize = BITS_INT_MOD_N / 2;

/// The size of the additive masks used when converting products of shares.
///
/// A product of two scalars takes at most 512 bits, so the masked value
/// stays far below the Paillier modulus and never wraps around.
pub const BITS_MTA_MASK: u64 = 768;

/// The domain separation label of the protocol transcript.
pub const TRANSCRIPT_LABEL: &[u8] = b"cmp-ecdsa v0.1.0 transcript";

/// The domain separation label used when deriving session identifiers.
pub const SESSION_LABEL: &[u8] = b"cmp-ecdsa v0.1.0 session";

/// The domain separation label used for commitments.
pub const COMMIT_LABEL: &[u8] = b"cmp-ecdsa v0.1.0 commitment";
