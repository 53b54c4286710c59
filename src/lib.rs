//! A threshold ECDSA implementation in the CMP family of protocols,
//! where every party holds an additive share of the secret key, and all
//! of them need to take part in order to sign.
//!
//! # Warning
//!
//! This is experimental cryptographic software, I would exercise caution.
//!
//! - The zero-knowledge range proofs of the full protocol are not implemented,
//! so this is only secure against parties following the protocol honestly.
//! - This library has not undergone any form of audit.
//!
//! # Design
//!
//! Signing happens in three phases:
//!
//! - The parties run a distributed key generation protocol, to setup a new key pair,
//! which can be used for many signatures. Each party also publishes a Paillier key,
//! and Pedersen parameters, during this phase.
//! - Using their shares of the private key, the parties can create a *presignature*,
//! before knowing the message to sign. This converts products of secret shares into
//! sums using Paillier encryption.
//! - Once they know this message, they can use the presignature to create a complete signature,
//! in a single round.
//!
//! It's important that presignatures are **never** reused.
//!
//! Everything a party knows publicly about the others lives in a [`Parties`] value,
//! tied to a single session through a [`SessionId`]. The transcripts of every protocol
//! are built with a [`Hash`], which absorbs typed values, and squeezes out challenges,
//! commitments, and identifiers.
//!
//! ## API Design
//!
//! Internally, the API tries to be as simple as possible abstracting away
//! as many details as possible into a simple interface.
//!
//! This interface just has two methods:
//! ```ignore
//! pub trait Protocol {
//!    type Output;
//!
//!    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;
//!    fn message(&mut self, from: PartyId, data: MessageData);
//! }
//! ```
//! Given an instance of this trait, which represents a single party
//! participating in a protocol, you can do two things:
//! - You can provide a new message received from some other party.
//! - You can "poke" the protocol to see if it has some kind of action it wants you to perform, or if an error happened.
//!
//! This action is either:
//! - The protocol telling you it has finished, with a return value of type `Output`.
//! - The protocol asking you to send a message to all other parties.
//! - The protocol asking you to *privately* send a message to one party.
//! - The protocol informing you that no more progress can be made until it receives new messages.
//!
//! Under the hood, each protocol is a chain of rounds, see [`protocol::round::Round`].
//! Messages carry the number of the round they're meant for, and arrive in any order:
//! messages for later rounds are held back until the protocol gets there, while
//! malformed, duplicated, or stale messages get dropped, and logged with `tracing`.
//!
//! # Generic Curves
//!
//! The support for generic curves is done through a custom `CSCurve` trait,
//! which can be easily implemented for any curve from the
//! RustCrypto [elliptic-curves](https://github.com/RustCrypto/elliptic-curves)
//! suite of libraries.
//!
//! This crate also provides implementations of some existing curves behind features,
//! as per the following table:
//!
//! | Curve | Feature |
//! |-------|---------|
//! |Secp256k1|`k256`|
//! |P-256|`p256`|
//!
//! For supporting any message hash, the API requires the user to supply
//! the hash of a message when signing as a scalar directly.
mod compat;
pub mod constants;
pub mod hash;
mod keygen;
mod math;
pub mod paillier;
mod participants;
pub mod party;
pub mod pedersen;
mod presign;
mod proofs;
pub mod protocol;
mod serde;
mod sign;
#[cfg(test)]
mod test;

pub use compat::CSCurve;
pub use hash::Hash;
pub use keygen::{keygen, KeygenArguments, KeygenOutput};
pub use participants::{ParticipantList, ParticipantMap};
pub use party::{Parties, PartyId, Public, SessionId};
pub use presign::{presign, PresignArguments, PresignOutput};
pub use sign::{sign, FullSignature};
