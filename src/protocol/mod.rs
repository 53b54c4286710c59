//! This module provides abstractions for working with protocols.
//!
//! This library tries to abstract away as much of the internal machinery
//! of protocols as much as possible. To use a protocol, you just need to be able
//! to deliver messages to and from that protocol, and eventually it will produce
//! a result, without you having to worry about how many rounds it has, or how
//! to serialize the messages it produces.
//!
//! Internally, every protocol is a chain of [`round::Round`]s, driven by an
//! [`executor::Executor`].
use std::{collections::HashMap, error};

use thiserror::Error;

use crate::party::{PartyId, PublicError};

pub mod envelope;
pub mod executor;
pub mod round;

/// Represents an error which can happen when running a protocol.
///
/// These are fatal to the session they happen in.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Some assertion in the protocol failed.
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("commitment from {from} does not open")]
    CommitmentMismatch { from: PartyId },
    #[error("proof from {from} failed to verify")]
    ProofFailed { from: PartyId },
    #[error("failed to decrypt the message from {from}")]
    Decryption { from: PartyId },
    #[error("presignature shares are inconsistent")]
    InconsistentPresignature,
    /// The assembled signature fails the group equation.
    #[error("signature failed to verify")]
    SignatureInvalid,
    /// The assembled signature fails the curve's own ECDSA verifier.
    #[error("signature failed ECDSA verification")]
    SignatureInvalidEcdsa,
    #[error("invalid public state: {0}")]
    Public(#[from] PublicError),
    /// Some generic error happened.
    #[error("{0}")]
    Other(#[from] Box<dyn error::Error + Send + Sync>),
}

/// Represents an error which can happen when *initializing* a protocol.
///
/// These are related to bad parameters for the protocol, and things like that.
///
/// These are usually more recoverable than other protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitializationError {
    #[error("bad parameters: {0}")]
    BadParameters(String),
}

/// Represents an error with a single incoming message.
///
/// These never abort a session: the offending message is dropped, and the
/// round keeps waiting for the remaining senders.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is for round {found}, expected round {expected}")]
    RoundMismatch { expected: u8, found: u8 },
    #[error("unknown sender {0}")]
    UnknownSender(PartyId),
    #[error("duplicate message from {0}")]
    DuplicateSender(PartyId),
    #[error("empty message")]
    Empty,
    #[error("failed to decode message: {0}")]
    Decode(String),
    #[error("{0} must not be zero")]
    ZeroValue(&'static str),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("invalid public state: {0}")]
    Public(#[from] PublicError),
}

impl From<rmp_serde::decode::Error> for MessageError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Represents the data making up a message.
///
/// We choose to just represent messages as opaque vectors of bytes, with all
/// the serialization logic handled internally.
pub type MessageData = Vec<u8>;

/// Represents an action by a participant in the protocol.
///
/// The basic flow is that each participant receives messages from other participants,
/// and then reacts with some kind of action.
///
/// This action can consist of sending a message, doing nothing, etc.
///
/// Eventually, the participant returns a value, ending the protocol.
#[derive(Debug, Clone)]
pub enum Action<T> {
    /// Don't do anything.
    Wait,
    /// Send a message to all other participants.
    ///
    /// Participants *never* sends messages to themselves.
    SendMany(MessageData),
    /// Send a private message to another participant.
    ///
    /// It's imperative that only this participant can read this message,
    /// so you might want to use some form of encryption.
    SendPrivate(PartyId, MessageData),
    /// End the protocol by returning a value.
    Return(T),
}

/// A trait for protocols.
///
/// Basically, this represents a struct for the behavior of a single participant
/// in a protocol. The idea is that the computation of that participant is driven
/// mainly by receiving messages from other participants.
pub trait Protocol {
    type Output;

    /// Poke the protocol, receiving a new action.
    ///
    /// The idea is that the protocol should be poked until it returns an error,
    /// or it returns an action with a return value, or it returns a wait action.
    ///
    /// Upon returning a wait action, that protocol will not advance any further
    /// until a new message arrives.
    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;

    /// Inform the protocol of a new message.
    fn message(&mut self, from: PartyId, data: MessageData);
}

/// Run a protocol to completion, synchronously.
///
/// This works by executing each participant in order.
///
/// The reason this function exists is as a convenient testing utility.
/// In practice each protocol participant is likely running on a different machine,
/// and so orchestrating the protocol would happen differently.
pub fn run_protocol<T>(
    mut ps: Vec<(PartyId, Box<dyn Protocol<Output = T>>)>,
) -> Result<Vec<(PartyId, T)>, ProtocolError> {
    let indices: HashMap<PartyId, usize> = ps
        .iter()
        .enumerate()
        .map(|(i, (p, _))| (p.clone(), i))
        .collect();

    let size = ps.len();
    let mut out = Vec::with_capacity(size);
    while out.len() < size {
        for i in 0..size {
            while {
                let action = ps[i].1.poke()?;
                match action {
                    Action::Wait => false,
                    Action::SendMany(m) => {
                        for j in 0..size {
                            if i == j {
                                continue;
                            }
                            let from = ps[i].0.clone();
                            ps[j].1.message(from, m.clone());
                        }
                        true
                    }
                    Action::SendPrivate(to, m) => {
                        let from = ps[i].0.clone();
                        ps[indices[&to]].1.message(from, m);
                        true
                    }
                    Action::Return(r) => {
                        out.push((ps[i].0.clone(), r));
                        false
                    }
                }
            } {}
        }
    }

    Ok(out)
}
