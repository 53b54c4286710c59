//! The contract every round of a protocol follows.
//!
//! A protocol is a fixed chain of rounds. Each round collects the messages it
//! expects, one per sender, and then gets finalized, which consumes it and
//! produces either the next round, or the output of the whole protocol.
use std::collections::VecDeque;

use serde::{de::DeserializeOwned, Serialize};

use super::{envelope::Envelope, MessageData, MessageError, ProtocolError};
use crate::{participants::ParticipantMap, party::PartyId};

/// The number identifying a round inside of a protocol.
///
/// Rounds are numbered from 1, and this number is also the tag
/// carried by every message sent for that round.
pub type RoundNumber = u8;

/// The content of a message, sent for a specific round.
pub trait Content: Serialize + DeserializeOwned {
    /// The round this content is meant to be received in.
    const ROUND: RoundNumber;

    /// Check that this content is well formed on its own.
    ///
    /// This runs before the round ever sees the content.
    fn validate(&self) -> Result<(), MessageError> {
        Ok(())
    }
}

/// What finalizing a round produces.
#[derive(Debug)]
pub enum Transition<R, T> {
    /// Continue the protocol with another round.
    Next(R),
    /// The protocol is over, with some output.
    Done(T),
}

impl<R, T> Transition<R, T> {
    /// The output of the protocol, if this transition ends it.
    pub fn result(self) -> Option<T> {
        match self {
            Transition::Next(_) => None,
            Transition::Done(out) => Some(out),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Outgoing {
    Many(MessageData),
    Private(PartyId, MessageData),
}

/// The messages a round wants to send, as it gets finalized.
///
/// Sending never blocks: messages are queued up here, and picked up by
/// whoever drives the protocol.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send some content to every other party.
    pub fn send_many<T: Content>(&mut self, content: &T) {
        self.queue.push_back(Outgoing::Many(Envelope::seal(content)));
    }

    /// Send some content to a single other party.
    pub fn send_private<T: Content>(&mut self, to: &PartyId, content: &T) {
        self.queue
            .push_back(Outgoing::Private(to.clone(), Envelope::seal(content)));
    }

    pub(crate) fn pop(&mut self) -> Option<Outgoing> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// One stage of a protocol, from the point of view of a single party.
///
/// Protocols implement this with an enum, with one variant per round.
pub trait Round: Sized {
    type Output;

    /// The number of the last round of this protocol.
    const ROUNDS: RoundNumber;

    /// The number of the round this value is currently in.
    fn number(&self) -> RoundNumber;

    /// Fold a message for this round into its state.
    ///
    /// This fails on messages from unknown senders, on a second message
    /// from the same sender, and on malformed content. A failure never
    /// modifies the state of the round.
    fn process_message(&mut self, envelope: &Envelope) -> Result<(), MessageError>;

    /// Whether every message this round needs has arrived.
    fn is_complete(&self) -> bool;

    /// Consume this round, producing the next one, or the output.
    ///
    /// This should only be called once the round is complete. Any messages
    /// for the next round get queued into the outbox.
    fn finalize(self, outbox: &mut Outbox) -> Result<Transition<Self, Self::Output>, ProtocolError>;
}

/// Accept a message into an accumulator, holding one entry per sender.
///
/// The sender is checked before the content gets decoded, and nothing is
/// stored unless both checks pass.
pub(crate) fn accumulate<T: Content, U>(
    map: &mut ParticipantMap<U>,
    envelope: &Envelope,
    f: impl FnOnce(T) -> U,
) -> Result<(), MessageError> {
    map.check_vacant(&envelope.from)?;
    let content = envelope.decode::<T>()?;
    map.put(&envelope.from, f(content))
}

/// Put our own contribution into an accumulator.
pub(crate) fn put_own<U>(
    map: &mut ParticipantMap<U>,
    me: &PartyId,
    value: U,
) -> Result<(), ProtocolError> {
    map.put(me, value)
        .map_err(|e| ProtocolError::AssertionFailed(e.to_string()))
}
