//! Driving a chain of rounds as a [`Protocol`].
//!
//! The executor owns the current round. Incoming messages are sorted into
//! bins by round number, and delivered once the protocol reaches that round.
//! When the current round is complete, it gets finalized, replacing it with
//! the next round.
use tracing::{debug, error, warn};

use super::{
    envelope::Envelope,
    round::{Outbox, Outgoing, Round, RoundNumber, Transition},
    Action, MessageData, Protocol, ProtocolError,
};
use crate::party::PartyId;

/// Represents a queue of messages.
///
/// This is used to receive incoming messages as they arrive, and automatically
/// sort them into bins based on the round they're for.
#[derive(Debug, Clone)]
struct MessageQueue {
    /// We have one stack of messages for each round.
    stacks: Vec<Vec<Envelope>>,
}

impl MessageQueue {
    fn new(rounds: RoundNumber) -> Self {
        Self {
            stacks: vec![Vec::new(); usize::from(rounds) + 1],
        }
    }

    /// Push a new message into the queue.
    ///
    /// Messages for rounds beyond the last one get dropped, as do messages
    /// from a sender with one already waiting for the same round.
    fn push(&mut self, envelope: Envelope) -> Result<(), &'static str> {
        let stack = self
            .stacks
            .get_mut(usize::from(envelope.round))
            .ok_or("unknown round")?;
        if stack.iter().any(|queued| queued.from == envelope.from) {
            return Err("sender already has a message queued");
        }
        stack.push(envelope);
        Ok(())
    }

    /// Pop a message from a specific round, in the order they arrived.
    fn pop(&mut self, round: RoundNumber) -> Option<Envelope> {
        let stack = self.stacks.get_mut(usize::from(round))?;
        if stack.is_empty() {
            None
        } else {
            Some(stack.remove(0))
        }
    }
}

/// Runs the rounds of a protocol for a single party.
///
/// Messages are pushed in through [`Protocol::message`], and actions pulled
/// out through [`Protocol::poke`]. Finalization only ever happens inside of
/// `poke`, which takes the executor mutably, so it never overlaps with the
/// processing of a message.
pub struct Executor<R: Round> {
    round: Option<R>,
    queue: MessageQueue,
    outbox: Outbox,
    output: Option<R::Output>,
}

impl<R: Round> Executor<R> {
    /// Start executing a protocol from its first round.
    pub fn new(start: R) -> Self {
        Self {
            round: Some(start),
            queue: MessageQueue::new(R::ROUNDS),
            outbox: Outbox::new(),
            output: None,
        }
    }

    /// The round we're currently in, if the protocol is still running.
    pub fn current_round(&self) -> Option<RoundNumber> {
        self.round.as_ref().map(Round::number)
    }

    fn deliver(round: &mut R, queue: &mut MessageQueue) {
        let number = round.number();
        while let Some(envelope) = queue.pop(number) {
            if let Err(e) = round.process_message(&envelope) {
                warn!(from = %envelope.from, round = number, error = %e, "rejected message");
            }
        }
    }
}

impl<R: Round> Protocol for Executor<R> {
    type Output = R::Output;

    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError> {
        loop {
            match self.outbox.pop() {
                Some(Outgoing::Many(data)) => return Ok(Action::SendMany(data)),
                Some(Outgoing::Private(to, data)) => return Ok(Action::SendPrivate(to, data)),
                None => {}
            }
            if let Some(out) = self.output.take() {
                return Ok(Action::Return(out));
            }
            let Some(round) = self.round.as_mut() else {
                return Ok(Action::Wait);
            };
            Self::deliver(round, &mut self.queue);
            if !round.is_complete() {
                return Ok(Action::Wait);
            }

            let Some(round) = self.round.take() else {
                return Ok(Action::Wait);
            };
            let number = round.number();
            debug!(round = number, "finalizing round");
            match round.finalize(&mut self.outbox) {
                Ok(Transition::Next(next)) => {
                    debug!(from = number, to = next.number(), "advancing to next round");
                    self.round = Some(next);
                }
                Ok(Transition::Done(out)) => {
                    debug!(round = number, "protocol complete");
                    self.output = Some(out);
                }
                Err(e) => {
                    error!(round = number, error = %e, "protocol failed");
                    return Err(e);
                }
            }
        }
    }

    fn message(&mut self, from: PartyId, data: MessageData) {
        let envelope = match Envelope::parse(from.clone(), &data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(from = %from, error = %e, "dropping unparseable message");
                return;
            }
        };
        let current = self.current_round().unwrap_or(RoundNumber::MAX);
        if envelope.round < current {
            warn!(from = %envelope.from, round = envelope.round, current, "dropping stale message");
            return;
        }
        let (from, round) = (envelope.from.clone(), envelope.round);
        if let Err(reason) = self.queue.push(envelope) {
            warn!(from = %from, round, reason, "dropping message");
        }
    }
}
