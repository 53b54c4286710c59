//! This module holds some utilities for working with participants.
//!
//! Often you need to do things like, storing one item for each participant,
//! or iterating over everybody but yourself.
//! This module tries to provide useful data structures for doing that.

use std::{collections::HashMap, ops::Index, sync::Arc};

use crate::{
    hash::{Hash, WriteHash},
    party::PartyId,
    protocol::MessageError,
};

/// Represents a sorted list of participants.
///
/// The advantage of this data structure is that it can be hashed in the protocol transcript,
/// since everybody will agree on its order.
///
/// Cloning a list is cheap, since the data is shared.
#[derive(Debug, Clone)]
pub struct ParticipantList {
    participants: Arc<[PartyId]>,
    /// This maps each participant to their index in the slice above.
    indices: Arc<HashMap<PartyId, usize>>,
}

impl ParticipantList {
    /// Create a participant list from a slice of participants.
    ///
    /// This will return None if the participants have duplicates.
    pub fn new(participants: &[PartyId]) -> Option<Self> {
        let mut out = participants.to_owned();
        out.sort();

        let indices: HashMap<_, _> = out
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i))
            .collect();

        if indices.len() < out.len() {
            return None;
        }

        Some(Self {
            participants: out.into(),
            indices: Arc::new(indices),
        })
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Check if this list has a given participant.
    pub fn contains(&self, participant: &PartyId) -> bool {
        self.indices.contains_key(participant)
    }

    /// Iterate over all participants, in order.
    pub fn iter(&self) -> impl Iterator<Item = &PartyId> {
        self.participants.iter()
    }

    /// Iterate over the other participants
    pub fn others<'a>(&'a self, me: &'a PartyId) -> impl Iterator<Item = &'a PartyId> + 'a {
        self.participants.iter().filter(move |x| *x != me)
    }

    /// Return the index of a given participant.
    ///
    /// Basically, the order they appear in a sorted list
    pub fn index(&self, participant: &PartyId) -> Option<usize> {
        self.indices.get(participant).copied()
    }

    /// Return a copy of this list, without one participant.
    pub fn without(&self, me: &PartyId) -> Self {
        let others: Vec<_> = self.others(me).cloned().collect();
        // Removing an element from a list without duplicates can't create any.
        Self::new(&others).unwrap_or_else(|| self.clone())
    }
}

impl WriteHash for ParticipantList {
    fn write_hash(&self, hash: &mut Hash) {
        hash.write_bytes(&(self.participants.len() as u64).to_be_bytes());
        for p in self.participants.iter() {
            hash.write_bytes(p.as_bytes());
        }
    }
}

/// A map from participants to elements.
///
/// The idea is that you have one element for each participant.
/// Each participant can only put their element in once.
#[derive(Debug, Clone)]
pub struct ParticipantMap<T> {
    participants: ParticipantList,
    data: Vec<Option<T>>,
    count: usize,
}

impl<T> ParticipantMap<T> {
    /// Create a new map from a list of participants.
    pub fn new(participants: &ParticipantList) -> Self {
        let data = (0..participants.len()).map(|_| None).collect();
        Self {
            participants: participants.clone(),
            data,
            count: 0,
        }
    }

    /// Check if this map is full, i.e. if every participant has put something in.
    pub fn full(&self) -> bool {
        self.count == self.data.len()
    }

    /// The number of participants who have put something in.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if this map contains data from a specific participant.
    pub fn contains(&self, participant: &PartyId) -> bool {
        self.get(participant).is_some()
    }

    /// Get the data for a participant, if they've put something in.
    pub fn get(&self, participant: &PartyId) -> Option<&T> {
        self.participants
            .index(participant)
            .and_then(|i| self.data[i].as_ref())
    }

    /// Check that a participant is known, and hasn't put anything in yet.
    pub fn check_vacant(&self, participant: &PartyId) -> Result<(), MessageError> {
        self.vacancy(participant).map(|_| ())
    }

    fn vacancy(&self, participant: &PartyId) -> Result<usize, MessageError> {
        let i = self
            .participants
            .index(participant)
            .ok_or_else(|| MessageError::UnknownSender(participant.clone()))?;
        if self.data[i].is_some() {
            return Err(MessageError::DuplicateSender(participant.clone()));
        }
        Ok(i)
    }

    /// Place the data for a participant in this map.
    ///
    /// This fails if the participant is unknown, or has already put something in.
    /// In both cases, the map is left untouched.
    pub fn put(&mut self, participant: &PartyId, data: T) -> Result<(), MessageError> {
        let i = self.vacancy(participant)?;
        self.data[i] = Some(data);
        self.count += 1;
        Ok(())
    }

    /// Iterate over the participants and their data, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&PartyId, &T)> {
        self.participants
            .iter()
            .zip(self.data.iter())
            .filter_map(|(p, x)| x.as_ref().map(|x| (p, x)))
    }

    /// Iterate over the data, in the order of the participants.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.iter().flatten()
    }
}

impl<T> Index<&PartyId> for ParticipantMap<T> {
    type Output = T;

    fn index(&self, index: &PartyId) -> &Self::Output {
        match self.get(index) {
            Some(x) => x,
            None => panic!("no data for participant {index}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PartyId> {
        names.iter().map(|x| PartyId::from(*x)).collect()
    }

    #[test]
    fn test_lists_are_sorted_and_unique() {
        let list = ParticipantList::new(&ids(&["carol", "alice", "bob"])).unwrap();
        assert_eq!(
            list.iter().cloned().collect::<Vec<_>>(),
            ids(&["alice", "bob", "carol"])
        );
        assert_eq!(list.index(&PartyId::from("carol")), Some(2));
        assert_eq!(list.index(&PartyId::from("dave")), None);

        let bob = PartyId::from("bob");
        assert_eq!(
            list.others(&bob).cloned().collect::<Vec<_>>(),
            ids(&["alice", "carol"])
        );
        assert!(!list.without(&bob).contains(&bob));

        assert!(ParticipantList::new(&ids(&["alice", "alice"])).is_none());
    }

    #[test]
    fn test_map_accepts_each_sender_once() {
        let list = ParticipantList::new(&ids(&["alice", "bob"])).unwrap();
        let alice = PartyId::from("alice");
        let mut map = ParticipantMap::new(&list);

        assert_eq!(map.put(&alice, 1), Ok(()));
        assert_eq!(
            map.put(&alice, 2),
            Err(MessageError::DuplicateSender(alice.clone()))
        );
        assert_eq!(map[&alice], 1);
        assert_eq!(map.len(), 1);
        assert!(!map.full());

        let mallory = PartyId::from("mallory");
        assert_eq!(
            map.put(&mallory, 3),
            Err(MessageError::UnknownSender(mallory.clone()))
        );
        assert!(!map.contains(&mallory));

        assert_eq!(map.put(&PartyId::from("bob"), 4), Ok(()));
        assert!(map.full());
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec![1, 4]);
    }
}
