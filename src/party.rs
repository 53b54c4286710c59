//! The public state of each party in a session.
//!
//! Every party is named by a [`PartyId`], and every session by a
//! [`SessionId`]. The public material of all parties lives in a [`Parties`]
//! arena, which the rounds of a protocol share without mutating.
use std::fmt;

use elliptic_curve::Group;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    compat::CSCurve,
    constants::{HASH_BYTES, SESSION_LABEL},
    hash::{Hash, HashItem},
    paillier::{self, PaillierError},
    participants::ParticipantList,
    pedersen::{self, PedersenError},
    protocol::InitializationError,
};

/// The identity of a party in the protocol.
///
/// Identities are opaque strings, compared and sorted byte by byte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartyId(String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PartyId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The identifier of a session, binding the parties and parameters of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; HASH_BYTES]);

impl SessionId {
    /// Derive a session identifier from a label and the parties taking part.
    ///
    /// The order of the parties doesn't matter.
    pub fn new<C: CSCurve>(label: &[u8], parties: &ParticipantList) -> Self {
        let mut hash = Hash::with_label(SESSION_LABEL);
        hash.write_typed::<C>(&[
            HashItem::Bytes(C::NAME),
            HashItem::Bytes(label),
            HashItem::Nested(parties),
        ]);
        Self(hash.digest())
    }

    /// Use a precomputed identifier, which must have exactly the right length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The reasons a [`Public`] record can be invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublicError {
    #[error("party identity is empty")]
    EmptyIdentity,
    #[error("session identifier has {0} bytes, expected {}", HASH_BYTES)]
    SessionIdLength(usize),
    #[error("ECDSA public share is missing")]
    MissingEcdsa,
    #[error("Paillier public key is missing")]
    MissingPaillier,
    #[error("Pedersen parameters are missing")]
    MissingPedersen,
    #[error("ECDSA public share is the identity")]
    IdentityShare,
    #[error("invalid Paillier public key: {0}")]
    Paillier(#[from] PaillierError),
    #[error("invalid Pedersen parameters: {0}")]
    Pedersen(#[from] PedersenError),
    #[error("Paillier and Pedersen moduli differ")]
    ModulusMismatch,
    #[error("party {id} belongs to another session")]
    SessionMismatch { id: PartyId },
    #[error("key material was already set")]
    AlreadyKeyed,
}

/// The public state of a single party.
///
/// Before key generation only the identity and session are set. Key generation
/// fills in the three remaining fields together, exactly once.
#[derive(Debug, Clone)]
pub struct Public<C: CSCurve> {
    pub id: PartyId,
    pub ssid: Vec<u8>,
    pub ecdsa: Option<C::ProjectivePoint>,
    pub paillier: Option<paillier::PublicKey>,
    pub pedersen: Option<pedersen::Parameters>,
}

impl<C: CSCurve> Public<C> {
    /// Create the record of a party which hasn't gone through key generation.
    pub fn new(id: PartyId, ssid: &SessionId) -> Self {
        Self {
            id,
            ssid: ssid.as_bytes().to_vec(),
            ecdsa: None,
            paillier: None,
            pedersen: None,
        }
    }

    /// Whether none of the key material is present yet.
    pub fn is_pre_keygen(&self) -> bool {
        self.ecdsa.is_none() && self.paillier.is_none() && self.pedersen.is_none()
    }

    /// Whether all of the key material is present.
    pub fn keygen_done(&self) -> bool {
        self.ecdsa.is_some() && self.paillier.is_some() && self.pedersen.is_some()
    }

    /// Check that this record is consistent.
    ///
    /// A record without any key material is valid, as long as it has an identity.
    pub fn validate(&self) -> Result<(), PublicError> {
        if self.id.is_empty() {
            return Err(PublicError::EmptyIdentity);
        }
        if self.is_pre_keygen() {
            return Ok(());
        }
        if self.ssid.len() != HASH_BYTES {
            return Err(PublicError::SessionIdLength(self.ssid.len()));
        }
        let ecdsa = self.ecdsa.as_ref().ok_or(PublicError::MissingEcdsa)?;
        let paillier = self.paillier.as_ref().ok_or(PublicError::MissingPaillier)?;
        let pedersen = self.pedersen.as_ref().ok_or(PublicError::MissingPedersen)?;

        if bool::from(ecdsa.is_identity()) {
            return Err(PublicError::IdentityShare);
        }
        paillier.validate()?;
        pedersen.validate()?;
        if paillier.n() != pedersen.n() {
            return Err(PublicError::ModulusMismatch);
        }
        Ok(())
    }

    pub(crate) fn ecdsa_share(&self) -> C::ProjectivePoint {
        self.ecdsa.unwrap_or_else(C::ProjectivePoint::identity)
    }
}

/// The public records of every party in a session.
///
/// This is created before key generation, filled in once by its output round,
/// and only ever read afterwards. Rounds share it through an [`Arc`](std::sync::Arc).
#[derive(Debug, Clone)]
pub struct Parties<C: CSCurve> {
    ssid: SessionId,
    list: ParticipantList,
    records: Vec<Public<C>>,
}

impl<C: CSCurve> Parties<C> {
    pub fn new(ssid: SessionId, ids: &[PartyId]) -> Result<Self, InitializationError> {
        if ids.iter().any(PartyId::is_empty) {
            return Err(InitializationError::BadParameters(
                "party identities must not be empty".to_string(),
            ));
        }
        let list = ParticipantList::new(ids).ok_or_else(|| {
            InitializationError::BadParameters("participant list cannot contain duplicates".to_string())
        })?;
        let records = list.iter().map(|id| Public::new(id.clone(), &ssid)).collect();
        Ok(Self {
            ssid,
            list,
            records,
        })
    }

    pub fn ssid(&self) -> &SessionId {
        &self.ssid
    }

    pub fn list(&self) -> &ParticipantList {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: &PartyId) -> Option<&Public<C>> {
        self.list.index(id).map(|i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Public<C>> {
        self.records.iter()
    }

    /// Fill in the key material of a party.
    ///
    /// This can only happen once per party.
    pub(crate) fn set_keygen_material(
        &mut self,
        id: &PartyId,
        ecdsa: C::ProjectivePoint,
        paillier: paillier::PublicKey,
        pedersen: pedersen::Parameters,
    ) -> Result<(), PublicError> {
        let i = self.list.index(id).ok_or_else(|| PublicError::SessionMismatch {
            id: id.clone(),
        })?;
        let record = &mut self.records[i];
        if !record.is_pre_keygen() {
            return Err(PublicError::AlreadyKeyed);
        }
        let keyed = Public {
            id: record.id.clone(),
            ssid: record.ssid.clone(),
            ecdsa: Some(ecdsa),
            paillier: Some(paillier),
            pedersen: Some(pedersen),
        };
        keyed.validate()?;
        *record = keyed;
        Ok(())
    }

    /// Validate every record, and check that they all share our session.
    pub fn validate(&self) -> Result<(), PublicError> {
        for record in &self.records {
            record.validate()?;
            if record.ssid != self.ssid.as_bytes() {
                return Err(PublicError::SessionMismatch {
                    id: record.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The shared ECDSA public key, the sum of every party's share.
    pub fn public_key(&self) -> C::ProjectivePoint {
        self.records.iter().map(Public::ecdsa_share).sum()
    }
}
