//! Key generation.
//!
//! Every party samples a share `x_i` of the secret key, and publishes
//! `X_i = x_i * G`, along with its Paillier key and Pedersen parameters.
//! These values are first committed to, and then revealed, so that nobody can
//! choose theirs based on the values of others. Each party then proves
//! knowledge of its share, bound to the session, to a random value that
//! everybody contributed to, and to its own identity.
//!
//! At the end, the public records of every party are filled in, and the
//! shared public key is the sum of all the `X_i`.
use std::sync::Arc;

use elliptic_curve::{Field, Group};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::{
    compat::CSCurve,
    constants::HASH_BYTES,
    hash::{Commitment, Decommitment, Hash, HashItem},
    paillier,
    participants::ParticipantMap,
    party::{Parties, PartyId, PublicError, SessionId},
    pedersen,
    proofs::dlog,
    protocol::{
        envelope::Envelope,
        executor::Executor,
        round::{accumulate, put_own, Content, Outbox, Round, RoundNumber, Transition},
        InitializationError, MessageError, Protocol, ProtocolError,
    },
    serde::{deserialize_projective_point, serialize_projective_point},
};

const LABEL: &[u8] = b"cmp-ecdsa keygen";

/// The arguments needed to run key generation.
#[derive(Debug, Clone)]
pub struct KeygenArguments {
    /// Everybody taking part, ourselves included.
    pub participants: Vec<PartyId>,
    /// Who we are.
    pub me: PartyId,
    /// The session this key generation is part of.
    pub ssid: SessionId,
    /// Our Paillier key, generated ahead of time, since this is slow.
    pub paillier: paillier::SecretKey,
}

/// Represents the output of the key generation protocol.
///
/// This contains our share of the private key, and the public records of
/// everybody, with the shared public key they make up.
#[derive(Debug, Clone)]
pub struct KeygenOutput<C: CSCurve> {
    pub me: PartyId,
    pub parties: Arc<Parties<C>>,
    pub private_share: C::Scalar,
    pub paillier: paillier::SecretKey,
    pub public_key: C::AffinePoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitmentContent {
    commitment: Commitment,
}

impl Content for CommitmentContent {
    const ROUND: RoundNumber = 2;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: CSCurve")]
struct DecommitmentContent<C: CSCurve> {
    #[serde(
        serialize_with = "serialize_projective_point::<C, _>",
        deserialize_with = "deserialize_projective_point::<C, _>"
    )]
    big_x: C::ProjectivePoint,
    rid: [u8; HASH_BYTES],
    paillier: paillier::PublicKey,
    pedersen: pedersen::Parameters,
    decommitment: Decommitment,
}

/// The transcript state a party commits to.
fn committed<C: CSCurve>(
    transcript: &Hash,
    from: &PartyId,
    big_x: &C::ProjectivePoint,
    rid: &[u8],
    paillier: &paillier::PublicKey,
    pedersen: &pedersen::Parameters,
) -> Hash {
    let mut hash = transcript.clone_with_id(from);
    hash.write_typed::<C>(&[
        HashItem::Bytes(b"keygen commitment"),
        HashItem::Points(&[*big_x]),
        HashItem::Bytes(rid),
        HashItem::Nested(paillier),
        HashItem::Nested(pedersen),
    ]);
    hash
}

impl<C: CSCurve> DecommitmentContent<C> {
    fn opens(&self, transcript: &Hash, from: &PartyId, commitment: &Commitment) -> bool {
        committed::<C>(
            transcript,
            from,
            &self.big_x,
            &self.rid,
            &self.paillier,
            &self.pedersen,
        )
        .decommit(commitment, &self.decommitment)
    }
}

impl<C: CSCurve> Content for DecommitmentContent<C> {
    const ROUND: RoundNumber = 3;

    fn validate(&self) -> Result<(), MessageError> {
        if bool::from(self.big_x.is_identity()) {
            return Err(PublicError::IdentityShare.into());
        }
        self.paillier.validate().map_err(PublicError::from)?;
        self.pedersen.validate().map_err(PublicError::from)?;
        if self.paillier.n() != self.pedersen.n() {
            return Err(PublicError::ModulusMismatch.into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: CSCurve")]
struct ProofContent<C: CSCurve> {
    proof: dlog::Proof<C>,
}

impl<C: CSCurve> Content for ProofContent<C> {
    const ROUND: RoundNumber = 4;
}

/// What we know throughout the protocol.
struct Local<C: CSCurve> {
    me: PartyId,
    parties: Parties<C>,
    transcript: Hash,
    paillier: paillier::SecretKey,
}

enum KeygenRound<C: CSCurve> {
    Start {
        local: Local<C>,
    },
    Commitments {
        local: Local<C>,
        x: C::Scalar,
        mine: DecommitmentContent<C>,
        commitments: ParticipantMap<Commitment>,
    },
    Decommitments {
        local: Local<C>,
        x: C::Scalar,
        commitments: ParticipantMap<Commitment>,
        revealed: ParticipantMap<DecommitmentContent<C>>,
    },
    Proofs {
        local: Local<C>,
        x: C::Scalar,
        rid_transcript: Hash,
        revealed: ParticipantMap<DecommitmentContent<C>>,
        proofs: ParticipantMap<dlog::Proof<C>>,
    },
}

impl<C: CSCurve> Round for KeygenRound<C> {
    type Output = KeygenOutput<C>;

    const ROUNDS: RoundNumber = 4;

    fn number(&self) -> RoundNumber {
        match self {
            KeygenRound::Start { .. } => 1,
            KeygenRound::Commitments { .. } => CommitmentContent::ROUND,
            KeygenRound::Decommitments { .. } => DecommitmentContent::<C>::ROUND,
            KeygenRound::Proofs { .. } => ProofContent::<C>::ROUND,
        }
    }

    fn process_message(&mut self, envelope: &Envelope) -> Result<(), MessageError> {
        match self {
            KeygenRound::Start { .. } => Err(MessageError::RoundMismatch {
                expected: 1,
                found: envelope.round,
            }),
            KeygenRound::Commitments { commitments, .. } => {
                accumulate(commitments, envelope, |c: CommitmentContent| c.commitment)
            }
            KeygenRound::Decommitments { revealed, .. } => {
                accumulate(revealed, envelope, |c: DecommitmentContent<C>| c)
            }
            KeygenRound::Proofs { proofs, .. } => {
                accumulate(proofs, envelope, |c: ProofContent<C>| c.proof)
            }
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            KeygenRound::Start { .. } => true,
            KeygenRound::Commitments { commitments, .. } => commitments.full(),
            KeygenRound::Decommitments { revealed, .. } => revealed.full(),
            KeygenRound::Proofs { proofs, .. } => proofs.full(),
        }
    }

    #[instrument(skip_all, fields(round = self.number()))]
    fn finalize(self, outbox: &mut Outbox) -> Result<Transition<Self, Self::Output>, ProtocolError> {
        let mut rng = OsRng;
        match self {
            KeygenRound::Start { local } => {
                let x = C::Scalar::random(&mut rng);
                let big_x = C::ProjectivePoint::generator() * x;
                let mut rid = [0u8; HASH_BYTES];
                rng.fill_bytes(&mut rid);
                let paillier = local.paillier.public().clone();
                let pedersen = pedersen::Parameters::generate(&mut rng, &local.paillier);

                let (commitment, decommitment) = committed::<C>(
                    &local.transcript,
                    &local.me,
                    &big_x,
                    &rid,
                    &paillier,
                    &pedersen,
                )
                .commit(&mut rng);
                outbox.send_many(&CommitmentContent { commitment });

                let mut commitments = ParticipantMap::new(local.parties.list());
                put_own(&mut commitments, &local.me, commitment)?;

                Ok(Transition::Next(KeygenRound::Commitments {
                    local,
                    x,
                    mine: DecommitmentContent {
                        big_x,
                        rid,
                        paillier,
                        pedersen,
                        decommitment,
                    },
                    commitments,
                }))
            }
            KeygenRound::Commitments {
                local,
                x,
                mine,
                commitments,
            } => {
                outbox.send_many(&mine);
                let mut revealed = ParticipantMap::new(local.parties.list());
                put_own(&mut revealed, &local.me, mine)?;
                Ok(Transition::Next(KeygenRound::Decommitments {
                    local,
                    x,
                    commitments,
                    revealed,
                }))
            }
            KeygenRound::Decommitments {
                local,
                x,
                commitments,
                revealed,
            } => {
                let mut rid = [0u8; HASH_BYTES];
                for (from, content) in revealed.iter() {
                    if !content.opens(&local.transcript, from, &commitments[from]) {
                        error!(%from, "commitment does not open");
                        return Err(ProtocolError::CommitmentMismatch { from: from.clone() });
                    }
                    for (a, b) in rid.iter_mut().zip(content.rid) {
                        *a ^= b;
                    }
                }

                let mut rid_transcript = local.transcript.clone();
                rid_transcript.write_typed::<C>(&[
                    HashItem::Bytes(b"keygen rid"),
                    HashItem::Bytes(&rid),
                ]);

                let big_x = revealed[&local.me].big_x;
                let proof = dlog::prove(
                    &mut rng,
                    &mut rid_transcript.clone_with_id(&local.me),
                    dlog::Statement::<C> { public: &big_x },
                    dlog::Witness::<C> { x: &x },
                );
                outbox.send_many(&ProofContent { proof });

                let proofs = ParticipantMap::new(&local.parties.list().without(&local.me));
                Ok(Transition::Next(KeygenRound::Proofs {
                    local,
                    x,
                    rid_transcript,
                    revealed,
                    proofs,
                }))
            }
            KeygenRound::Proofs {
                mut local,
                x,
                rid_transcript,
                revealed,
                proofs,
            } => {
                for (from, proof) in proofs.iter() {
                    let statement = dlog::Statement::<C> {
                        public: &revealed[from].big_x,
                    };
                    if !dlog::verify(&mut rid_transcript.clone_with_id(from), statement, proof) {
                        error!(%from, "dlog proof failed to verify");
                        return Err(ProtocolError::ProofFailed { from: from.clone() });
                    }
                }

                for (from, content) in revealed.iter() {
                    local.parties.set_keygen_material(
                        from,
                        content.big_x,
                        content.paillier.clone(),
                        content.pedersen.clone(),
                    )?;
                }
                local.parties.validate()?;

                let public_key = local.parties.public_key().into();
                Ok(Transition::Done(KeygenOutput {
                    me: local.me,
                    parties: Arc::new(local.parties),
                    private_share: x,
                    paillier: local.paillier,
                    public_key,
                }))
            }
        }
    }
}

/// The key generation protocol.
///
/// This produces a fresh key shared between all the participants, along with
/// the public records needed to presign with it.
pub fn keygen<C: CSCurve>(
    args: KeygenArguments,
) -> Result<impl Protocol<Output = KeygenOutput<C>>, InitializationError> {
    Ok(Executor::new(start(args)?))
}

fn start<C: CSCurve>(args: KeygenArguments) -> Result<KeygenRound<C>, InitializationError> {
    if args.participants.len() < 2 {
        return Err(InitializationError::BadParameters(format!(
            "participant count cannot be < 2, found: {}",
            args.participants.len()
        )));
    };

    let parties = Parties::<C>::new(args.ssid, &args.participants)?;
    if !parties.list().contains(&args.me) {
        return Err(InitializationError::BadParameters(
            "participant list must contain this participant".to_string(),
        ));
    }
    args.paillier
        .public()
        .validate()
        .map_err(|e| InitializationError::BadParameters(e.to_string()))?;

    let mut transcript = Hash::new();
    transcript.write_typed::<C>(&[
        HashItem::Bytes(LABEL),
        HashItem::Bytes(C::NAME),
        HashItem::Bytes(args.ssid.as_bytes()),
        HashItem::Nested(parties.list()),
    ]);

    Ok(KeygenRound::Start {
        local: Local {
            me: args.me,
            parties,
            transcript,
            paillier: args.paillier,
        },
    })
}
