//! Presigning.
//!
//! This produces a nonce `R = k^{-1} * G`, shared between everybody, along with
//! additive shares of `k` and of `k * x`, without anybody learning `k`.
//!
//! Each party samples `k_i` and `γ_i`, and encrypts both under its own
//! Paillier key. The products `k_j * γ_i` and `k_j * x_i` are then turned into
//! additive shares: party `i` computes an encryption of `k_j * γ_i + β`
//! under the key of `j`, who decrypts it, while `i` keeps `-β`.
//! Finally, everybody reveals their share of `δ = k * γ`, which lets them
//! compute `R = δ^{-1} * Γ`, with `Γ = γ * G`.
use std::sync::Arc;

use elliptic_curve::{Field, Group};
use num_bigint::{BigInt, RandBigInt};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::{
    compat::CSCurve,
    constants::BITS_MTA_MASK,
    math::{biguint_from_scalar, scalar_from_biguint},
    paillier::{self, Ciphertext},
    participants::ParticipantMap,
    party::{Parties, PartyId},
    protocol::{
        envelope::Envelope,
        executor::Executor,
        round::{accumulate, put_own, Content, Outbox, Round, RoundNumber, Transition},
        InitializationError, MessageError, Protocol, ProtocolError,
    },
    serde::{
        deserialize_projective_point, deserialize_scalar, serialize_projective_point,
        serialize_scalar,
    },
    KeygenOutput,
};

/// The output of the presigning protocol.
///
/// This output is basically all the parts of the signature that we can perform
/// without knowing the message.
#[derive(Debug, Clone)]
pub struct PresignOutput<C: CSCurve> {
    /// The public nonce commitment.
    pub big_r: C::AffinePoint,
    /// Our share of the nonce value.
    pub k: C::Scalar,
    /// Our share of the product of the nonce and the secret key.
    pub chi: C::Scalar,
}

/// The arguments needed to create a presignature.
#[derive(Debug, Clone)]
pub struct PresignArguments<C: CSCurve> {
    /// The output of key generation, i.e. our share of the secret key,
    /// our Paillier key, and the public records of everybody.
    pub keygen_out: KeygenOutput<C>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncryptionContent {
    big_k: Ciphertext,
    big_g: Ciphertext,
}

impl Content for EncryptionContent {
    const ROUND: RoundNumber = 2;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: CSCurve")]
struct MtaContent<C: CSCurve> {
    #[serde(
        serialize_with = "serialize_projective_point::<C, _>",
        deserialize_with = "deserialize_projective_point::<C, _>"
    )]
    big_gamma: C::ProjectivePoint,
    d: Ciphertext,
    d_hat: Ciphertext,
}

impl<C: CSCurve> Content for MtaContent<C> {
    const ROUND: RoundNumber = 3;

    fn validate(&self) -> Result<(), MessageError> {
        if bool::from(self.big_gamma.is_identity()) {
            return Err(MessageError::ZeroValue("Gamma"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: CSCurve")]
struct DeltaContent<C: CSCurve> {
    #[serde(
        serialize_with = "serialize_scalar::<C, _>",
        deserialize_with = "deserialize_scalar::<C, _>"
    )]
    delta: C::Scalar,
    #[serde(
        serialize_with = "serialize_projective_point::<C, _>",
        deserialize_with = "deserialize_projective_point::<C, _>"
    )]
    big_delta: C::ProjectivePoint,
}

impl<C: CSCurve> Content for DeltaContent<C> {
    const ROUND: RoundNumber = 4;
}

struct Local<C: CSCurve> {
    me: PartyId,
    parties: Arc<Parties<C>>,
    x: C::Scalar,
    paillier: paillier::SecretKey,
}

impl<C: CSCurve> Local<C> {
    fn paillier_of(&self, id: &PartyId) -> Result<&paillier::PublicKey, ProtocolError> {
        self.parties
            .get(id)
            .and_then(|public| public.paillier.as_ref())
            .ok_or_else(|| ProtocolError::AssertionFailed(format!("no Paillier key for {id}")))
    }
}

/// Our secret nonces.
struct Nonces<C: CSCurve> {
    k: C::Scalar,
    gamma: C::Scalar,
}

enum PresignRound<C: CSCurve> {
    Start {
        local: Local<C>,
    },
    Encryptions {
        local: Local<C>,
        nonces: Nonces<C>,
        encryptions: ParticipantMap<EncryptionContent>,
    },
    Mta {
        local: Local<C>,
        nonces: Nonces<C>,
        beta: C::Scalar,
        beta_hat: C::Scalar,
        received: ParticipantMap<MtaContent<C>>,
    },
    Output {
        k: C::Scalar,
        chi: C::Scalar,
        big_gamma: C::ProjectivePoint,
        deltas: ParticipantMap<DeltaContent<C>>,
    },
}

impl<C: CSCurve> Round for PresignRound<C> {
    type Output = PresignOutput<C>;

    const ROUNDS: RoundNumber = 4;

    fn number(&self) -> RoundNumber {
        match self {
            PresignRound::Start { .. } => 1,
            PresignRound::Encryptions { .. } => EncryptionContent::ROUND,
            PresignRound::Mta { .. } => MtaContent::<C>::ROUND,
            PresignRound::Output { .. } => DeltaContent::<C>::ROUND,
        }
    }

    fn process_message(&mut self, envelope: &Envelope) -> Result<(), MessageError> {
        match self {
            PresignRound::Start { .. } => Err(MessageError::RoundMismatch {
                expected: 1,
                found: envelope.round,
            }),
            PresignRound::Encryptions { local, encryptions, .. } => {
                let pk = local
                    .parties
                    .get(&envelope.from)
                    .and_then(|public| public.paillier.as_ref())
                    .ok_or_else(|| MessageError::UnknownSender(envelope.from.clone()))?;
                encryptions.check_vacant(&envelope.from)?;
                let content: EncryptionContent = envelope.decode()?;
                for c in [&content.big_k, &content.big_g] {
                    pk.validate_ciphertext(c)
                        .map_err(|e| MessageError::Malformed(e.to_string()))?;
                }
                encryptions.put(&envelope.from, content)
            }
            PresignRound::Mta { local, received, .. } => {
                received.check_vacant(&envelope.from)?;
                let content: MtaContent<C> = envelope.decode()?;
                let pk = local.paillier.public();
                for c in [&content.d, &content.d_hat] {
                    pk.validate_ciphertext(c)
                        .map_err(|e| MessageError::Malformed(e.to_string()))?;
                }
                received.put(&envelope.from, content)
            }
            PresignRound::Output { deltas, .. } => {
                accumulate(deltas, envelope, |c: DeltaContent<C>| c)
            }
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            PresignRound::Start { .. } => true,
            PresignRound::Encryptions { encryptions, .. } => encryptions.full(),
            PresignRound::Mta { received, .. } => received.full(),
            PresignRound::Output { deltas, .. } => deltas.full(),
        }
    }

    #[instrument(skip_all, fields(round = self.number()))]
    fn finalize(self, outbox: &mut Outbox) -> Result<Transition<Self, <PresignRound<C> as Round>::Output>, ProtocolError> {
        let mut rng = OsRng;
        match self {
            PresignRound::Start { local } => {
                let nonces = Nonces {
                    k: C::Scalar::random(&mut rng),
                    gamma: C::Scalar::random(&mut rng),
                };
                let pk = local.paillier.public();
                let (big_k, _) = pk.encrypt(&mut rng, &biguint_from_scalar::<C>(&nonces.k).into());
                let (big_g, _) =
                    pk.encrypt(&mut rng, &biguint_from_scalar::<C>(&nonces.gamma).into());
                let mine = EncryptionContent { big_k, big_g };
                outbox.send_many(&mine);

                let mut encryptions = ParticipantMap::new(local.parties.list());
                put_own(&mut encryptions, &local.me, mine)?;
                Ok(Transition::Next(PresignRound::Encryptions {
                    local,
                    nonces,
                    encryptions,
                }))
            }
            PresignRound::Encryptions {
                local,
                nonces,
                encryptions,
            } => {
                let big_gamma = C::ProjectivePoint::generator() * nonces.gamma;
                let gamma = biguint_from_scalar::<C>(&nonces.gamma);
                let x = biguint_from_scalar::<C>(&local.x);

                let mut beta = C::Scalar::ZERO;
                let mut beta_hat = C::Scalar::ZERO;
                for (to, content) in encryptions.iter() {
                    if to == &local.me {
                        continue;
                    }
                    let pk = local.paillier_of(to)?;
                    // Enc_j(k_j * w + mask), and we keep -mask.
                    let mut mta = |w| {
                        let mask = rng.gen_biguint(BITS_MTA_MASK);
                        let (enc_mask, _) = pk.encrypt(&mut rng, &BigInt::from(mask.clone()));
                        let c = pk.add(&pk.mul(&content.big_k, w), &enc_mask);
                        (c, -scalar_from_biguint::<C>(&mask))
                    };
                    let (d, b) = mta(&gamma);
                    let (d_hat, b_hat) = mta(&x);
                    beta += b;
                    beta_hat += b_hat;
                    outbox.send_private(
                        to,
                        &MtaContent::<C> {
                            big_gamma,
                            d,
                            d_hat,
                        },
                    );
                }

                let received = ParticipantMap::new(&local.parties.list().without(&local.me));
                Ok(Transition::Next(PresignRound::Mta {
                    local,
                    nonces,
                    beta,
                    beta_hat,
                    received,
                }))
            }
            PresignRound::Mta {
                local,
                nonces,
                beta,
                beta_hat,
                received,
            } => {
                let mut delta = nonces.k * nonces.gamma + beta;
                let mut chi = nonces.k * local.x + beta_hat;
                let mut big_gamma = C::ProjectivePoint::generator() * nonces.gamma;
                for (from, content) in received.iter() {
                    let decrypt = |c| {
                        local.paillier.decrypt(c).map_err(|e| {
                            error!(%from, error = %e, "failed to decrypt");
                            ProtocolError::Decryption { from: from.clone() }
                        })
                    };
                    delta += scalar_from_biguint::<C>(&decrypt(&content.d)?);
                    chi += scalar_from_biguint::<C>(&decrypt(&content.d_hat)?);
                    big_gamma += content.big_gamma;
                }

                let mine = DeltaContent::<C> {
                    delta,
                    big_delta: big_gamma * nonces.k,
                };
                outbox.send_many(&mine);

                let mut deltas = ParticipantMap::new(local.parties.list());
                put_own(&mut deltas, &local.me, mine)?;
                Ok(Transition::Next(PresignRound::Output {
                    k: nonces.k,
                    chi,
                    big_gamma,
                    deltas,
                }))
            }
            PresignRound::Output {
                k,
                chi,
                big_gamma,
                deltas,
            } => {
                let mut delta = C::Scalar::ZERO;
                let mut big_delta = C::ProjectivePoint::identity();
                for content in deltas.values() {
                    delta += content.delta;
                    big_delta += content.big_delta;
                }
                if C::ProjectivePoint::generator() * delta != big_delta {
                    error!("delta shares are inconsistent");
                    return Err(ProtocolError::InconsistentPresignature);
                }
                let delta_inv = Option::<C::Scalar>::from(delta.invert()).ok_or_else(|| {
                    error!("delta is zero");
                    ProtocolError::InconsistentPresignature
                })?;
                let big_r = (big_gamma * delta_inv).into();
                Ok(Transition::Done(PresignOutput { big_r, k, chi }))
            }
        }
    }
}

/// The presignature protocol.
///
/// This is the first phase of performing a signature, in which we perform
/// all the work we can do without yet knowing the message to be signed.
///
/// Every party taking part in key generation needs to take part here.
pub fn presign<C: CSCurve>(
    args: PresignArguments<C>,
) -> Result<impl Protocol<Output = PresignOutput<C>>, InitializationError> {
    Ok(Executor::new(start(args)?))
}

fn start<C: CSCurve>(args: PresignArguments<C>) -> Result<PresignRound<C>, InitializationError> {
    let KeygenOutput {
        me,
        parties,
        private_share,
        paillier,
        ..
    } = args.keygen_out;
    if parties.len() < 2 {
        return Err(InitializationError::BadParameters(format!(
            "participant count cannot be < 2, found: {}",
            parties.len()
        )));
    }
    if !parties.list().contains(&me) {
        return Err(InitializationError::BadParameters(
            "participant list must contain this participant".to_string(),
        ));
    }
    parties
        .validate()
        .map_err(|e| InitializationError::BadParameters(e.to_string()))?;
    if !parties.iter().all(|public| public.keygen_done()) {
        return Err(InitializationError::BadParameters(
            "every participant must have finished key generation".to_string(),
        ));
    }
    if parties.get(&me).and_then(|public| public.paillier.as_ref()) != Some(paillier.public()) {
        return Err(InitializationError::BadParameters(
            "Paillier key does not match our public record".to_string(),
        ));
    }

    Ok(PresignRound::Start {
        local: Local {
            me,
            parties,
            x: private_share,
            paillier,
        },
    })
}
