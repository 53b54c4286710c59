use std::sync::Arc;

use elliptic_curve::{ops::Invert, scalar::IsHigh, Field, Group};
use serde::{Deserialize, Serialize};
use subtle::ConditionallySelectable;
use tracing::{error, instrument};

use crate::{
    compat::{self, CSCurve},
    participants::ParticipantMap,
    party::{Parties, PartyId},
    protocol::{
        envelope::Envelope,
        executor::Executor,
        round::{accumulate, put_own, Content, Outbox, Round, RoundNumber, Transition},
        InitializationError, MessageError, Protocol, ProtocolError,
    },
    serde::{deserialize_scalar, serialize_scalar},
    PresignOutput,
};

/// Represents a signature with extra information, to support different variants of ECDSA.
///
/// An ECDSA signature is usually two scalars. The first scalar is derived from
/// a point on the curve, and because this process is lossy, some other variants
/// of ECDSA also include some extra information in order to recover this point.
///
/// Furthermore, some signature formats may disagree on how precisely to serialize
/// different values as bytes.
///
/// To support these variants, this simply gives you a normal signature, along with the entire
/// first point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullSignature<C: CSCurve> {
    /// This is the entire first point.
    pub big_r: C::AffinePoint,
    /// This is the second scalar, normalized to be in the lower range.
    pub s: C::Scalar,
}

impl<C: CSCurve> FullSignature<C> {
    /// The first scalar of the signature, derived from the first point.
    pub fn r(&self) -> C::Scalar {
        compat::x_coordinate::<C>(&self.big_r)
    }

    /// Check this signature against a public key and a message hash.
    #[must_use]
    pub fn verify(&self, public_key: &C::AffinePoint, msg_hash: &C::Scalar) -> bool {
        let r: C::Scalar = self.r();
        if r.is_zero().into() || self.s.is_zero().into() {
            return false;
        }
        let Some(s_inv) = Option::<C::Scalar>::from(self.s.invert_vartime()) else {
            return false;
        };
        let reproduced = (C::ProjectivePoint::generator() * (*msg_hash * s_inv))
            + (C::ProjectivePoint::from(*public_key) * (r * s_inv));
        compat::x_coordinate::<C>(&reproduced.into()) == r
    }
}

/// A share of the second scalar of a signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "C: CSCurve")]
pub(crate) struct SignShareContent<C: CSCurve> {
    #[serde(
        serialize_with = "serialize_scalar::<C, _>",
        deserialize_with = "deserialize_scalar::<C, _>"
    )]
    pub(crate) share: C::Scalar,
}

impl<C: CSCurve> Content for SignShareContent<C> {
    const ROUND: RoundNumber = 2;

    fn validate(&self) -> Result<(), MessageError> {
        if bool::from(self.share.is_zero()) {
            return Err(MessageError::ZeroValue("signature share"));
        }
        Ok(())
    }
}

/// The last round of signing.
///
/// This collects one share of the signature from every party, sums them up,
/// and checks the result, before releasing it.
pub(crate) struct SignOutputRound<C: CSCurve> {
    parties: Arc<Parties<C>>,
    big_r: C::AffinePoint,
    msg_hash: C::Scalar,
    shares: ParticipantMap<C::Scalar>,
}

impl<C: CSCurve> SignOutputRound<C> {
    pub(crate) fn new(
        parties: Arc<Parties<C>>,
        me: &PartyId,
        big_r: C::AffinePoint,
        msg_hash: C::Scalar,
        own_share: C::Scalar,
    ) -> Result<Self, ProtocolError> {
        let mut shares = ParticipantMap::new(parties.list());
        put_own(&mut shares, me, own_share)?;
        Ok(Self {
            parties,
            big_r,
            msg_hash,
            shares,
        })
    }

    fn process_message(&mut self, envelope: &Envelope) -> Result<(), MessageError> {
        accumulate(&mut self.shares, envelope, |c: SignShareContent<C>| c.share)
    }

    fn is_complete(&self) -> bool {
        self.shares.full()
    }

    fn finalize(self) -> Result<FullSignature<C>, ProtocolError> {
        let mut s: C::Scalar = self.shares.values().copied().sum();
        // Normalize s into the lower half.
        s.conditional_assign(&(-s), s.is_high());
        let sig = FullSignature {
            big_r: self.big_r,
            s,
        };

        let public_key: C::AffinePoint = self.parties.public_key().into();
        if !C::verify_prehashed(&public_key, &self.msg_hash, &sig.r(), &sig.s) {
            error!("signature failed ECDSA verification");
            return Err(ProtocolError::SignatureInvalidEcdsa);
        }
        if !sig.verify(&public_key, &self.msg_hash) {
            error!("signature failed to verify");
            return Err(ProtocolError::SignatureInvalid);
        }
        Ok(sig)
    }
}

enum SignRound<C: CSCurve> {
    Start {
        me: PartyId,
        parties: Arc<Parties<C>>,
        presignature: PresignOutput<C>,
        msg_hash: C::Scalar,
    },
    Output(SignOutputRound<C>),
}

impl<C: CSCurve> Round for SignRound<C> {
    type Output = FullSignature<C>;

    const ROUNDS: RoundNumber = 2;

    fn number(&self) -> RoundNumber {
        match self {
            SignRound::Start { .. } => 1,
            SignRound::Output(_) => SignShareContent::<C>::ROUND,
        }
    }

    fn process_message(&mut self, envelope: &Envelope) -> Result<(), MessageError> {
        match self {
            SignRound::Start { .. } => Err(MessageError::RoundMismatch {
                expected: 1,
                found: envelope.round,
            }),
            SignRound::Output(round) => round.process_message(envelope),
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            SignRound::Start { .. } => true,
            SignRound::Output(round) => round.is_complete(),
        }
    }

    #[instrument(skip_all, fields(round = self.number()))]
    fn finalize(self, outbox: &mut Outbox) -> Result<Transition<Self, <SignRound<C> as Round>::Output>, ProtocolError> {
        match self {
            SignRound::Start {
                me,
                parties,
                presignature,
                msg_hash,
            } => {
                let r = compat::x_coordinate::<C>(&presignature.big_r);
                let share = msg_hash * presignature.k + r * presignature.chi;
                outbox.send_many(&SignShareContent::<C> { share });
                let round =
                    SignOutputRound::new(parties, &me, presignature.big_r, msg_hash, share)?;
                Ok(Transition::Next(SignRound::Output(round)))
            }
            SignRound::Output(round) => Ok(Transition::Done(round.finalize()?)),
        }
    }
}

/// The signature protocol, allowing us to use a presignature to sign a message.
///
/// **WARNING** You must absolutely hash an actual message before passing it to
/// this function. Allowing the signing of arbitrary scalars *is* a security risk,
/// and this function only tolerates this risk to allow for genericity.
pub fn sign<C: CSCurve>(
    parties: Arc<Parties<C>>,
    me: PartyId,
    presignature: PresignOutput<C>,
    msg_hash: C::Scalar,
) -> Result<impl Protocol<Output = FullSignature<C>>, InitializationError> {
    if parties.len() < 2 {
        return Err(InitializationError::BadParameters(format!(
            "participant count cannot be < 2, found: {}",
            parties.len()
        )));
    };
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
    if bool::from(C::ProjectivePoint::from(presignature.big_r).is_identity()) {
        return Err(InitializationError::BadParameters(
            "presignature nonce cannot be the identity".to_string(),
        ));
    }

    Ok(Executor::new(SignRound::Start {
        me,
        parties,
        presignature,
        msg_hash,
    }))
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use easy_parallel::Parallel;
    use ecdsa::Signature;
    use k256::{
        ecdsa::signature::Verifier, ecdsa::VerifyingKey, ProjectivePoint, PublicKey, Scalar,
        Secp256k1,
    };
    use rand_core::OsRng;

    use super::*;
    use crate::{
        party::SessionId,
        protocol::run_protocol,
        test::{keyed_parties, test_ids},
    };

    /// Split a key and a nonce between some parties, as presigning would.
    fn presignatures(
        ids: &[PartyId],
        ssid: SessionId,
    ) -> (Arc<Parties<Secp256k1>>, Vec<PresignOutput<Secp256k1>>) {
        let x: Vec<Scalar> = ids.iter().map(|_| Scalar::random(&mut OsRng)).collect();
        let k: Vec<Scalar> = ids.iter().map(|_| Scalar::random(&mut OsRng)).collect();
        let x_sum: Scalar = x.iter().sum();
        let k_sum: Scalar = k.iter().sum();
        let big_r = (ProjectivePoint::GENERATOR * k_sum.invert().unwrap()).to_affine();

        // Split k * x randomly.
        let mut chi: Vec<Scalar> = ids.iter().map(|_| Scalar::random(&mut OsRng)).collect();
        let rest: Scalar = chi[1..].iter().sum();
        chi[0] = k_sum * x_sum - rest;

        let parties = keyed_parties::<Secp256k1>(ids, ssid, &x);
        let outputs = (0..ids.len())
            .map(|i| PresignOutput {
                big_r,
                k: k[i],
                chi: chi[i],
            })
            .collect();
        (parties, outputs)
    }

    fn run_sign(
        parties: &Arc<Parties<Secp256k1>>,
        presignatures: Vec<PresignOutput<Secp256k1>>,
        msg: &[u8],
    ) -> Result<Vec<(PartyId, FullSignature<Secp256k1>)>, Box<dyn Error>> {
        #[allow(clippy::type_complexity)]
        let mut protocols: Vec<(PartyId, Box<dyn Protocol<Output = FullSignature<Secp256k1>>>)> =
            Vec::with_capacity(parties.len());
        for (p, presignature) in parties.list().iter().zip(presignatures) {
            let protocol = sign(
                parties.clone(),
                p.clone(),
                presignature,
                Secp256k1::scalar_hash(msg),
            )?;
            protocols.push((p.clone(), Box::new(protocol)));
        }
        Ok(run_protocol(protocols)?)
    }

    #[test]
    fn test_sign() -> Result<(), Box<dyn Error>> {
        let msg = b"hello?";
        let ids = test_ids(3);

        // Run 4 times for flakiness reasons
        for _ in 0..4 {
            let (parties, presignatures) = presignatures(&ids, crate::test::test_ssid());
            let result = run_sign(&parties, presignatures, msg)?;

            let public_key = parties.public_key().to_affine();
            let sig = result[0].1.clone();
            assert!(result.iter().all(|(_, other)| *other == sig));
            let sig = Signature::<Secp256k1>::from_scalars(sig.r(), sig.s)?;
            VerifyingKey::from(&PublicKey::from_affine(public_key).unwrap())
                .verify(&msg[..], &sig)?;
        }
        Ok(())
    }

    fn output_round(
        parties: &Arc<Parties<Secp256k1>>,
        presignatures: &[PresignOutput<Secp256k1>],
        msg_hash: Scalar,
    ) -> (SignOutputRound<Secp256k1>, Vec<(PartyId, Scalar)>) {
        let ids: Vec<PartyId> = parties.list().iter().cloned().collect();
        let shares: Vec<(PartyId, Scalar)> = ids
            .iter()
            .zip(presignatures)
            .map(|(p, presignature)| {
                let r = compat::x_coordinate::<Secp256k1>(&presignature.big_r);
                (p.clone(), msg_hash * presignature.k + r * presignature.chi)
            })
            .collect();
        let round = SignOutputRound::new(
            parties.clone(),
            &ids[0],
            presignatures[0].big_r,
            msg_hash,
            shares[0].1,
        )
        .unwrap();
        (round, shares)
    }

    fn envelope(from: &PartyId, share: Scalar) -> Envelope {
        let data = Envelope::seal(&SignShareContent::<Secp256k1> { share });
        Envelope::parse(from.clone(), &data).unwrap()
    }

    #[test]
    fn test_output_round_assembles_signature() {
        let ids = test_ids(3);
        let (parties, presignatures) = presignatures(&ids, crate::test::test_ssid());
        let msg_hash = Secp256k1::scalar_hash(b"message");

        let (mut round, shares) = output_round(&parties, &presignatures, msg_hash);
        for (from, share) in &shares[1..] {
            assert!(!round.is_complete());
            round.process_message(&envelope(from, *share)).unwrap();
        }
        assert!(round.is_complete());

        let mut outbox = Outbox::new();
        let transition = SignRound::Output(round).finalize(&mut outbox).unwrap();
        assert!(outbox.is_empty());
        let sig = transition.result().unwrap();
        assert_eq!(sig.big_r, presignatures[0].big_r);
        assert!(sig.verify(&parties.public_key().to_affine(), &msg_hash));
    }

    #[test_log::test]
    fn test_perturbed_share_fails() {
        let ids = test_ids(3);
        let (parties, presignatures) = presignatures(&ids, crate::test::test_ssid());
        let msg_hash = Secp256k1::scalar_hash(b"message");

        let (mut round, shares) = output_round(&parties, &presignatures, msg_hash);
        round
            .process_message(&envelope(&shares[1].0, shares[1].1))
            .unwrap();
        round
            .process_message(&envelope(&shares[2].0, shares[2].1 + Scalar::ONE))
            .unwrap();

        let result = SignRound::Output(round).finalize(&mut Outbox::new());
        assert!(matches!(
            result,
            Err(ProtocolError::SignatureInvalidEcdsa)
        ));
    }

    #[test_log::test]
    fn test_shares_are_checked_on_arrival() {
        let ids = test_ids(3);
        let (parties, presignatures) = presignatures(&ids, crate::test::test_ssid());
        let msg_hash = Secp256k1::scalar_hash(b"message");
        let (mut round, shares) = output_round(&parties, &presignatures, msg_hash);
        let (bob, bob_share) = shares[1].clone();

        assert_eq!(
            round.process_message(&envelope(&bob, Scalar::ZERO)),
            Err(MessageError::ZeroValue("signature share"))
        );
        assert!(!round.shares.contains(&bob));

        assert_eq!(round.process_message(&envelope(&bob, bob_share)), Ok(()));
        assert_eq!(
            round.process_message(&envelope(&bob, bob_share + Scalar::ONE)),
            Err(MessageError::DuplicateSender(bob.clone()))
        );
        assert_eq!(round.shares[&bob], bob_share);

        let mallory = PartyId::from("mallory");
        assert_eq!(
            round.process_message(&envelope(&mallory, bob_share)),
            Err(MessageError::UnknownSender(mallory))
        );

        let carol = shares[2].0.clone();
        let wrong_round = Envelope::parse(carol, &[1, 0]).unwrap();
        assert!(matches!(
            round.process_message(&wrong_round),
            Err(MessageError::RoundMismatch { .. })
        ));
        assert_eq!(round.shares.len(), 2);
    }

    #[test]
    fn test_bad_arguments() {
        let ids = test_ids(3);
        let (parties, presignatures) = presignatures(&ids, crate::test::test_ssid());
        let msg_hash = Secp256k1::scalar_hash(b"message");
        let args = |parties: Arc<Parties<Secp256k1>>, me: &PartyId| {
            sign(parties, me.clone(), presignatures[0].clone(), msg_hash)
        };

        assert!(args(parties.clone(), &ids[0]).is_ok());
        assert!(args(parties.clone(), &PartyId::from("mallory")).is_err());

        let unkeyed = Arc::new(Parties::<Secp256k1>::new(*parties.ssid(), &ids).unwrap());
        assert!(unkeyed.validate().is_ok());
        assert!(args(unkeyed, &ids[0]).is_err());
    }

    #[test]
    fn test_sessions_are_isolated() -> Result<(), Box<dyn Error>> {
        let ids = test_ids(3);
        let ssid_a = SessionId::from_bytes(&[1u8; 32]).unwrap();
        let ssid_b = SessionId::from_bytes(&[2u8; 32]).unwrap();
        let (parties_a, presignatures_a) = presignatures(&ids, ssid_a);
        let (parties_b, presignatures_b) = presignatures(&ids, ssid_b);

        let results = Parallel::new()
            .add(|| run_sign(&parties_a, presignatures_a, b"message a").map_err(|e| e.to_string()))
            .add(|| run_sign(&parties_b, presignatures_b, b"message b").map_err(|e| e.to_string()))
            .run();

        let sig_a = results[0].clone()?[0].1.clone();
        let sig_b = results[1].clone()?[0].1.clone();
        assert!(sig_a.verify(
            &parties_a.public_key().to_affine(),
            &Secp256k1::scalar_hash(b"message a")
        ));
        assert!(sig_b.verify(
            &parties_b.public_key().to_affine(),
            &Secp256k1::scalar_hash(b"message b")
        ));
        assert!(!sig_a.verify(
            &parties_b.public_key().to_affine(),
            &Secp256k1::scalar_hash(b"message a")
        ));
        Ok(())
    }
}
