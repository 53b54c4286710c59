use elliptic_curve::{Field, Group};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};

use crate::{
    compat::CSCurve,
    hash::{Hash, HashItem},
    serde::{deserialize_scalar, serialize_scalar},
};

/// The label we use for hashing the statement.
const STATEMENT_LABEL: &[u8] = b"dlog proof statement";
/// The label we use for hashing the first prover message.
const COMMITMENT_LABEL: &[u8] = b"dlog proof commitment";

/// The public statement for this proof.
///
/// This statement claims knowledge of the discrete logarithm of some point.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a, C: CSCurve> {
    pub public: &'a C::ProjectivePoint,
}

impl<'a, C: CSCurve> Statement<'a, C> {
    /// Calculate the homomorphism we want to prove things about.
    fn phi(&self, x: &C::Scalar) -> C::ProjectivePoint {
        C::ProjectivePoint::generator() * x
    }
}

/// The private witness for this proof.
///
/// This holds the scalar the prover needs to know.
#[derive(Clone, Copy)]
pub struct Witness<'a, C: CSCurve> {
    pub x: &'a C::Scalar,
}

/// Represents a proof of the statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof<C: CSCurve> {
    #[serde(
        serialize_with = "serialize_scalar::<C, _>",
        deserialize_with = "deserialize_scalar::<C, _>"
    )]
    e: C::Scalar,
    #[serde(
        serialize_with = "serialize_scalar::<C, _>",
        deserialize_with = "deserialize_scalar::<C, _>"
    )]
    s: C::Scalar,
}

fn challenge<C: CSCurve>(
    transcript: &mut Hash,
    statement: Statement<'_, C>,
    big_k: &C::ProjectivePoint,
) -> C::Scalar {
    transcript.write_typed::<C>(&[
        HashItem::Bytes(STATEMENT_LABEL),
        HashItem::Points(&[*statement.public]),
        HashItem::Bytes(COMMITMENT_LABEL),
        HashItem::Points(&[*big_k]),
    ]);
    transcript.challenge::<C>()
}

/// Prove that a witness satisfies a given statement.
///
/// We need some randomness for the proof, and also a transcript, which is
/// used for the Fiat-Shamir transform.
pub fn prove<'a, C: CSCurve>(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Hash,
    statement: Statement<'a, C>,
    witness: Witness<'a, C>,
) -> Proof<C> {
    let k = C::Scalar::random(rng);
    let big_k = statement.phi(&k);

    let e = challenge(transcript, statement, &big_k);

    let s = k + e * witness.x;
    Proof { e, s }
}

/// Verify that a proof attesting to the validity of some statement.
///
/// We use a transcript in order to verify the Fiat-Shamir transformation.
#[must_use]
pub fn verify<C: CSCurve>(
    transcript: &mut Hash,
    statement: Statement<'_, C>,
    proof: &Proof<C>,
) -> bool {
    let big_k: C::ProjectivePoint = statement.phi(&proof.s) - *statement.public * proof.e;

    let e = challenge(transcript, statement, &big_k);

    e == proof.e
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::party::PartyId;
    use k256::{ProjectivePoint, Scalar, Secp256k1};

    #[test]
    fn test_valid_proof_verifies() {
        let x = Scalar::generate_biased(&mut OsRng);

        let statement = Statement::<Secp256k1> {
            public: &(ProjectivePoint::GENERATOR * x),
        };
        let witness = Witness { x: &x };

        let mut transcript = Hash::new();
        transcript.write(b"protocol");
        let alice = PartyId::from("alice");

        let proof = prove(
            &mut OsRng,
            &mut transcript.clone_with_id(&alice),
            statement,
            witness,
        );

        assert!(verify(&mut transcript.clone_with_id(&alice), statement, &proof));
        assert!(!verify(
            &mut transcript.clone_with_id(&PartyId::from("bob")),
            statement,
            &proof
        ));
    }

    #[test]
    fn test_wrong_witness_fails() {
        let x = Scalar::generate_biased(&mut OsRng);
        let y = x + Scalar::ONE;

        let statement = Statement::<Secp256k1> {
            public: &(ProjectivePoint::GENERATOR * x),
        };
        let proof = prove(&mut OsRng, &mut Hash::new(), statement, Witness { x: &y });

        assert!(!verify(&mut Hash::new(), statement, &proof));
    }
}
