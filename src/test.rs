use std::{error::Error, sync::Arc, sync::OnceLock};

use elliptic_curve::Group;
use num_bigint::BigUint;
use rand_core::OsRng;

use crate::{
    compat::CSCurve,
    keygen, paillier,
    party::{Parties, PartyId, SessionId},
    pedersen, presign,
    protocol::{
        envelope::Envelope,
        round::{Content, Outbox, Outgoing, Round, Transition},
        run_protocol, MessageData, MessageError, Protocol,
    },
    sign, FullSignature, KeygenArguments, KeygenOutput, PresignArguments, PresignOutput,
};

/// Blum primes backing the Paillier keys used in tests.
///
/// Generating these on the fly takes a while, so we keep a few around.
const PRIMES: [(&str, &str); 3] = [
    (
        concat!(
            "f05f3c15986f14fd8cdbb569ab98dff3a33dc1c9e3297cc7deb7122a40d6904e59fc380dc44670746a677a4898593e1c9840382f0b49e1fe9e8d1136b2cd9244",
            "a1ebc4484127631da61ed585203ae6cb7359775c77f264a805e5c914ef14ebd3a1ae42b56184bacf8127d33548e57250775ec8f1282b4fe696647776186c5f53",
        ),
        concat!(
            "c33ba682efc72cf8d6b071a0f76496b176bb9ca74e813ecb15a3394e42722191f55c539777df50f71ea0092755b30db1a1401544239a5d915c22ff29ecb1e7f0",
            "6229ab97dec65fee4b06432501c4ef299a7082a1ce6be92fabb472d62345c92c46858743bec2b4ab0337062a74cf7b854a0307b4129ba1f002c4a0be897554df",
        ),
    ),
    (
        concat!(
            "ee0edf55ea7ee8643587f8683712a3e6cd6b42ba4781b197c4feefd622ff47c862c0383ec2390633b53994b5f4a6565ec80a999c2b08e92fd107a11d31ce339a",
            "6de6b1849c2a57a7d0f41a6fdb613c7bdee75c1770795e3caaf28d2c22c7c7cd7855c8223ef4841acd5fb4138e7e0d5b27cc5e9185d51f3727ff6612f3e50cbb",
        ),
        concat!(
            "fa266a92a929d66ac12206d92e986e4dbb36fe03166952dc25f48ba39325082faaf2beeff85a7173b4e958c899afd8e928847591ec31698cf3eabc607b008429",
            "8b3303c01bea73371fae1b045bb9f5dd62abbf3c174093bb79c80e7bef05038c8f6d33b24ba05d0ff0acd24eecdf1f00751be500873628caaa8f8fa9c7b0d783",
        ),
    ),
    (
        concat!(
            "dd6c039361b9172bad353a4fbf65cf266a277deec32fdb06434cdf2fbce1b0ffd3a93fb5681e8c3f1a5f09b2fc9ead7be9b17c13d92ac965b8ce6a4f96f43d10",
            "06dd6fb084ab02514e32f4a985b5834525a4548190c261a94cf4d8f1047d3fd3cd2b144e1838db845d9522b0b189fe4271c3872a37c9c5107c246e0c31672633",
        ),
        concat!(
            "d265cba72e7e5ce0ee265b8213e4a30412a94d00e2a0b311e5802e188ebb42e9bc570c273607ceaecf9fa3c91e964c07a2115601b7c3256b11d5750c30f43f8b",
            "58eaf043134284beed929f9d7d531d76574ac275bb94bd3284350677854d525e63b3fc56678236dd5f3876f1e5b31569875ad0b52395f8d45e07f09eb74663cf",
        ),
    ),
];

pub(crate) fn paillier_primes(i: usize) -> (BigUint, BigUint) {
    let (p, q) = PRIMES[i];
    (
        BigUint::parse_bytes(p.as_bytes(), 16).unwrap(),
        BigUint::parse_bytes(q.as_bytes(), 16).unwrap(),
    )
}

pub(crate) fn paillier_fixture(i: usize) -> paillier::SecretKey {
    static KEYS: OnceLock<Vec<paillier::SecretKey>> = OnceLock::new();
    KEYS.get_or_init(|| {
        (0..PRIMES.len())
            .map(|i| {
                let (p, q) = paillier_primes(i);
                paillier::SecretKey::from_primes(p, q).unwrap()
            })
            .collect()
    })[i]
        .clone()
}

pub(crate) fn test_ids(n: usize) -> Vec<PartyId> {
    (0..n).map(|i| PartyId::new(format!("p{i}"))).collect()
}

pub(crate) fn test_ssid() -> SessionId {
    SessionId::from_bytes(&[0x42; 32]).unwrap()
}

/// Public records for parties holding the given key shares, without running key generation.
pub(crate) fn keyed_parties<C: CSCurve>(
    ids: &[PartyId],
    ssid: SessionId,
    shares: &[C::Scalar],
) -> Arc<Parties<C>> {
    let mut parties = Parties::<C>::new(ssid, ids).unwrap();
    for (i, (id, x)) in ids.iter().zip(shares).enumerate() {
        let sk = paillier_fixture(i);
        let pedersen = pedersen::Parameters::generate(&mut OsRng, &sk);
        parties
            .set_keygen_material(
                id,
                C::ProjectivePoint::generator() * *x,
                sk.public().clone(),
                pedersen,
            )
            .unwrap();
    }
    Arc::new(parties)
}

/// Finalize one round for every party, and deliver what they send to the next round.
///
/// Every message passes through `tamper` on the way, along with its sender.
/// The rounds come back in the same order, with every message that got rejected.
pub(crate) fn step<R: Round>(
    rounds: Vec<(PartyId, R)>,
    mut tamper: impl FnMut(&PartyId, MessageData) -> MessageData,
) -> (Vec<(PartyId, R)>, Vec<MessageError>) {
    let mut next = Vec::with_capacity(rounds.len());
    let mut sent = Vec::new();
    for (p, round) in rounds {
        let mut outbox = Outbox::new();
        match round.finalize(&mut outbox).unwrap() {
            Transition::Next(round) => next.push((p.clone(), round)),
            Transition::Done(_) => panic!("protocol ended early"),
        }
        while let Some(outgoing) = outbox.pop() {
            match outgoing {
                Outgoing::Many(data) => sent.push((p.clone(), None, data)),
                Outgoing::Private(to, data) => sent.push((p.clone(), Some(to), data)),
            }
        }
    }

    let mut rejected = Vec::new();
    for (from, to, data) in sent {
        let data = tamper(&from, data);
        for (p, round) in next.iter_mut() {
            if p == &from || to.as_ref().is_some_and(|to| to != p) {
                continue;
            }
            let envelope = Envelope::parse(from.clone(), &data).unwrap();
            if let Err(e) = round.process_message(&envelope) {
                rejected.push(e);
            }
        }
    }
    (next, rejected)
}

/// Rewrite the content of every message `who` sends.
pub(crate) fn rewrite<T: Content>(
    who: PartyId,
    f: impl Fn(&mut T),
) -> impl FnMut(&PartyId, MessageData) -> MessageData {
    move |from: &PartyId, data: MessageData| {
        if from != &who {
            return data;
        }
        let mut content: T = Envelope::parse(from.clone(), &data)
            .unwrap()
            .decode()
            .unwrap();
        f(&mut content);
        Envelope::seal(&content)
    }
}

#[allow(clippy::type_complexity)]
pub(crate) fn run_keygen<C: CSCurve>(
    ids: &[PartyId],
) -> Result<Vec<(PartyId, KeygenOutput<C>)>, Box<dyn Error>> {
    let mut protocols: Vec<(PartyId, Box<dyn Protocol<Output = KeygenOutput<C>>>)> =
        Vec::with_capacity(ids.len());

    for (i, p) in ids.iter().enumerate() {
        let protocol = keygen::<C>(KeygenArguments {
            participants: ids.to_vec(),
            me: p.clone(),
            ssid: test_ssid(),
            paillier: paillier_fixture(i),
        })?;
        protocols.push((p.clone(), Box::new(protocol)));
    }

    Ok(run_protocol(protocols)?)
}

#[allow(clippy::type_complexity)]
pub(crate) fn run_presign<C: CSCurve>(
    keygen: &[(PartyId, KeygenOutput<C>)],
) -> Result<Vec<(PartyId, PresignOutput<C>)>, Box<dyn Error>> {
    let mut protocols: Vec<(PartyId, Box<dyn Protocol<Output = PresignOutput<C>>>)> =
        Vec::with_capacity(keygen.len());

    for (p, keygen_out) in keygen {
        let protocol = presign(PresignArguments {
            keygen_out: keygen_out.clone(),
        })?;
        protocols.push((p.clone(), Box::new(protocol)));
    }

    Ok(run_protocol(protocols)?)
}

#[allow(clippy::type_complexity)]
fn run_sign<C: CSCurve>(
    parties: &Arc<Parties<C>>,
    presign: Vec<(PartyId, PresignOutput<C>)>,
    msg: &[u8],
) -> Result<Vec<(PartyId, FullSignature<C>)>, Box<dyn Error>> {
    let mut protocols: Vec<(PartyId, Box<dyn Protocol<Output = FullSignature<C>>>)> =
        Vec::with_capacity(presign.len());

    for (p, presignature) in presign {
        let protocol = sign::<C>(parties.clone(), p.clone(), presignature, C::scalar_hash(msg))?;
        protocols.push((p, Box::new(protocol)));
    }

    Ok(run_protocol(protocols)?)
}

/// Run every protocol in turn, checking the signature at the end.
fn run_e2e<C: CSCurve>(n: usize, msg: &[u8]) -> Result<FullSignature<C>, Box<dyn Error>> {
    let ids = test_ids(n);

    let keygen_result = run_keygen::<C>(&ids)?;
    let public_key = keygen_result[0].1.public_key;
    assert!(keygen_result
        .iter()
        .all(|(_, out)| out.public_key == public_key));
    let parties = keygen_result[0].1.parties.clone();

    let presign_result = run_presign(&keygen_result)?;
    let big_r = presign_result[0].1.big_r;
    assert!(presign_result.iter().all(|(_, out)| out.big_r == big_r));

    let sign_result = run_sign(&parties, presign_result, msg)?;
    let sig = sign_result[0].1.clone();
    assert!(sign_result.iter().all(|(_, other)| *other == sig));
    assert_eq!(sig.big_r, big_r);
    assert!(sig.verify(&public_key, &C::scalar_hash(msg)));
    assert!(!sig.verify(&public_key, &C::scalar_hash(b"another message")));
    Ok(sig)
}

#[test_log::test]
fn test_e2e() -> Result<(), Box<dyn Error>> {
    use ecdsa::Signature;
    use k256::{ecdsa::signature::Verifier, ecdsa::VerifyingKey, PublicKey, Secp256k1};

    let msg = b"hello world";
    let ids = test_ids(3);
    let keygen_result = run_keygen::<Secp256k1>(&ids)?;
    let public_key = keygen_result[0].1.public_key;
    let parties = keygen_result[0].1.parties.clone();
    let presign_result = run_presign(&keygen_result)?;
    let sign_result = run_sign(&parties, presign_result, msg)?;

    let sig = sign_result[0].1.clone();
    let sig = Signature::<Secp256k1>::from_scalars(sig.r(), sig.s)?;
    VerifyingKey::from(&PublicKey::from_affine(public_key)?).verify(&msg[..], &sig)?;
    Ok(())
}

#[test]
fn test_e2e_two_parties() -> Result<(), Box<dyn Error>> {
    run_e2e::<k256::Secp256k1>(2, b"two of us")?;
    Ok(())
}

#[test]
fn test_e2e_p256() -> Result<(), Box<dyn Error>> {
    run_e2e::<p256::NistP256>(3, b"hello p256")?;
    Ok(())
}

#[test]
fn test_presignatures_are_fresh() -> Result<(), Box<dyn Error>> {
    let ids = test_ids(2);
    let keygen_result = run_keygen::<k256::Secp256k1>(&ids)?;
    let first = run_presign(&keygen_result)?;
    let second = run_presign(&keygen_result)?;
    assert_ne!(first[0].1.big_r, second[0].1.big_r);
    Ok(())
}
