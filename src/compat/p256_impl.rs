#[cfg(any(feature = "p256", test))]
mod p256_impl {
    use super::super::*;

    use digest::{Digest, FixedOutput};
    use ecdsa::{hazmat::DigestPrimitive, signature::hazmat::PrehashVerifier};
    use elliptic_curve::bigint::Bounded;
    use p256::{
        ecdsa::{Signature, VerifyingKey},
        FieldBytes, NistP256, Scalar,
    };

    impl CSCurve for NistP256 {
        const NAME: &'static [u8] = b"NistP256";
        const BITS: usize = <Self::Uint as Bounded>::BITS;

        fn scalar_hash(msg: &[u8]) -> Self::Scalar {
            let digest = <NistP256 as DigestPrimitive>::Digest::new_with_prefix(msg);
            let m_bytes: FieldBytes = digest.finalize_fixed();
            <Scalar as Reduce<<NistP256 as Curve>::Uint>>::reduce_bytes(&m_bytes)
        }

        fn serialize_point<S: Serializer>(
            point: &Self::AffinePoint,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            point.serialize(serializer)
        }

        fn deserialize_point<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Self::AffinePoint, D::Error> {
            Self::AffinePoint::deserialize(deserializer)
        }

        fn verify_prehashed(
            public_key: &Self::AffinePoint,
            msg_hash: &Self::Scalar,
            r: &Self::Scalar,
            s: &Self::Scalar,
        ) -> bool {
            let Ok(signature) = Signature::from_scalars(*r, *s) else {
                return false;
            };
            let Ok(verifying_key) = VerifyingKey::from_affine(*public_key) else {
                return false;
            };
            let prehash: FieldBytes = (*msg_hash).into();
            verifying_key.verify_prehash(&prehash, &signature).is_ok()
        }
    }
}
