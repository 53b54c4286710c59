use elliptic_curve::ScalarPrimitive;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::compat::{CSCurve, SerializablePoint};

/// Encode an arbitrary serializable value into a vec.
pub fn encode<T: Serialize + ?Sized>(val: &T) -> Vec<u8> {
    rmp_serde::encode::to_vec(val).expect("failed to encode value")
}

/// Encode an arbitrary serializable value into a vec, prefixed with a tag byte.
///
/// The tag lets a receiver route the message before looking at the rest.
pub fn encode_with_tag<T: Serialize + ?Sized>(tag: u8, val: &T) -> Vec<u8> {
    let mut out = vec![tag];
    rmp_serde::encode::write(&mut out, val).expect("failed to encode value");
    out
}

/// Decode an arbitrary value from a slice of bytes.
pub fn decode<T: DeserializeOwned>(input: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::decode::from_slice(input)
}

/// Serialize a single projective point.
pub fn serialize_projective_point<C: CSCurve, S: Serializer>(
    data: &C::ProjectivePoint,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    SerializablePoint::<C>::from_projective(data).serialize(serializer)
}

/// Deserialize a single projective point.
pub fn deserialize_projective_point<'de, C: CSCurve, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<C::ProjectivePoint, D::Error> {
    let point = SerializablePoint::<C>::deserialize(deserializer)?;
    Ok(point.to_projective())
}

/// Serialize a scalar.
pub fn serialize_scalar<C: CSCurve, S: Serializer>(
    data: &C::Scalar,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let data: ScalarPrimitive<C> = (*data).into();
    data.serialize(serializer)
}

/// Deserialize a scalar.
pub fn deserialize_scalar<'de, C: CSCurve, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<C::Scalar, D::Error> {
    let out: ScalarPrimitive<C> = ScalarPrimitive::deserialize(deserializer)?;
    Ok(out.into())
}
