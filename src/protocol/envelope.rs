//! Messages tagged with the round they belong to.
use super::{
    round::{Content, RoundNumber},
    MessageData, MessageError,
};
use crate::{
    party::PartyId,
    serde::{decode, encode_with_tag},
};

/// A message received from another party.
///
/// The first byte of the raw data is the round number, which lets us route
/// a message without looking at its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: PartyId,
    pub round: RoundNumber,
    content: MessageData,
}

impl Envelope {
    /// Parse the raw data of a message.
    pub fn parse(from: PartyId, data: &[u8]) -> Result<Self, MessageError> {
        let (&round, content) = data.split_first().ok_or(MessageError::Empty)?;
        Ok(Self {
            from,
            round,
            content: content.to_vec(),
        })
    }

    /// Encode some content into raw message data.
    pub fn seal<T: Content>(content: &T) -> MessageData {
        encode_with_tag(T::ROUND, content)
    }

    /// Decode the content of this message.
    ///
    /// The round of the message is checked against the round of the content
    /// before anything gets decoded. The content then validates itself.
    pub fn decode<T: Content>(&self) -> Result<T, MessageError> {
        if self.round != T::ROUND {
            return Err(MessageError::RoundMismatch {
                expected: T::ROUND,
                found: self.round,
            });
        }
        let content: T = decode(&self.content)?;
        content.validate()?;
        Ok(content)
    }
}

#[cfg(test)]
mod test {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Nonzero(u32);

    impl Content for Nonzero {
        const ROUND: RoundNumber = 3;

        fn validate(&self) -> Result<(), MessageError> {
            if self.0 == 0 {
                return Err(MessageError::ZeroValue("value"));
            }
            Ok(())
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Other(u32);

    impl Content for Other {
        const ROUND: RoundNumber = 4;
    }

    fn alice() -> PartyId {
        PartyId::from("alice")
    }

    #[test]
    fn test_envelopes_carry_their_round() {
        let data = Envelope::seal(&Nonzero(7));
        assert_eq!(data[0], 3);

        let envelope = Envelope::parse(alice(), &data).unwrap();
        assert_eq!(envelope.round, 3);
        assert_eq!(envelope.from, alice());
        assert_eq!(envelope.decode::<Nonzero>(), Ok(Nonzero(7)));
    }

    #[test]
    fn test_round_mismatch_is_rejected_before_decoding() {
        let mut data = Envelope::seal(&Other(7));
        data.truncate(1);
        let envelope = Envelope::parse(alice(), &data).unwrap();
        assert_eq!(
            envelope.decode::<Nonzero>(),
            Err(MessageError::RoundMismatch {
                expected: 3,
                found: 4
            })
        );
    }

    #[test]
    fn test_bad_content_is_rejected() {
        assert_eq!(Envelope::parse(alice(), &[]), Err(MessageError::Empty));

        let envelope = Envelope::parse(alice(), &Envelope::seal(&Nonzero(0))).unwrap();
        assert_eq!(
            envelope.decode::<Nonzero>(),
            Err(MessageError::ZeroValue("value"))
        );

        let envelope = Envelope::parse(alice(), &[3, 0xc1]).unwrap();
        assert!(matches!(
            envelope.decode::<Nonzero>(),
            Err(MessageError::Decode(_))
        ));
    }
}
