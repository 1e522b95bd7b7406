//! RLRE (Release Response), BER application tag 0x63.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "parse")]
use nom::IResult;

use super::ber::{self, Tlv};
use super::{ReleaseResponseReason, RLRE_TAG};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rlre {
    pub reason: Option<ReleaseResponseReason>,
    pub user_information: Option<Vec<u8>>,
}

impl Default for Rlre {
    fn default() -> Self {
        Self { reason: Some(ReleaseResponseReason::Normal), user_information: None }
    }
}

impl Rlre {
    pub fn with_reason(reason: ReleaseResponseReason) -> Self {
        Self { reason: Some(reason), user_information: None }
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();
        if let Some(reason) = self.reason {
            ber::push_tlv(&mut content, 0x80, &[reason as u8]);
        }
        if let Some(ref user_information) = self.user_information {
            ber::push_wrapped_tlv(&mut content, 0xbe, ber::TAG_OCTET_STRING, user_information);
        }
        let mut buf = Vec::with_capacity(content.len() + 2);
        ber::push_tlv(&mut buf, RLRE_TAG, &content);
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (remaining, outer) = Tlv::parse(input)?;
        if outer.tag != RLRE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }

        let mut reason = None;
        let mut user_information = None;
        let mut content = outer.content;
        while !content.is_empty() {
            let (rest, field) = Tlv::parse(content)?;
            content = rest;
            match field.tag {
                0x80 => {
                    reason = field.content.first().copied().and_then(ReleaseResponseReason::from_u8)
                }
                0xbe => {
                    user_information =
                        field.unwrap_inner(ber::TAG_OCTET_STRING).map(|inner| inner.to_vec())
                }
                _ => {}
            }
        }

        Ok((remaining, Self { reason, user_information }))
    }
}

impl fmt::Display for Rlre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RLRE({:?})", self.reason)
    }
}
