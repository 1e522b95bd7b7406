//! The general-global-cipher APDU (tag 0xDB).
//!
//! Wraps any other APDU in AES-GCM protection under the global (or
//! dedicated) key. Wire layout:
//!
//! ```text
//! DB | len(8) | system-title(8) | length | SC | IC(4 BE) | ciphered(+tag)
//! ```
//!
//! The trailing length covers security control, invocation counter and
//! the ciphered text including its 12-byte tag.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::error::Error;
use crate::security::{self, SecurityControl, SYSTEM_TITLE_LENGTH};

#[cfg(feature = "parse")]
use crate::data::parse_length;
#[cfg(feature = "encode")]
use crate::data::encode_length;

pub const GENERAL_GLOBAL_CIPHER_TAG: u8 = 0xdb;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralGlobalCipher {
    pub system_title: [u8; SYSTEM_TITLE_LENGTH],
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    /// Ciphered inner APDU, GCM tag included.
    pub ciphered_text: Vec<u8>,
}

impl GeneralGlobalCipher {
    /// Protect `plaintext` and wrap it, consuming one invocation-counter
    /// value.
    pub fn protect(
        security_control: SecurityControl,
        system_title: [u8; SYSTEM_TITLE_LENGTH],
        invocation_counter: u32,
        key: &[u8],
        auth_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Self, Error> {
        let ciphered_text = security::encrypt(
            security_control,
            &system_title,
            invocation_counter,
            key,
            auth_key,
            plaintext,
        )?;
        Ok(Self { system_title, security_control, invocation_counter, ciphered_text })
    }

    /// Recover the inner APDU bytes. The nonce is rebuilt from the
    /// carried invocation counter and the system title the caller trusts
    /// for this direction.
    pub fn to_plain_apdu(&self, key: &[u8], auth_key: &[u8]) -> Result<Vec<u8>, Error> {
        security::decrypt(
            self.security_control,
            &self.system_title,
            self.invocation_counter,
            key,
            auth_key,
            &self.ciphered_text,
        )
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(GENERAL_GLOBAL_CIPHER_TAG);
        buf.push(SYSTEM_TITLE_LENGTH as u8);
        buf.extend_from_slice(&self.system_title);
        encode_length(&mut buf, 1 + 4 + self.ciphered_text.len());
        buf.push(self.security_control.to_byte());
        buf.extend_from_slice(&self.invocation_counter.to_be_bytes());
        buf.extend_from_slice(&self.ciphered_text);
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != GENERAL_GLOBAL_CIPHER_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (input, st_len) = nom_u8(input)?;
        if st_len as usize != SYSTEM_TITLE_LENGTH {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (input, st) = take(SYSTEM_TITLE_LENGTH)(input)?;
        let mut system_title = [0u8; SYSTEM_TITLE_LENGTH];
        system_title.copy_from_slice(st);

        let (input, content_len) = parse_length(input)?;
        if content_len < 5 {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::LengthValue,
            )));
        }
        let (input, security_control) = SecurityControl::parse(input)?;
        let (input, invocation_counter) = be_u32(input)?;
        let (input, ciphered) = take(content_len - 5)(input)?;

        Ok((
            input,
            Self {
                system_title,
                security_control,
                invocation_counter,
                ciphered_text: ciphered.to_vec(),
            },
        ))
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;

    const EK: [u8; 16] = *b"SUCHINSECUREKIND";
    const AK: [u8; 16] = *b"SUCHINSECUREKIND";
    const ST: [u8; 8] = [0x4b, 0x46, 0x4d, 0x10, 0x20, 0x01, 0x12, 0xa9];

    #[test]
    fn test_wire_roundtrip() {
        let apdu = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            ST,
            0x01020304,
            &EK,
            &AK,
            &[0xc0, 0x01, 0x81],
        )
        .unwrap();

        let encoded = apdu.encode();
        assert_eq!(encoded[0], 0xdb);
        assert_eq!(encoded[1], 8);
        assert_eq!(&encoded[2..10], &ST);
        // SC + IC + 3 plaintext bytes + 12 tag bytes
        assert_eq!(encoded[10] as usize, 1 + 4 + 3 + 12);
        assert_eq!(encoded[11], 0x30);
        assert_eq!(&encoded[12..16], &[0x01, 0x02, 0x03, 0x04]);

        let (rest, parsed) = GeneralGlobalCipher::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_protect_then_unprotect() {
        let plaintext = [0xc1, 0x01, 0x41, 0x00, 0x01, 0, 0, 96, 1, 0, 255, 0x02, 0x00, 0x03];
        let apdu = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            ST,
            9,
            &EK,
            &AK,
            &plaintext,
        )
        .unwrap();

        assert_eq!(apdu.to_plain_apdu(&EK, &AK).unwrap(), plaintext);
    }

    #[test]
    fn test_unprotect_wrong_key_fails() {
        let apdu = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            ST,
            9,
            &EK,
            &AK,
            &[0x01, 0x02],
        )
        .unwrap();

        let wrong = *b"0000000000000000";
        assert_eq!(apdu.to_plain_apdu(&wrong, &AK), Err(Error::DecryptionError));
    }

    #[test]
    fn test_parse_rejects_undersized_content() {
        // Content length 3 cannot hold SC + IC.
        let input = [0xdb, 0x08, 0, 0, 0, 0, 0, 0, 0, 0, 0x03, 0x30, 0x00, 0x00];
        assert!(GeneralGlobalCipher::parse(&input).is_err());
    }

    #[test]
    fn test_parse_accepts_long_form_length() {
        let apdu = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            ST,
            1,
            &EK,
            &AK,
            &[0u8; 130],
        )
        .unwrap();
        let encoded = apdu.encode();
        // 147 bytes of content forces the 0x81 long form.
        assert_eq!(encoded[10], 0x81);
        let (_, parsed) = GeneralGlobalCipher::parse(&encoded).unwrap();
        assert_eq!(parsed, apdu);
    }
}
