//! AARQ (A-Associate Request), BER application tag 0x60.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "parse")]
use nom::IResult;

use super::ber::{self, Tlv};
use super::initiate::GlobalCipherInitiateRequest;
use super::{
    ApplicationContextName, AuthenticationValue, Conformance, InitiateRequest, MechanismName,
    AARQ_TAG,
};
use crate::security::SYSTEM_TITLE_LENGTH;

/// The xDLMS APDU inside the AARQ user-information field: a plain
/// InitiateRequest, or one ciphered under the global key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AarqUserInformation {
    Initiate(InitiateRequest),
    Ciphered(GlobalCipherInitiateRequest),
}

use self::AarqUserInformation as UserInformation;

/// The association request. Optional ACSE fields that the client never
/// sends (AE qualifiers, invocation ids) are skipped on encode and
/// ignored on parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Aarq {
    pub application_context_name: ApplicationContextName,
    /// Calling AP title: the client system title, mandatory on ciphered
    /// contexts.
    pub system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    pub mechanism_name: Option<MechanismName>,
    /// LLS password or HLS client-to-server challenge.
    pub calling_authentication_value: Option<AuthenticationValue>,
    pub user_information: Option<UserInformation>,
}

impl Aarq {
    /// Lowest-level security: no mechanism, no credentials.
    pub fn new_no_security(conformance: Conformance, max_pdu_size: u16) -> Self {
        Self {
            application_context_name: ApplicationContextName::LogicalName,
            system_title: None,
            mechanism_name: None,
            calling_authentication_value: None,
            user_information: Some(UserInformation::Initiate(InitiateRequest::new(
                conformance,
                max_pdu_size,
            ))),
        }
    }

    /// LLS: password in the calling authentication value.
    pub fn new_with_password(
        conformance: Conformance,
        max_pdu_size: u16,
        password: Vec<u8>,
    ) -> Self {
        Self {
            application_context_name: ApplicationContextName::LogicalName,
            system_title: None,
            mechanism_name: Some(MechanismName::Low),
            calling_authentication_value: Some(AuthenticationValue::CharString(password)),
            user_information: Some(UserInformation::Initiate(InitiateRequest::new(
                conformance,
                max_pdu_size,
            ))),
        }
    }

    /// HLS-GMAC: ciphered context, client system title and a random
    /// client-to-server challenge.
    pub fn new_with_hls_gmac(
        conformance: Conformance,
        max_pdu_size: u16,
        system_title: [u8; SYSTEM_TITLE_LENGTH],
        challenge: Vec<u8>,
    ) -> Self {
        Self {
            application_context_name: ApplicationContextName::LogicalNameWithCiphering,
            system_title: Some(system_title),
            mechanism_name: Some(MechanismName::HighGmac),
            calling_authentication_value: Some(AuthenticationValue::CharString(challenge)),
            user_information: Some(UserInformation::Initiate(InitiateRequest::new(
                conformance,
                max_pdu_size,
            ))),
        }
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        // A1: application-context-name, explicit OID
        ber::push_wrapped_tlv(
            &mut content,
            0xa1,
            ber::TAG_OBJECT_IDENTIFIER,
            &self.application_context_name.oid_bytes(),
        );

        // A6: calling-AP-title, explicit octet string
        if let Some(ref title) = self.system_title {
            ber::push_wrapped_tlv(&mut content, 0xa6, ber::TAG_OCTET_STRING, title);
        }

        if let Some(mechanism) = self.mechanism_name {
            // 8A: sender-acse-requirements, implicit bit string
            // {authentication}
            ber::push_tlv(&mut content, 0x8a, &[0x07, 0x80]);
            // 8B: mechanism-name, implicit OID
            ber::push_tlv(&mut content, 0x8b, &mechanism.oid_bytes());
        }

        // AC: calling-authentication-value, a context CHOICE
        if let Some(ref value) = self.calling_authentication_value {
            match value {
                AuthenticationValue::CharString(bytes) => {
                    ber::push_wrapped_tlv(&mut content, 0xac, 0x80, bytes);
                }
                AuthenticationValue::BitString(bits) => {
                    let mut bit_string = Vec::with_capacity(bits.len() + 1);
                    bit_string.push(0x00);
                    bit_string.extend_from_slice(bits);
                    ber::push_wrapped_tlv(&mut content, 0xac, 0x81, &bit_string);
                }
            }
        }

        // BE: user-information, octet string around the xDLMS APDU
        if let Some(ref user_information) = self.user_information {
            let initiate = match user_information {
                UserInformation::Initiate(initiate) => initiate.encode(),
                UserInformation::Ciphered(ciphered) => ciphered.encode(),
            };
            ber::push_wrapped_tlv(&mut content, 0xbe, ber::TAG_OCTET_STRING, &initiate);
        }

        let mut buf = Vec::with_capacity(content.len() + 4);
        ber::push_tlv(&mut buf, AARQ_TAG, &content);
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        use super::initiate::{
            GlobalCipherInitiateRequest, GLOBAL_CIPHER_INITIATE_REQUEST_TAG, INITIATE_REQUEST_TAG,
        };

        fn malformed(at: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
            nom::Err::Error(nom::error::Error::new(at, nom::error::ErrorKind::Tag))
        }

        let (remaining, outer) = Tlv::parse(input)?;
        if outer.tag != AARQ_TAG {
            return Err(malformed(input));
        }

        let mut application_context_name = None;
        let mut system_title = None;
        let mut mechanism_name = None;
        let mut calling_authentication_value = None;
        let mut user_information = None;

        let mut content = outer.content;
        while !content.is_empty() {
            let (rest, field) = Tlv::parse(content)?;
            content = rest;

            match field.tag {
                0xa1 => {
                    let oid = field
                        .unwrap_inner(ber::TAG_OBJECT_IDENTIFIER)
                        .ok_or_else(|| malformed(field.content))?;
                    application_context_name = ApplicationContextName::from_oid_bytes(oid);
                }
                0xa6 => {
                    let title = field
                        .unwrap_inner(ber::TAG_OCTET_STRING)
                        .ok_or_else(|| malformed(field.content))?;
                    if title.len() == SYSTEM_TITLE_LENGTH {
                        let mut fixed = [0u8; SYSTEM_TITLE_LENGTH];
                        fixed.copy_from_slice(title);
                        system_title = Some(fixed);
                    }
                }
                0x8b => {
                    mechanism_name = MechanismName::from_oid_bytes(field.content);
                }
                0xac => {
                    let (_, choice) = Tlv::parse(field.content)?;
                    calling_authentication_value = match choice.tag {
                        0x80 => Some(AuthenticationValue::CharString(choice.content.to_vec())),
                        0x81 if !choice.content.is_empty() => {
                            Some(AuthenticationValue::BitString(choice.content[1..].to_vec()))
                        }
                        _ => None,
                    };
                }
                0xbe => {
                    let inner = field
                        .unwrap_inner(ber::TAG_OCTET_STRING)
                        .ok_or_else(|| malformed(field.content))?;
                    user_information = match inner.first() {
                        Some(&INITIATE_REQUEST_TAG) => {
                            let (_, initiate) = InitiateRequest::parse(inner)?;
                            Some(UserInformation::Initiate(initiate))
                        }
                        Some(&GLOBAL_CIPHER_INITIATE_REQUEST_TAG) => {
                            let (_, ciphered) = GlobalCipherInitiateRequest::parse(inner)?;
                            Some(UserInformation::Ciphered(ciphered))
                        }
                        _ => return Err(malformed(inner)),
                    };
                }
                // protocol-version, AE qualifiers, invocation ids
                _ => {}
            }
        }

        let application_context_name =
            application_context_name.ok_or_else(|| malformed(outer.content))?;

        Ok((
            remaining,
            Self {
                application_context_name,
                system_title,
                mechanism_name,
                calling_authentication_value,
                user_information,
            },
        ))
    }
}

impl fmt::Display for Aarq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AARQ({}", self.application_context_name)?;
        if let Some(mechanism) = self.mechanism_name {
            write!(f, ", {}", mechanism)?;
        }
        write!(f, ")")
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;

    #[test]
    fn test_simple_aarq_structure() {
        let aarq = Aarq::new_no_security(Conformance::DEFAULT_CLIENT, 0xffff);
        let encoded = aarq.encode();

        assert_eq!(encoded[0], 0x60);
        // application-context-name with the LN OID
        let ln_oid = [0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01];
        assert!(encoded.windows(ln_oid.len()).any(|w| w == ln_oid));
        // user-information present
        assert!(encoded.contains(&0xbe));
        // no authentication fields
        assert!(!encoded.contains(&0x8b));
    }

    #[test]
    fn test_simple_aarq_roundtrip() {
        let aarq = Aarq::new_no_security(Conformance::DEFAULT_CLIENT, 0xffff);
        let encoded = aarq.encode();
        let (rest, parsed) = Aarq::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, aarq);
    }

    #[test]
    fn test_password_aarq_roundtrip() {
        let aarq =
            Aarq::new_with_password(Conformance::DEFAULT_CLIENT, 0xffff, b"00000001".to_vec());
        let encoded = aarq.encode();
        // mechanism-name OID for LLS
        let lls_oid = [0x8b, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x01];
        assert!(encoded.windows(lls_oid.len()).any(|w| w == lls_oid));

        let (_, parsed) = Aarq::parse(&encoded).unwrap();
        assert_eq!(parsed.mechanism_name, Some(MechanismName::Low));
        assert_eq!(
            parsed.calling_authentication_value,
            Some(AuthenticationValue::CharString(b"00000001".to_vec()))
        );
    }

    #[test]
    fn test_hls_aarq_roundtrip() {
        let system_title = [0x4d, 0x4d, 0x4d, 0x00, 0x00, 0xbc, 0x61, 0x4e];
        let aarq = Aarq::new_with_hls_gmac(
            Conformance::DEFAULT_CLIENT | Conformance::GENERAL_PROTECTION,
            0x1000,
            system_title,
            b"P6wRJ21F".to_vec(),
        );
        let (_, parsed) = Aarq::parse(&aarq.encode()).unwrap();

        assert_eq!(
            parsed.application_context_name,
            ApplicationContextName::LogicalNameWithCiphering
        );
        assert_eq!(parsed.system_title, Some(system_title));
        assert_eq!(parsed.mechanism_name, Some(MechanismName::HighGmac));
        assert_eq!(parsed, aarq);
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let aarq = Aarq::new_no_security(Conformance::DEFAULT_CLIENT, 0x0400);
        let mut encoded = aarq.encode();
        // splice an A0 protocol-version in front of the content
        let extra = [0xa0, 0x04, 0x03, 0x02, 0x07, 0x80];
        let mut spliced = Vec::new();
        spliced.push(encoded[0]);
        spliced.push(encoded[1] + extra.len() as u8);
        spliced.extend_from_slice(&extra);
        spliced.extend_from_slice(&encoded[2..]);
        encoded = spliced;

        let (_, parsed) = Aarq::parse(&encoded).unwrap();
        assert_eq!(parsed, aarq);
    }

    #[test]
    fn test_missing_context_rejected() {
        // AARQ with only a user-information field
        let mut content = Vec::new();
        ber::push_wrapped_tlv(&mut content, 0xbe, ber::TAG_OCTET_STRING, &[0x01, 0x00]);
        let mut encoded = Vec::new();
        ber::push_tlv(&mut encoded, AARQ_TAG, &content);
        assert!(Aarq::parse(&encoded).is_err());
    }
}
