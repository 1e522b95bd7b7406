//! AARE (A-Associate Response), BER application tag 0x61.
//!
//! Carries the association verdict, the responding system title (needed
//! for deciphering), the server-to-client challenge on HLS mechanisms,
//! and the negotiated InitiateResponse.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "parse")]
use nom::IResult;

use super::ber::{self, Tlv};
use super::initiate::GlobalCipherInitiateResponse;
use super::{
    AcseServiceUserDiagnostics, ApplicationContextName, AssociationResult, InitiateResponse,
    MechanismName, AARE_TAG,
};
use crate::apdu::ConfirmedServiceError;
use crate::security::SYSTEM_TITLE_LENGTH;

/// The xDLMS APDU inside the AARE user-information field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AareUserInformation {
    Initiate(InitiateResponse),
    Ciphered(GlobalCipherInitiateResponse),
    /// Carried on rejections to explain why the Initiate failed.
    ServiceError(ConfirmedServiceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aare {
    pub application_context_name: ApplicationContextName,
    pub result: AssociationResult,
    pub result_source_diagnostic: AcseServiceUserDiagnostics,
    /// Responding AP title: the server system title.
    pub system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    pub mechanism_name: Option<MechanismName>,
    /// Server-to-client challenge on HLS mechanisms.
    pub server_challenge: Option<Vec<u8>>,
    pub user_information: Option<AareUserInformation>,
}

impl Aare {
    pub fn new_accepted(
        application_context_name: ApplicationContextName,
        initiate_response: InitiateResponse,
    ) -> Self {
        Self {
            application_context_name,
            result: AssociationResult::Accepted,
            result_source_diagnostic: AcseServiceUserDiagnostics::Null,
            system_title: None,
            mechanism_name: None,
            server_challenge: None,
            user_information: Some(AareUserInformation::Initiate(initiate_response)),
        }
    }

    pub fn new_rejected(
        application_context_name: ApplicationContextName,
        result: AssociationResult,
        diagnostic: AcseServiceUserDiagnostics,
    ) -> Self {
        Self {
            application_context_name,
            result,
            result_source_diagnostic: diagnostic,
            system_title: None,
            mechanism_name: None,
            server_challenge: None,
            user_information: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.result == AssociationResult::Accepted
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut content = Vec::new();

        // A1: application-context-name
        ber::push_wrapped_tlv(
            &mut content,
            0xa1,
            ber::TAG_OBJECT_IDENTIFIER,
            &self.application_context_name.oid_bytes(),
        );

        // A2: result, explicit INTEGER
        ber::push_wrapped_tlv(&mut content, 0xa2, ber::TAG_INTEGER, &[self.result as u8]);

        // A3: result-source-diagnostic { acse-service-user INTEGER }
        let mut diagnostic = Vec::new();
        ber::push_tlv(&mut diagnostic, ber::TAG_INTEGER, &[self.result_source_diagnostic as u8]);
        let mut service_user = Vec::new();
        ber::push_tlv(&mut service_user, 0xa1, &diagnostic);
        ber::push_tlv(&mut content, 0xa3, &service_user);

        // A4: responding-AP-title
        if let Some(ref title) = self.system_title {
            ber::push_wrapped_tlv(&mut content, 0xa4, ber::TAG_OCTET_STRING, title);
        }

        if let Some(mechanism) = self.mechanism_name {
            // 88: responder-acse-requirements, 89: mechanism-name
            ber::push_tlv(&mut content, 0x88, &[0x07, 0x80]);
            ber::push_tlv(&mut content, 0x89, &mechanism.oid_bytes());
        }

        // AA: responding-authentication-value
        if let Some(ref challenge) = self.server_challenge {
            ber::push_wrapped_tlv(&mut content, 0xaa, 0x80, challenge);
        }

        // BE: user-information
        if let Some(ref user_information) = self.user_information {
            let inner = match user_information {
                AareUserInformation::Initiate(initiate) => initiate.encode(),
                AareUserInformation::Ciphered(ciphered) => ciphered.encode(),
                AareUserInformation::ServiceError(error) => error.encode(),
            };
            ber::push_wrapped_tlv(&mut content, 0xbe, ber::TAG_OCTET_STRING, &inner);
        }

        let mut buf = Vec::with_capacity(content.len() + 4);
        ber::push_tlv(&mut buf, AARE_TAG, &content);
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        use super::initiate::{
            GLOBAL_CIPHER_INITIATE_RESPONSE_TAG, INITIATE_RESPONSE_TAG,
        };
        use crate::apdu::CONFIRMED_SERVICE_ERROR_TAG;

        fn malformed(at: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
            nom::Err::Error(nom::error::Error::new(at, nom::error::ErrorKind::Tag))
        }

        let (remaining, outer) = Tlv::parse(input)?;
        if outer.tag != AARE_TAG {
            return Err(malformed(input));
        }

        let mut application_context_name = None;
        let mut result = None;
        let mut result_source_diagnostic = AcseServiceUserDiagnostics::Null;
        let mut system_title = None;
        let mut mechanism_name = None;
        let mut server_challenge = None;
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
                0xa2 => {
                    let value = field
                        .unwrap_inner(ber::TAG_INTEGER)
                        .ok_or_else(|| malformed(field.content))?;
                    result = value.last().copied().and_then(AssociationResult::from_u8);
                }
                0xa3 => {
                    // CHOICE: A1 acse-service-user / A2 acse-service-provider
                    let (_, choice) = Tlv::parse(field.content)?;
                    if choice.tag == 0xa1 {
                        if let Some(value) = choice.unwrap_inner(ber::TAG_INTEGER) {
                            if let Some(diagnostic) = value
                                .last()
                                .copied()
                                .and_then(AcseServiceUserDiagnostics::from_u8)
                            {
                                result_source_diagnostic = diagnostic;
                            }
                        }
                    }
                }
                0xa4 => {
                    let title = field
                        .unwrap_inner(ber::TAG_OCTET_STRING)
                        .ok_or_else(|| malformed(field.content))?;
                    if title.len() == SYSTEM_TITLE_LENGTH {
                        let mut fixed = [0u8; SYSTEM_TITLE_LENGTH];
                        fixed.copy_from_slice(title);
                        system_title = Some(fixed);
                    }
                }
                0x89 => {
                    mechanism_name = MechanismName::from_oid_bytes(field.content);
                }
                0xaa => {
                    let (_, choice) = Tlv::parse(field.content)?;
                    if choice.tag == 0x80 {
                        server_challenge = Some(choice.content.to_vec());
                    }
                }
                0xbe => {
                    let inner = field
                        .unwrap_inner(ber::TAG_OCTET_STRING)
                        .ok_or_else(|| malformed(field.content))?;
                    user_information = match inner.first() {
                        Some(&INITIATE_RESPONSE_TAG) => {
                            let (_, initiate) = InitiateResponse::parse(inner)?;
                            Some(AareUserInformation::Initiate(initiate))
                        }
                        Some(&GLOBAL_CIPHER_INITIATE_RESPONSE_TAG) => {
                            let (_, ciphered) = GlobalCipherInitiateResponse::parse(inner)?;
                            Some(AareUserInformation::Ciphered(ciphered))
                        }
                        Some(&CONFIRMED_SERVICE_ERROR_TAG) => {
                            let (_, error) = ConfirmedServiceError::parse(inner)?;
                            Some(AareUserInformation::ServiceError(error))
                        }
                        _ => return Err(malformed(inner)),
                    };
                }
                _ => {}
            }
        }

        let application_context_name =
            application_context_name.ok_or_else(|| malformed(outer.content))?;
        let result = result.ok_or_else(|| malformed(outer.content))?;

        Ok((
            remaining,
            Self {
                application_context_name,
                result,
                result_source_diagnostic,
                system_title,
                mechanism_name,
                server_challenge,
                user_information,
            },
        ))
    }
}

impl fmt::Display for Aare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AARE({}, {}, {})",
            self.application_context_name, self.result, self.result_source_diagnostic
        )
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;
    use crate::association::Conformance;

    #[test]
    fn test_accepted_roundtrip() {
        let aare = Aare::new_accepted(
            ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(Conformance::DEFAULT_CLIENT, 0x0400),
        );
        let encoded = aare.encode();
        assert_eq!(encoded[0], 0x61);
        // A2 with result 0 (accepted)
        let accepted = [0xa2, 0x03, 0x02, 0x01, 0x00];
        assert!(encoded.windows(accepted.len()).any(|w| w == accepted));

        let (rest, parsed) = Aare::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, aare);
        assert!(parsed.is_accepted());
    }

    #[test]
    fn test_rejected_roundtrip() {
        let aare = Aare::new_rejected(
            ApplicationContextName::LogicalName,
            AssociationResult::RejectedPermanent,
            AcseServiceUserDiagnostics::AuthenticationFailure,
        );
        let encoded = aare.encode();
        let rejected = [0xa2, 0x03, 0x02, 0x01, 0x01];
        assert!(encoded.windows(rejected.len()).any(|w| w == rejected));

        let (_, parsed) = Aare::parse(&encoded).unwrap();
        assert!(!parsed.is_accepted());
        assert_eq!(parsed.result, AssociationResult::RejectedPermanent);
        assert_eq!(
            parsed.result_source_diagnostic,
            AcseServiceUserDiagnostics::AuthenticationFailure
        );
        assert!(parsed.user_information.is_none());
    }

    #[test]
    fn test_hls_fields_roundtrip() {
        let server_title = [0x4d, 0x4d, 0x4d, 0x00, 0x01, 0x23, 0x45, 0x67];
        let mut aare = Aare::new_accepted(
            ApplicationContextName::LogicalNameWithCiphering,
            InitiateResponse::new_ln(
                Conformance::DEFAULT_CLIENT | Conformance::GENERAL_PROTECTION,
                0x1000,
            ),
        );
        aare.system_title = Some(server_title);
        aare.mechanism_name = Some(MechanismName::HighGmac);
        aare.server_challenge = Some(b"ZnVpVK7gAzLS".to_vec());

        let (_, parsed) = Aare::parse(&aare.encode()).unwrap();
        assert_eq!(parsed.system_title, Some(server_title));
        assert_eq!(parsed.mechanism_name, Some(MechanismName::HighGmac));
        assert_eq!(parsed.server_challenge, Some(b"ZnVpVK7gAzLS".to_vec()));
        assert_eq!(parsed, aare);
    }

    #[test]
    fn test_service_error_user_information() {
        let mut aare = Aare::new_rejected(
            ApplicationContextName::LogicalName,
            AssociationResult::RejectedPermanent,
            AcseServiceUserDiagnostics::NoReasonGiven,
        );
        aare.user_information = Some(AareUserInformation::ServiceError(ConfirmedServiceError {
            service: 1,
            error_class: 0,
            error: 2,
        }));

        let (_, parsed) = Aare::parse(&aare.encode()).unwrap();
        assert_eq!(parsed, aare);
    }

    #[test]
    fn test_missing_result_rejected() {
        // An AARE with only a context name is unusable.
        let mut content = Vec::new();
        ber::push_wrapped_tlv(
            &mut content,
            0xa1,
            ber::TAG_OBJECT_IDENTIFIER,
            &ApplicationContextName::LogicalName.oid_bytes(),
        );
        let mut encoded = Vec::new();
        ber::push_tlv(&mut encoded, AARE_TAG, &content);
        assert!(Aare::parse(&encoded).is_err());
    }
}
