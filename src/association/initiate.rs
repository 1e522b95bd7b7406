//! xDLMS Initiate APDUs carried in AARQ/AARE user information, plus the
//! global-cipher variants wrapping them on ciphered associations.
//!
//! Mixed encoding: the fields are A-XDR, but the conformance block keeps
//! its BER TLV (`5F 1F 04`). InitiateRequest is tag 0x01, InitiateResponse
//! tag 0x08; the ciphered wrappers are tags 0x21 and 0x28.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    number::streaming::{be_u16, be_u32, u8 as nom_u8},
    IResult,
};

use super::{Conformance, DLMS_VERSION, VAA_NAME_LN};
use crate::security::SecurityControl;

pub const INITIATE_REQUEST_TAG: u8 = 0x01;
pub const INITIATE_RESPONSE_TAG: u8 = 0x08;
pub const GLOBAL_CIPHER_INITIATE_REQUEST_TAG: u8 = 0x21;
pub const GLOBAL_CIPHER_INITIATE_RESPONSE_TAG: u8 = 0x28;

#[cfg(feature = "parse")]
fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateRequest {
    pub dedicated_key: Option<Vec<u8>>,
    pub response_allowed: bool,
    pub proposed_quality_of_service: Option<u8>,
    pub proposed_dlms_version: u8,
    pub proposed_conformance: Conformance,
    pub client_max_receive_pdu_size: u16,
}

impl InitiateRequest {
    pub fn new(proposed_conformance: Conformance, client_max_receive_pdu_size: u16) -> Self {
        Self {
            dedicated_key: None,
            response_allowed: true,
            proposed_quality_of_service: None,
            proposed_dlms_version: DLMS_VERSION,
            proposed_conformance,
            client_max_receive_pdu_size,
        }
    }

    pub fn with_dedicated_key(mut self, dedicated_key: Vec<u8>) -> Self {
        self.dedicated_key = Some(dedicated_key);
        self
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(INITIATE_REQUEST_TAG);
        match &self.dedicated_key {
            Some(key) => {
                buf.push(0x01);
                buf.push(key.len() as u8);
                buf.extend_from_slice(key);
            }
            None => buf.push(0x00),
        }
        // response-allowed defaults to true; a zero presence byte keeps
        // the default.
        if self.response_allowed {
            buf.push(0x00);
        } else {
            buf.push(0x01);
            buf.push(0x00);
        }
        match self.proposed_quality_of_service {
            Some(qos) => {
                buf.push(0x01);
                buf.push(qos);
            }
            None => buf.push(0x00),
        }
        buf.push(self.proposed_dlms_version);
        self.proposed_conformance.encode_tlv(&mut buf);
        buf.extend_from_slice(&self.client_max_receive_pdu_size.to_be_bytes());
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != INITIATE_REQUEST_TAG {
            return Err(tag_error(input));
        }
        let (input, key_present) = nom_u8(input)?;
        let (input, dedicated_key) = if key_present != 0 {
            let (input, len) = nom_u8(input)?;
            let (input, key) = take(len as usize)(input)?;
            (input, Some(key.to_vec()))
        } else {
            (input, None)
        };
        let (input, response_present) = nom_u8(input)?;
        let (input, response_allowed) = if response_present != 0 {
            let (input, value) = nom_u8(input)?;
            (input, value != 0)
        } else {
            (input, true)
        };
        let (input, qos_present) = nom_u8(input)?;
        let (input, proposed_quality_of_service) = if qos_present != 0 {
            let (input, qos) = nom_u8(input)?;
            (input, Some(qos))
        } else {
            (input, None)
        };
        let (input, proposed_dlms_version) = nom_u8(input)?;
        let (input, proposed_conformance) = Conformance::parse_tlv(input)?;
        let (input, client_max_receive_pdu_size) = be_u16(input)?;

        Ok((
            input,
            Self {
                dedicated_key,
                response_allowed,
                proposed_quality_of_service,
                proposed_dlms_version,
                proposed_conformance,
                client_max_receive_pdu_size,
            },
        ))
    }
}

impl fmt::Display for InitiateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateRequest(v{}, conformance {}, max pdu {})",
            self.proposed_dlms_version, self.proposed_conformance, self.client_max_receive_pdu_size
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateResponse {
    pub negotiated_quality_of_service: Option<u8>,
    pub negotiated_dlms_version: u8,
    pub negotiated_conformance: Conformance,
    pub server_max_receive_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn new_ln(negotiated_conformance: Conformance, server_max_receive_pdu_size: u16) -> Self {
        Self {
            negotiated_quality_of_service: None,
            negotiated_dlms_version: DLMS_VERSION,
            negotiated_conformance,
            server_max_receive_pdu_size,
            vaa_name: VAA_NAME_LN,
        }
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(INITIATE_RESPONSE_TAG);
        match self.negotiated_quality_of_service {
            Some(qos) => {
                buf.push(0x01);
                buf.push(qos);
            }
            None => buf.push(0x00),
        }
        buf.push(self.negotiated_dlms_version);
        self.negotiated_conformance.encode_tlv(&mut buf);
        buf.extend_from_slice(&self.server_max_receive_pdu_size.to_be_bytes());
        buf.extend_from_slice(&self.vaa_name.to_be_bytes());
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != INITIATE_RESPONSE_TAG {
            return Err(tag_error(input));
        }
        let (input, qos_present) = nom_u8(input)?;
        let (input, negotiated_quality_of_service) = if qos_present != 0 {
            let (input, qos) = nom_u8(input)?;
            (input, Some(qos))
        } else {
            (input, None)
        };
        let (input, negotiated_dlms_version) = nom_u8(input)?;
        let (input, negotiated_conformance) = Conformance::parse_tlv(input)?;
        let (input, server_max_receive_pdu_size) = be_u16(input)?;
        let (input, vaa_name) = be_u16(input)?;

        Ok((
            input,
            Self {
                negotiated_quality_of_service,
                negotiated_dlms_version,
                negotiated_conformance,
                server_max_receive_pdu_size,
                vaa_name,
            },
        ))
    }
}

impl fmt::Display for InitiateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InitiateResponse(v{}, conformance {}, max pdu {})",
            self.negotiated_dlms_version,
            self.negotiated_conformance,
            self.server_max_receive_pdu_size
        )
    }
}

/// InitiateRequest ciphered under the global key, used inside a ciphered
/// AARQ. Payload layout matches the general-glo-cipher content without a
/// system title (it travels in the calling-AP-title field instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalCipherInitiateRequest {
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub ciphered_text: Vec<u8>,
}

/// The ciphered InitiateResponse inside a ciphered AARE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalCipherInitiateResponse {
    pub security_control: SecurityControl,
    pub invocation_counter: u32,
    pub ciphered_text: Vec<u8>,
}

macro_rules! cipher_initiate_impl {
    ($name:ident, $tag:expr) => {
        impl $name {
            pub const TAG: u8 = $tag;

            #[cfg(feature = "encode")]
            pub fn encode(&self) -> Vec<u8> {
                let mut buf = Vec::new();
                buf.push(Self::TAG);
                crate::data::encode_length(&mut buf, 1 + 4 + self.ciphered_text.len());
                buf.push(self.security_control.to_byte());
                buf.extend_from_slice(&self.invocation_counter.to_be_bytes());
                buf.extend_from_slice(&self.ciphered_text);
                buf
            }

            #[cfg(feature = "parse")]
            pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
                let (input, tag) = nom_u8(input)?;
                if tag != Self::TAG {
                    return Err(tag_error(input));
                }
                let (input, content_len) = crate::data::parse_length(input)?;
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
                        security_control,
                        invocation_counter,
                        ciphered_text: ciphered.to_vec(),
                    },
                ))
            }
        }
    };
}

cipher_initiate_impl!(GlobalCipherInitiateRequest, GLOBAL_CIPHER_INITIATE_REQUEST_TAG);
cipher_initiate_impl!(GlobalCipherInitiateResponse, GLOBAL_CIPHER_INITIATE_RESPONSE_TAG);

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_form() {
        let request = InitiateRequest::new(Conformance::from_bytes([0x00, 0x7e, 0x1f]), 1200);
        assert_eq!(
            request.encode(),
            [0x01, 0x00, 0x00, 0x00, 0x06, 0x5f, 0x1f, 0x04, 0x00, 0x00, 0x7e, 0x1f, 0x04, 0xb0]
        );
    }

    #[test]
    fn test_request_roundtrip() {
        for request in [
            InitiateRequest::new(Conformance::DEFAULT_CLIENT, 0xffff),
            InitiateRequest::new(Conformance::DEFAULT_CLIENT, 1024)
                .with_dedicated_key(vec![0u8; 16]),
        ] {
            let encoded = request.encode();
            let (rest, parsed) = InitiateRequest::parse(&encoded).unwrap();
            assert_eq!(rest, &[] as &[u8]);
            assert_eq!(parsed, request);
        }
    }

    #[test]
    fn test_response_wire_form() {
        let response = InitiateResponse::new_ln(Conformance::from_bytes([0x00, 0x50, 0x1f]), 500);
        assert_eq!(
            response.encode(),
            [0x08, 0x00, 0x06, 0x5f, 0x1f, 0x04, 0x00, 0x00, 0x50, 0x1f, 0x01, 0xf4, 0x00, 0x07]
        );
    }

    #[test]
    fn test_response_roundtrip() {
        let response = InitiateResponse::new_ln(Conformance::DEFAULT_CLIENT, 0x0400);
        let encoded = response.encode();
        let (rest, parsed) = InitiateResponse::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, response);
        assert_eq!(parsed.vaa_name, VAA_NAME_LN);
    }

    #[test]
    fn test_ciphered_initiate_roundtrip() {
        let request = GlobalCipherInitiateRequest {
            security_control: SecurityControl::authenticated_and_encrypted(),
            invocation_counter: 3,
            ciphered_text: vec![0xaa; 20],
        };
        let encoded = request.encode();
        assert_eq!(encoded[0], 0x21);
        let (rest, parsed) = GlobalCipherInitiateRequest::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, request);

        let response = GlobalCipherInitiateResponse {
            security_control: SecurityControl::authenticated_and_encrypted(),
            invocation_counter: 8,
            ciphered_text: vec![0xbb; 17],
        };
        let encoded = response.encode();
        assert_eq!(encoded[0], 0x28);
        let (_, parsed) = GlobalCipherInitiateResponse::parse(&encoded).unwrap();
        assert_eq!(parsed, response);
    }
}
