//! The APDU registry: one closed union over every DLMS PDU this client
//! speaks, dispatched on the leading tag byte.
//!
//! The registry is used in both directions: typed requests serialize
//! through [`Apdu::encode`], and server-originated bytes classify through
//! [`Apdu::from_bytes`]. A tag without a decoder is
//! [`Error::UnknownApdu`], never a parse failure; the caller treats the
//! two differently.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "parse")]
use nom::{
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::action::{ActionRequest, ActionResponse, ACTION_REQUEST_TAG, ACTION_RESPONSE_TAG};
use crate::association::{
    Aare, Aarq, GlobalCipherInitiateRequest, GlobalCipherInitiateResponse, InitiateRequest,
    InitiateResponse, Rlre, Rlrq, AARE_TAG, AARQ_TAG, RLRE_TAG, RLRQ_TAG,
};
use crate::ciphering::{GeneralGlobalCipher, GENERAL_GLOBAL_CIPHER_TAG};
use crate::error::Error;
use crate::get::{GetRequest, GetResponse, GET_REQUEST_TAG, GET_RESPONSE_TAG};
use crate::notification::{DataNotification, DATA_NOTIFICATION_TAG};
use crate::set::{SetRequest, SetResponse, SET_REQUEST_TAG, SET_RESPONSE_TAG};

pub const CONFIRMED_SERVICE_ERROR_TAG: u8 = 0x0e;
pub const EXCEPTION_RESPONSE_TAG: u8 = 0xd8;

use crate::association::initiate::{
    GLOBAL_CIPHER_INITIATE_REQUEST_TAG, GLOBAL_CIPHER_INITIATE_RESPONSE_TAG, INITIATE_REQUEST_TAG,
    INITIATE_RESPONSE_TAG,
};

/// State errors a meter can signal in an ExceptionResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum StateError {
    ServiceNotAllowed = 1,
    ServiceUnknown = 2,
}

/// Service errors a meter can signal in an ExceptionResponse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ServiceError {
    OperationNotPossible = 1,
    ServiceNotSupported = 2,
    OtherReason = 3,
    PduTooLong = 4,
    DecipheringError = 5,
    InvocationCounterError = 6,
}

/// ExceptionResponse (tag 0xD8): the meter cannot serve the request in
/// its current state. When the service error is an invocation-counter
/// error the expected counter value follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExceptionResponse {
    pub state_error: StateError,
    pub service_error: ServiceError,
    pub invocation_counter_data: Option<u32>,
}

impl ExceptionResponse {
    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        fn verify(at: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
            nom::Err::Error(nom::error::Error::new(at, nom::error::ErrorKind::Verify))
        }

        let (input, tag) = nom_u8(input)?;
        if tag != EXCEPTION_RESPONSE_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (input, state) = nom_u8(input)?;
        let state_error = match state {
            1 => StateError::ServiceNotAllowed,
            2 => StateError::ServiceUnknown,
            _ => return Err(verify(input)),
        };
        let (input, service) = nom_u8(input)?;
        let service_error = match service {
            1 => ServiceError::OperationNotPossible,
            2 => ServiceError::ServiceNotSupported,
            3 => ServiceError::OtherReason,
            4 => ServiceError::PduTooLong,
            5 => ServiceError::DecipheringError,
            6 => ServiceError::InvocationCounterError,
            _ => return Err(verify(input)),
        };
        let (input, invocation_counter_data) =
            if service_error == ServiceError::InvocationCounterError {
                let (input, counter) = be_u32(input)?;
                (input, Some(counter))
            } else {
                (input, None)
            };
        Ok((input, Self { state_error, service_error, invocation_counter_data }))
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(7);
        buf.push(EXCEPTION_RESPONSE_TAG);
        buf.push(self.state_error as u8);
        buf.push(self.service_error as u8);
        if let Some(counter) = self.invocation_counter_data {
            buf.extend_from_slice(&counter.to_be_bytes());
        }
        buf
    }
}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.state_error, self.service_error)?;
        if let Some(counter) = self.invocation_counter_data {
            write!(f, " (expected invocation counter {})", counter)?;
        }
        Ok(())
    }
}

/// ConfirmedServiceError (tag 0x0E), carried in rejected AARE user
/// information or standalone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConfirmedServiceError {
    /// Which confirmed service failed (1 = initiateError, ...).
    pub service: u8,
    /// Error class (application-reference, hardware-resource, ...).
    pub error_class: u8,
    pub error: u8,
}

impl ConfirmedServiceError {
    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != CONFIRMED_SERVICE_ERROR_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (input, service) = nom_u8(input)?;
        let (input, error_class) = nom_u8(input)?;
        let (input, error) = nom_u8(input)?;
        Ok((input, Self { service, error_class, error }))
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        alloc::vec![CONFIRMED_SERVICE_ERROR_TAG, self.service, self.error_class, self.error]
    }
}

impl fmt::Display for ConfirmedServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "confirmed service error (service {}, class {}, error {})",
            self.service, self.error_class, self.error
        )
    }
}

/// Every APDU the client can emit or classify.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Apdu {
    Aarq(Aarq),
    Aare(Aare),
    Rlrq(Rlrq),
    Rlre(Rlre),
    InitiateRequest(InitiateRequest),
    InitiateResponse(InitiateResponse),
    GlobalCipherInitiateRequest(GlobalCipherInitiateRequest),
    GlobalCipherInitiateResponse(GlobalCipherInitiateResponse),
    GetRequest(GetRequest),
    GetResponse(GetResponse),
    SetRequest(SetRequest),
    SetResponse(SetResponse),
    ActionRequest(ActionRequest),
    ActionResponse(ActionResponse),
    DataNotification(DataNotification),
    GeneralGlobalCipher(GeneralGlobalCipher),
    ConfirmedServiceError(ConfirmedServiceError),
    ExceptionResponse(ExceptionResponse),
}

impl Apdu {
    /// The leading tag byte of the wire form.
    pub fn tag(&self) -> u8 {
        match self {
            Apdu::Aarq(_) => AARQ_TAG,
            Apdu::Aare(_) => AARE_TAG,
            Apdu::Rlrq(_) => RLRQ_TAG,
            Apdu::Rlre(_) => RLRE_TAG,
            Apdu::InitiateRequest(_) => INITIATE_REQUEST_TAG,
            Apdu::InitiateResponse(_) => INITIATE_RESPONSE_TAG,
            Apdu::GlobalCipherInitiateRequest(_) => GLOBAL_CIPHER_INITIATE_REQUEST_TAG,
            Apdu::GlobalCipherInitiateResponse(_) => GLOBAL_CIPHER_INITIATE_RESPONSE_TAG,
            Apdu::GetRequest(_) => GET_REQUEST_TAG,
            Apdu::GetResponse(_) => GET_RESPONSE_TAG,
            Apdu::SetRequest(_) => SET_REQUEST_TAG,
            Apdu::SetResponse(_) => SET_RESPONSE_TAG,
            Apdu::ActionRequest(_) => ACTION_REQUEST_TAG,
            Apdu::ActionResponse(_) => ACTION_RESPONSE_TAG,
            Apdu::DataNotification(_) => DATA_NOTIFICATION_TAG,
            Apdu::GeneralGlobalCipher(_) => GENERAL_GLOBAL_CIPHER_TAG,
            Apdu::ConfirmedServiceError(_) => CONFIRMED_SERVICE_ERROR_TAG,
            Apdu::ExceptionResponse(_) => EXCEPTION_RESPONSE_TAG,
        }
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Apdu::Aarq(apdu) => apdu.encode(),
            Apdu::Aare(apdu) => apdu.encode(),
            Apdu::Rlrq(apdu) => apdu.encode(),
            Apdu::Rlre(apdu) => apdu.encode(),
            Apdu::InitiateRequest(apdu) => apdu.encode(),
            Apdu::InitiateResponse(apdu) => apdu.encode(),
            Apdu::GlobalCipherInitiateRequest(apdu) => apdu.encode(),
            Apdu::GlobalCipherInitiateResponse(apdu) => apdu.encode(),
            Apdu::GetRequest(apdu) => apdu.encode(),
            Apdu::GetResponse(apdu) => apdu.encode(),
            Apdu::SetRequest(apdu) => apdu.encode(),
            Apdu::SetResponse(apdu) => apdu.encode(),
            Apdu::ActionRequest(apdu) => apdu.encode(),
            Apdu::ActionResponse(apdu) => apdu.encode(),
            Apdu::DataNotification(apdu) => apdu.encode(),
            Apdu::GeneralGlobalCipher(apdu) => apdu.encode(),
            Apdu::ConfirmedServiceError(apdu) => apdu.encode(),
            Apdu::ExceptionResponse(apdu) => apdu.encode(),
        }
    }

    /// Classify and decode one tag-led APDU, returning the residual
    /// bytes.
    #[cfg(feature = "parse")]
    pub fn from_bytes(input: &[u8]) -> Result<(Apdu, &[u8]), Error> {
        let tag = *input.first().ok_or(Error::Malformed)?;
        let result = match tag {
            AARQ_TAG => Aarq::parse(input).map(|(rest, apdu)| (Apdu::Aarq(apdu), rest)),
            AARE_TAG => Aare::parse(input).map(|(rest, apdu)| (Apdu::Aare(apdu), rest)),
            RLRQ_TAG => Rlrq::parse(input).map(|(rest, apdu)| (Apdu::Rlrq(apdu), rest)),
            RLRE_TAG => Rlre::parse(input).map(|(rest, apdu)| (Apdu::Rlre(apdu), rest)),
            INITIATE_REQUEST_TAG => InitiateRequest::parse(input)
                .map(|(rest, apdu)| (Apdu::InitiateRequest(apdu), rest)),
            INITIATE_RESPONSE_TAG => InitiateResponse::parse(input)
                .map(|(rest, apdu)| (Apdu::InitiateResponse(apdu), rest)),
            GLOBAL_CIPHER_INITIATE_REQUEST_TAG => GlobalCipherInitiateRequest::parse(input)
                .map(|(rest, apdu)| (Apdu::GlobalCipherInitiateRequest(apdu), rest)),
            GLOBAL_CIPHER_INITIATE_RESPONSE_TAG => GlobalCipherInitiateResponse::parse(input)
                .map(|(rest, apdu)| (Apdu::GlobalCipherInitiateResponse(apdu), rest)),
            GET_REQUEST_TAG => {
                GetRequest::parse(input).map(|(rest, apdu)| (Apdu::GetRequest(apdu), rest))
            }
            GET_RESPONSE_TAG => {
                GetResponse::parse(input).map(|(rest, apdu)| (Apdu::GetResponse(apdu), rest))
            }
            SET_REQUEST_TAG => {
                SetRequest::parse(input).map(|(rest, apdu)| (Apdu::SetRequest(apdu), rest))
            }
            SET_RESPONSE_TAG => {
                SetResponse::parse(input).map(|(rest, apdu)| (Apdu::SetResponse(apdu), rest))
            }
            ACTION_REQUEST_TAG => {
                ActionRequest::parse(input).map(|(rest, apdu)| (Apdu::ActionRequest(apdu), rest))
            }
            ACTION_RESPONSE_TAG => {
                ActionResponse::parse(input).map(|(rest, apdu)| (Apdu::ActionResponse(apdu), rest))
            }
            DATA_NOTIFICATION_TAG => DataNotification::parse(input)
                .map(|(rest, apdu)| (Apdu::DataNotification(apdu), rest)),
            GENERAL_GLOBAL_CIPHER_TAG => GeneralGlobalCipher::parse(input)
                .map(|(rest, apdu)| (Apdu::GeneralGlobalCipher(apdu), rest)),
            CONFIRMED_SERVICE_ERROR_TAG => ConfirmedServiceError::parse(input)
                .map(|(rest, apdu)| (Apdu::ConfirmedServiceError(apdu), rest)),
            EXCEPTION_RESPONSE_TAG => ExceptionResponse::parse(input)
                .map(|(rest, apdu)| (Apdu::ExceptionResponse(apdu), rest)),
            unknown => return Err(Error::UnknownApdu(unknown)),
        };
        result.map_err(|_| Error::Malformed)
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;
    use crate::association::Conformance;
    use crate::cosem::CosemAttribute;
    use crate::data::Data;
    use crate::get::GetDataResult;
    use crate::notification::LongInvokeIdAndPriority;
    use crate::obis::ObisCode;
    use crate::security::SecurityControl;

    fn roundtrip(apdu: Apdu) {
        let encoded = apdu.encode();
        assert_eq!(encoded[0], apdu.tag());
        let (parsed, rest) = Apdu::from_bytes(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, apdu);
    }

    #[test]
    fn test_registry_roundtrips_every_variant() {
        roundtrip(Apdu::Aarq(Aarq::new_no_security(Conformance::DEFAULT_CLIENT, 0xffff)));
        roundtrip(Apdu::Aare(Aare::new_accepted(
            crate::association::ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(Conformance::DEFAULT_CLIENT, 0x0400),
        )));
        roundtrip(Apdu::Rlrq(Rlrq::default()));
        roundtrip(Apdu::Rlre(Rlre::default()));
        roundtrip(Apdu::InitiateRequest(InitiateRequest::new(
            Conformance::DEFAULT_CLIENT,
            0xffff,
        )));
        roundtrip(Apdu::InitiateResponse(InitiateResponse::new_ln(
            Conformance::DEFAULT_CLIENT,
            0x0400,
        )));
        roundtrip(Apdu::GetRequest(GetRequest::Normal {
            invoke_id: 0xc1,
            attribute: CosemAttribute::new(3, ObisCode::new(1, 0, 1, 8, 0, 255), 2),
            access_selection: None,
        }));
        roundtrip(Apdu::GetResponse(GetResponse::Normal {
            invoke_id: 0xc1,
            result: GetDataResult::Data(Data::DoubleLongUnsigned(1)),
        }));
        roundtrip(Apdu::SetRequest(SetRequest::Normal {
            invoke_id: 0x41,
            attribute: CosemAttribute::new(1, ObisCode::new(0, 0, 96, 1, 0, 255), 2),
            access_selection: None,
            value: Data::Unsigned(1),
        }));
        roundtrip(Apdu::SetResponse(SetResponse::Normal {
            invoke_id: 0x41,
            result: crate::get::DataAccessResult::Success,
        }));
        roundtrip(Apdu::ActionRequest(ActionRequest::Normal {
            invoke_id: 0x41,
            method: crate::cosem::CosemMethod::new(
                crate::cosem::class_id::ASSOCIATION_LN,
                crate::cosem::ASSOCIATION_LN_OBJECT,
                2,
            ),
            parameters: None,
        }));
        roundtrip(Apdu::ActionResponse(ActionResponse::Normal {
            invoke_id: 0x41,
            result: crate::action::ActionResult::Success,
            return_parameters: None,
        }));
        roundtrip(Apdu::DataNotification(DataNotification {
            long_invoke_id: LongInvokeIdAndPriority::new(9),
            date_time: None,
            body: Data::Bool(true),
        }));
        roundtrip(Apdu::GeneralGlobalCipher(GeneralGlobalCipher {
            system_title: [1, 2, 3, 4, 5, 6, 7, 8],
            security_control: SecurityControl::authenticated_and_encrypted(),
            invocation_counter: 1,
            ciphered_text: vec![0u8; 14],
        }));
        roundtrip(Apdu::ConfirmedServiceError(ConfirmedServiceError {
            service: 1,
            error_class: 0,
            error: 1,
        }));
        roundtrip(Apdu::ExceptionResponse(ExceptionResponse {
            state_error: StateError::ServiceNotAllowed,
            service_error: ServiceError::InvocationCounterError,
            invocation_counter_data: Some(0x1000),
        }));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Apdu::from_bytes(&[0x99, 0x00]), Err(Error::UnknownApdu(0x99)));
        assert_eq!(Apdu::from_bytes(&[]), Err(Error::Malformed));
    }

    #[test]
    fn test_truncated_known_tag_is_malformed() {
        assert_eq!(Apdu::from_bytes(&[0xc4, 0x01]), Err(Error::Malformed));
    }

    #[test]
    fn test_exception_response_without_counter() {
        let (apdu, _) = Apdu::from_bytes(&[0xd8, 0x02, 0x03]).unwrap();
        assert_eq!(
            apdu,
            Apdu::ExceptionResponse(ExceptionResponse {
                state_error: StateError::ServiceUnknown,
                service_error: ServiceError::OtherReason,
                invocation_counter_data: None,
            })
        );
    }
}
