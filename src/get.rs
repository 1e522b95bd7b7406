//! GET service (read COSEM attributes).
//!
//! Tags 0xC0 (request) and 0xC4 (response); choices Normal / Next /
//! WithList on the request side and Normal / WithDataBlock / WithList on
//! the response side. Long responses arrive as a DataBlock-G sequence:
//! `last-block BOOLEAN, block-number Unsigned32, raw-data OCTET STRING`,
//! acknowledged block by block with GET-Request-Next.
//!
//! Reference: DLMS Green Book Ed. 12, Tables 69-70.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::cosem::CosemAttribute;
use crate::data::Data;

#[cfg(feature = "parse")]
use crate::data::parse_length;

#[cfg(feature = "encode")]
use crate::data::{encode_length, ByteBuffer};

pub const GET_REQUEST_TAG: u8 = 0xc0;
pub const GET_RESPONSE_TAG: u8 = 0xc4;

#[cfg(feature = "parse")]
fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Selective access descriptor: a selector id and its parameters, encoded
/// as a data tree. Selector 1 is the range descriptor
/// (`crate::selective_access::RangeDescriptor`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AccessSelector {
    pub selector: u8,
    pub parameters: Data,
}

#[cfg(feature = "encode")]
impl AccessSelector {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.selector);
        self.parameters.encode_into(buf);
    }
}

#[cfg(feature = "parse")]
pub(crate) fn parse_optional_selection(input: &[u8]) -> IResult<&[u8], Option<AccessSelector>> {
    let (input, present) = nom_u8(input)?;
    if present == 0 {
        return Ok((input, None));
    }
    let (input, selector) = nom_u8(input)?;
    let (input, parameters) = Data::parse(input)?;
    Ok((input, Some(AccessSelector { selector, parameters })))
}

#[cfg(feature = "encode")]
pub(crate) fn encode_optional_selection(buf: &mut Vec<u8>, selection: &Option<AccessSelector>) {
    match selection {
        Some(selector) => {
            buf.push(0x01);
            selector.encode_into(buf);
        }
        None => buf.push(0x00),
    }
}

/// One entry of a GET-Request-With-List.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AttributeWithSelection {
    pub attribute: CosemAttribute,
    pub access_selection: Option<AccessSelector>,
}

impl From<CosemAttribute> for AttributeWithSelection {
    fn from(attribute: CosemAttribute) -> Self {
        Self { attribute, access_selection: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetRequest {
    Normal {
        invoke_id: u8,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
    },
    Next {
        invoke_id: u8,
        block_number: u32,
    },
    WithList {
        invoke_id: u8,
        attributes: Vec<AttributeWithSelection>,
    },
}

impl GetRequest {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(GET_REQUEST_TAG);
        match self {
            GetRequest::Normal { invoke_id, attribute, access_selection } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                attribute.encode_into(&mut buf);
                encode_optional_selection(&mut buf, access_selection);
            }
            GetRequest::Next { invoke_id, block_number } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                buf.push_u32(*block_number);
            }
            GetRequest::WithList { invoke_id, attributes } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                encode_length(&mut buf, attributes.len());
                for entry in attributes {
                    entry.attribute.encode_into(&mut buf);
                    encode_optional_selection(&mut buf, &entry.access_selection);
                }
            }
        }
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != GET_REQUEST_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, attribute) = CosemAttribute::parse(input)?;
                let (input, access_selection) = parse_optional_selection(input)?;
                Ok((input, GetRequest::Normal { invoke_id, attribute, access_selection }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((input, GetRequest::Next { invoke_id, block_number }))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut attributes = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, attribute) = CosemAttribute::parse(input)?;
                    let (rest, access_selection) = parse_optional_selection(rest)?;
                    attributes.push(AttributeWithSelection { attribute, access_selection });
                    input = rest;
                }
                Ok((input, GetRequest::WithList { invoke_id, attributes }))
            }
            _ => Err(tag_error(input)),
        }
    }
}

/// Typed data-access error codes (Blue Book 4.1.8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum DataAccessResult {
    Success = 0,
    HardwareFault = 1,
    TemporaryFailure = 2,
    ReadWriteDenied = 3,
    ObjectUndefined = 4,
    ObjectClassInconsistent = 9,
    ObjectUnavailable = 11,
    TypeUnmatched = 12,
    ScopeOfAccessViolated = 13,
    DataBlockUnavailable = 14,
    LongGetAborted = 15,
    NoLongGetInProgress = 16,
    LongSetAborted = 17,
    NoLongSetInProgress = 18,
    DataBlockNumberInvalid = 19,
    OtherReason = 250,
}

impl DataAccessResult {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Success,
            1 => Self::HardwareFault,
            2 => Self::TemporaryFailure,
            3 => Self::ReadWriteDenied,
            4 => Self::ObjectUndefined,
            9 => Self::ObjectClassInconsistent,
            11 => Self::ObjectUnavailable,
            12 => Self::TypeUnmatched,
            13 => Self::ScopeOfAccessViolated,
            14 => Self::DataBlockUnavailable,
            15 => Self::LongGetAborted,
            16 => Self::NoLongGetInProgress,
            17 => Self::LongSetAborted,
            18 => Self::NoLongSetInProgress,
            19 => Self::DataBlockNumberInvalid,
            250 => Self::OtherReason,
            _ => return None,
        })
    }

    #[cfg(feature = "parse")]
    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (rest, code) = nom_u8(input)?;
        match Self::from_u8(code) {
            Some(result) => Ok((rest, result)),
            None => Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            ))),
        }
    }
}

/// Data or a typed error; the CHOICE used by GET and ACTION results.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetDataResult {
    Data(Data),
    DataAccessError(DataAccessResult),
}

impl GetDataResult {
    #[cfg(feature = "parse")]
    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x00 => {
                let (input, data) = Data::parse(input)?;
                Ok((input, GetDataResult::Data(data)))
            }
            0x01 => {
                let (input, error) = DataAccessResult::parse(input)?;
                Ok((input, GetDataResult::DataAccessError(error)))
            }
            _ => Err(tag_error(input)),
        }
    }

    #[cfg(feature = "encode")]
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            GetDataResult::Data(data) => {
                buf.push(0x00);
                data.encode_into(buf);
            }
            GetDataResult::DataAccessError(error) => {
                buf.push(0x01);
                buf.push(*error as u8);
            }
        }
    }
}

/// Raw block bytes or a typed error; the CHOICE inside DataBlock-G.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetDataBlockResult {
    RawData(Vec<u8>),
    DataAccessError(DataAccessResult),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GetResponse {
    Normal {
        invoke_id: u8,
        result: GetDataResult,
    },
    WithDataBlock {
        invoke_id: u8,
        last_block: bool,
        block_number: u32,
        result: GetDataBlockResult,
    },
    WithList {
        invoke_id: u8,
        results: Vec<GetDataResult>,
    },
}

impl GetResponse {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(GET_RESPONSE_TAG);
        match self {
            GetResponse::Normal { invoke_id, result } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                result.encode_into(&mut buf);
            }
            GetResponse::WithDataBlock { invoke_id, last_block, block_number, result } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                buf.push(*last_block as u8);
                buf.push_u32(*block_number);
                match result {
                    GetDataBlockResult::RawData(raw) => {
                        buf.push(0x00);
                        encode_length(&mut buf, raw.len());
                        buf.extend_from_slice(raw);
                    }
                    GetDataBlockResult::DataAccessError(error) => {
                        buf.push(0x01);
                        buf.push(*error as u8);
                    }
                }
            }
            GetResponse::WithList { invoke_id, results } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                encode_length(&mut buf, results.len());
                for result in results {
                    result.encode_into(&mut buf);
                }
            }
        }
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != GET_RESPONSE_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, result) = GetDataResult::parse(input)?;
                Ok((input, GetResponse::Normal { invoke_id, result }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, last_block) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                let (input, result_choice) = nom_u8(input)?;
                let (input, result) = match result_choice {
                    0x00 => {
                        let (input, len) = parse_length(input)?;
                        let (input, raw) = take(len)(input)?;
                        (input, GetDataBlockResult::RawData(raw.to_vec()))
                    }
                    0x01 => {
                        let (input, error) = DataAccessResult::parse(input)?;
                        (input, GetDataBlockResult::DataAccessError(error))
                    }
                    _ => return Err(tag_error(input)),
                };
                Ok((
                    input,
                    GetResponse::WithDataBlock {
                        invoke_id,
                        last_block: last_block != 0,
                        block_number,
                        result,
                    },
                ))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut results = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, result) = GetDataResult::parse(input)?;
                    results.push(result);
                    input = rest;
                }
                Ok((input, GetResponse::WithList { invoke_id, results }))
            }
            _ => Err(tag_error(input)),
        }
    }
}
