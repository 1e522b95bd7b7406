//! ACTION service (invoke COSEM methods).
//!
//! Tags 0xC3 (request) and 0xC7 (response). The normal response carries a
//! typed action-result and an optional return parameter; oversized
//! parameters travel as pblocks with the same DataBlock-SA framing as the
//! SET service.
//!
//! Reference: DLMS Green Book Ed. 12, Tables 73-74.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::cosem::CosemMethod;
use crate::data::Data;
use crate::get::GetDataResult;
use crate::set::DataBlock;

#[cfg(feature = "parse")]
use crate::data::parse_length;

#[cfg(feature = "encode")]
use crate::data::{encode_length, ByteBuffer};

pub const ACTION_REQUEST_TAG: u8 = 0xc3;
pub const ACTION_RESPONSE_TAG: u8 = 0xc7;

#[cfg(feature = "parse")]
fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Typed action result codes (Blue Book 4.1.8.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ActionResult {
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
    LongActionAborted = 15,
    NoLongActionInProgress = 16,
    OtherReason = 250,
}

impl ActionResult {
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
            15 => Self::LongActionAborted,
            16 => Self::NoLongActionInProgress,
            250 => Self::OtherReason,
            _ => return None,
        })
    }

    #[cfg(feature = "parse")]
    fn parse(input: &[u8]) -> IResult<&[u8], Self> {
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

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ActionRequest {
    Normal {
        invoke_id: u8,
        method: CosemMethod,
        parameters: Option<Data>,
    },
    NextPBlock {
        invoke_id: u8,
        block_number: u32,
    },
    WithList {
        invoke_id: u8,
        methods: Vec<CosemMethod>,
        parameters: Vec<Data>,
    },
}

impl ActionRequest {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(ACTION_REQUEST_TAG);
        match self {
            ActionRequest::Normal { invoke_id, method, parameters } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                method.encode_into(&mut buf);
                match parameters {
                    Some(data) => {
                        buf.push(0x01);
                        data.encode_into(&mut buf);
                    }
                    None => buf.push(0x00),
                }
            }
            ActionRequest::NextPBlock { invoke_id, block_number } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                buf.push_u32(*block_number);
            }
            ActionRequest::WithList { invoke_id, methods, parameters } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                encode_length(&mut buf, methods.len());
                for method in methods {
                    method.encode_into(&mut buf);
                }
                encode_length(&mut buf, parameters.len());
                for parameter in parameters {
                    parameter.encode_into(&mut buf);
                }
            }
        }
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != ACTION_REQUEST_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, method) = CosemMethod::parse(input)?;
                let (input, present) = nom_u8(input)?;
                let (input, parameters) = if present != 0 {
                    let (input, data) = Data::parse(input)?;
                    (input, Some(data))
                } else {
                    (input, None)
                };
                Ok((input, ActionRequest::Normal { invoke_id, method, parameters }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((input, ActionRequest::NextPBlock { invoke_id, block_number }))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut methods = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, method) = CosemMethod::parse(input)?;
                    methods.push(method);
                    input = rest;
                }
                let (mut input, count) = parse_length(input)?;
                let mut parameters = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, parameter) = Data::parse(input)?;
                    parameters.push(parameter);
                    input = rest;
                }
                Ok((input, ActionRequest::WithList { invoke_id, methods, parameters }))
            }
            _ => Err(tag_error(input)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ActionResponse {
    Normal {
        invoke_id: u8,
        result: ActionResult,
        return_parameters: Option<GetDataResult>,
    },
    WithPBlock {
        invoke_id: u8,
        block: DataBlock,
    },
    WithList {
        invoke_id: u8,
        results: Vec<ActionResult>,
    },
}

impl ActionResponse {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(ACTION_RESPONSE_TAG);
        match self {
            ActionResponse::Normal { invoke_id, result, return_parameters } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                buf.push(*result as u8);
                match return_parameters {
                    Some(parameters) => {
                        buf.push(0x01);
                        parameters.encode_into(&mut buf);
                    }
                    None => buf.push(0x00),
                }
            }
            ActionResponse::WithPBlock { invoke_id, block } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                block.encode_into(&mut buf);
            }
            ActionResponse::WithList { invoke_id, results } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                encode_length(&mut buf, results.len());
                for result in results {
                    buf.push(*result as u8);
                }
            }
        }
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != ACTION_RESPONSE_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, result) = ActionResult::parse(input)?;
                let (input, present) = nom_u8(input)?;
                let (input, return_parameters) = if present != 0 {
                    let (input, parameters) = GetDataResult::parse(input)?;
                    (input, Some(parameters))
                } else {
                    (input, None)
                };
                Ok((input, ActionResponse::Normal { invoke_id, result, return_parameters }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, block) = DataBlock::parse(input)?;
                Ok((input, ActionResponse::WithPBlock { invoke_id, block }))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut results = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, result) = ActionResult::parse(input)?;
                    results.push(result);
                    input = rest;
                }
                Ok((input, ActionResponse::WithList { invoke_id, results }))
            }
            _ => Err(tag_error(input)),
        }
    }
}
