//! SET service (write COSEM attributes).
//!
//! Tags 0xC1 (request) and 0xC5 (response). A value too large for the
//! negotiated PDU travels as DataBlock-SA chunks: WithFirstBlock carries
//! the attribute descriptor and block 1, every further chunk is a
//! WithBlock, and the server acknowledges each with a
//! SET-Response-Datablock naming the block number it expects confirmed.
//!
//! Reference: DLMS Green Book Ed. 12, Tables 71-72 and Figure 126.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::cosem::CosemAttribute;
use crate::data::Data;
use crate::get::{AccessSelector, AttributeWithSelection, DataAccessResult};

#[cfg(feature = "parse")]
use crate::data::parse_length;
#[cfg(feature = "parse")]
use crate::get::parse_optional_selection;

#[cfg(feature = "encode")]
use crate::data::{encode_length, ByteBuffer};
#[cfg(feature = "encode")]
use crate::get::encode_optional_selection;

pub const SET_REQUEST_TAG: u8 = 0xc1;
pub const SET_RESPONSE_TAG: u8 = 0xc5;

#[cfg(feature = "parse")]
fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// DataBlock-SA: the chunk framing shared by SET and ACTION block
/// transfer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataBlock {
    pub last_block: bool,
    pub block_number: u32,
    pub raw_data: Vec<u8>,
}

impl DataBlock {
    #[cfg(feature = "parse")]
    pub(crate) fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, last_block) = nom_u8(input)?;
        let (input, block_number) = be_u32(input)?;
        let (input, len) = parse_length(input)?;
        let (input, raw) = take(len)(input)?;
        Ok((
            input,
            Self { last_block: last_block != 0, block_number, raw_data: raw.to_vec() },
        ))
    }

    #[cfg(feature = "encode")]
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.last_block as u8);
        buf.push_u32(self.block_number);
        encode_length(buf, self.raw_data.len());
        buf.extend_from_slice(&self.raw_data);
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SetRequest {
    Normal {
        invoke_id: u8,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
        value: Data,
    },
    WithFirstBlock {
        invoke_id: u8,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
        block: DataBlock,
    },
    WithBlock {
        invoke_id: u8,
        block: DataBlock,
    },
    WithList {
        invoke_id: u8,
        attributes: Vec<AttributeWithSelection>,
        values: Vec<Data>,
    },
}

impl SetRequest {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(SET_REQUEST_TAG);
        match self {
            SetRequest::Normal { invoke_id, attribute, access_selection, value } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                attribute.encode_into(&mut buf);
                encode_optional_selection(&mut buf, access_selection);
                value.encode_into(&mut buf);
            }
            SetRequest::WithFirstBlock { invoke_id, attribute, access_selection, block } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                attribute.encode_into(&mut buf);
                encode_optional_selection(&mut buf, access_selection);
                block.encode_into(&mut buf);
            }
            SetRequest::WithBlock { invoke_id, block } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                block.encode_into(&mut buf);
            }
            SetRequest::WithList { invoke_id, attributes, values } => {
                buf.push(0x04);
                buf.push(*invoke_id);
                encode_length(&mut buf, attributes.len());
                for entry in attributes {
                    entry.attribute.encode_into(&mut buf);
                    encode_optional_selection(&mut buf, &entry.access_selection);
                }
                encode_length(&mut buf, values.len());
                for value in values {
                    value.encode_into(&mut buf);
                }
            }
        }
        buf
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != SET_REQUEST_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, attribute) = CosemAttribute::parse(input)?;
                let (input, access_selection) = parse_optional_selection(input)?;
                let (input, value) = Data::parse(input)?;
                Ok((input, SetRequest::Normal { invoke_id, attribute, access_selection, value }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, attribute) = CosemAttribute::parse(input)?;
                let (input, access_selection) = parse_optional_selection(input)?;
                let (input, block) = DataBlock::parse(input)?;
                Ok((
                    input,
                    SetRequest::WithFirstBlock { invoke_id, attribute, access_selection, block },
                ))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, block) = DataBlock::parse(input)?;
                Ok((input, SetRequest::WithBlock { invoke_id, block }))
            }
            0x04 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut attributes = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, attribute) = CosemAttribute::parse(input)?;
                    let (rest, access_selection) = parse_optional_selection(rest)?;
                    attributes.push(AttributeWithSelection { attribute, access_selection });
                    input = rest;
                }
                let (mut input, count) = parse_length(input)?;
                let mut values = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, value) = Data::parse(input)?;
                    values.push(value);
                    input = rest;
                }
                Ok((input, SetRequest::WithList { invoke_id, attributes, values }))
            }
            _ => Err(tag_error(input)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SetResponse {
    Normal {
        invoke_id: u8,
        result: DataAccessResult,
    },
    DataBlock {
        invoke_id: u8,
        block_number: u32,
    },
    LastDataBlock {
        invoke_id: u8,
        result: DataAccessResult,
        block_number: u32,
    },
    LastDataBlockWithList {
        invoke_id: u8,
        results: Vec<DataAccessResult>,
        block_number: u32,
    },
    WithList {
        invoke_id: u8,
        results: Vec<DataAccessResult>,
    },
}

impl SetResponse {
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(SET_RESPONSE_TAG);
        match self {
            SetResponse::Normal { invoke_id, result } => {
                buf.push(0x01);
                buf.push(*invoke_id);
                buf.push(*result as u8);
            }
            SetResponse::DataBlock { invoke_id, block_number } => {
                buf.push(0x02);
                buf.push(*invoke_id);
                buf.push_u32(*block_number);
            }
            SetResponse::LastDataBlock { invoke_id, result, block_number } => {
                buf.push(0x03);
                buf.push(*invoke_id);
                buf.push(*result as u8);
                buf.push_u32(*block_number);
            }
            SetResponse::LastDataBlockWithList { invoke_id, results, block_number } => {
                buf.push(0x04);
                buf.push(*invoke_id);
                encode_length(&mut buf, results.len());
                for result in results {
                    buf.push(*result as u8);
                }
                buf.push_u32(*block_number);
            }
            SetResponse::WithList { invoke_id, results } => {
                buf.push(0x05);
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
        if tag != SET_RESPONSE_TAG {
            return Err(tag_error(input));
        }
        let (input, choice) = nom_u8(input)?;
        match choice {
            0x01 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, result) = DataAccessResult::parse(input)?;
                Ok((input, SetResponse::Normal { invoke_id, result }))
            }
            0x02 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((input, SetResponse::DataBlock { invoke_id, block_number }))
            }
            0x03 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (input, result) = DataAccessResult::parse(input)?;
                let (input, block_number) = be_u32(input)?;
                Ok((input, SetResponse::LastDataBlock { invoke_id, result, block_number }))
            }
            0x04 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut results = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, result) = DataAccessResult::parse(input)?;
                    results.push(result);
                    input = rest;
                }
                let (input, block_number) = be_u32(input)?;
                Ok((input, SetResponse::LastDataBlockWithList { invoke_id, results, block_number }))
            }
            0x05 => {
                let (input, invoke_id) = nom_u8(input)?;
                let (mut input, count) = parse_length(input)?;
                let mut results = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, result) = DataAccessResult::parse(input)?;
                    results.push(result);
                    input = rest;
                }
                Ok((input, SetResponse::WithList { invoke_id, results }))
            }
            _ => Err(tag_error(input)),
        }
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;
    use crate::obis::ObisCode;

    fn demo_attribute() -> CosemAttribute {
        CosemAttribute::new(1, ObisCode::new(0, 0, 96, 1, 0, 255), 2)
    }

    #[test]
    fn test_request_normal_wire_form() {
        let request = SetRequest::Normal {
            invoke_id: 0xc1,
            attribute: demo_attribute(),
            access_selection: None,
            value: Data::Unsigned(0x12),
        };
        assert_eq!(
            request.encode(),
            [0xc1, 0x01, 0xc1, 0x00, 0x01, 0, 0, 96, 1, 0, 255, 0x02, 0x00, 0x11, 0x12]
        );
    }

    #[test]
    fn test_request_roundtrip() {
        for request in [
            SetRequest::Normal {
                invoke_id: 1,
                attribute: demo_attribute(),
                access_selection: None,
                value: Data::OctetString(vec![1, 2, 3]),
            },
            SetRequest::WithFirstBlock {
                invoke_id: 1,
                attribute: demo_attribute(),
                access_selection: None,
                block: DataBlock { last_block: false, block_number: 1, raw_data: vec![9; 40] },
            },
            SetRequest::WithBlock {
                invoke_id: 1,
                block: DataBlock { last_block: true, block_number: 5, raw_data: vec![7; 10] },
            },
            SetRequest::WithList {
                invoke_id: 1,
                attributes: vec![demo_attribute().into()],
                values: vec![Data::Bool(true)],
            },
        ] {
            let encoded = request.encode();
            let (rest, parsed) = SetRequest::parse(&encoded).unwrap();
            assert_eq!(rest, &[] as &[u8]);
            assert_eq!(parsed, request);
        }
    }

    #[test]
    fn test_datablock_long_raw_data() {
        // 200-byte chunk forces the long length form inside the block.
        let block = DataBlock { last_block: false, block_number: 2, raw_data: vec![0xab; 200] };
        let request = SetRequest::WithBlock { invoke_id: 0x41, block };
        let encoded = request.encode();
        assert_eq!(&encoded[..3], &[0xc1, 0x03, 0x41]);
        // last(1) + block number(4) + 0x81 0xC8 + data
        assert_eq!(encoded[3], 0x00);
        assert_eq!(&encoded[8..10], &[0x81, 0xc8]);
        let (_, parsed) = SetRequest::parse(&encoded).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_response_roundtrip() {
        for response in [
            SetResponse::Normal { invoke_id: 1, result: DataAccessResult::Success },
            SetResponse::DataBlock { invoke_id: 1, block_number: 3 },
            SetResponse::LastDataBlock {
                invoke_id: 1,
                result: DataAccessResult::Success,
                block_number: 5,
            },
            SetResponse::LastDataBlockWithList {
                invoke_id: 1,
                results: vec![DataAccessResult::Success, DataAccessResult::TypeUnmatched],
                block_number: 4,
            },
            SetResponse::WithList {
                invoke_id: 1,
                results: vec![DataAccessResult::Success, DataAccessResult::ReadWriteDenied],
            },
        ] {
            let encoded = response.encode();
            let (rest, parsed) = SetResponse::parse(&encoded).unwrap();
            assert_eq!(rest, &[] as &[u8]);
            assert_eq!(parsed, response);
        }
    }

    #[test]
    fn test_response_datablock_wire_form() {
        let input = [0xc5, 0x02, 0xc1, 0x00, 0x00, 0x00, 0x02];
        let (_, response) = SetResponse::parse(&input).unwrap();
        assert_eq!(response, SetResponse::DataBlock { invoke_id: 0xc1, block_number: 2 });
    }
}
