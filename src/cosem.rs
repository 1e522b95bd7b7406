//! COSEM object references.
//!
//! The protocol core never interprets objects; it only addresses them. An
//! attribute reference is the `(interface class, logical name, attribute
//! index)` triple that every GET/SET carries; a method reference is the
//! same with a method index. Semantic interpretation of attributes per
//! interface class is a consumer concern and lives outside this crate.

#[cfg(feature = "parse")]
use nom::{number::streaming::be_u16, number::streaming::i8 as nom_i8, IResult};

use crate::obis::ObisCode;

#[cfg(feature = "encode")]
use crate::data::ByteBuffer;
#[cfg(feature = "encode")]
use alloc::vec::Vec;

/// Interface class ids the client itself needs to know about.
pub mod class_id {
    pub const DATA: u16 = 1;
    pub const REGISTER: u16 = 3;
    pub const PROFILE_GENERIC: u16 = 7;
    pub const CLOCK: u16 = 8;
    pub const ASSOCIATION_LN: u16 = 15;
}

/// The current association object of a logical device.
pub const ASSOCIATION_LN_OBJECT: ObisCode = ObisCode::new(0, 0, 40, 0, 0, 255);

/// `reply_to_HLS_authentication` on the Association LN object.
pub const REPLY_TO_HLS_METHOD: i8 = 2;

/// The standard clock object.
pub const CLOCK_OBJECT: ObisCode = ObisCode::new(0, 0, 1, 0, 0, 255);

/// Clock attribute 2, the current date-time.
pub const CLOCK_TIME_ATTRIBUTE: i8 = 2;

/// ProfileGeneric attribute 2, the capture buffer.
pub const PROFILE_BUFFER_ATTRIBUTE: i8 = 2;

/// Reference to one attribute of a COSEM object. 9 bytes on the wire:
/// class id (2, BE), logical name (6), attribute index (1, signed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosemAttribute {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub attribute_id: i8,
}

impl CosemAttribute {
    pub const fn new(class_id: u16, instance_id: ObisCode, attribute_id: i8) -> Self {
        Self { class_id, instance_id, attribute_id }
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, class_id) = be_u16(input)?;
        let (input, instance_id) = ObisCode::parse(input)?;
        let (input, attribute_id) = nom_i8(input)?;
        Ok((input, Self { class_id, instance_id, attribute_id }))
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push_u16(self.class_id);
        buf.extend_from_slice(&self.instance_id.encode());
        buf.push(self.attribute_id as u8);
    }
}

/// Reference to one method of a COSEM object. Same wire layout as
/// [`CosemAttribute`] with a method index in the last byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CosemMethod {
    pub class_id: u16,
    pub instance_id: ObisCode,
    pub method_id: i8,
}

impl CosemMethod {
    pub const fn new(class_id: u16, instance_id: ObisCode, method_id: i8) -> Self {
        Self { class_id, instance_id, method_id }
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, class_id) = be_u16(input)?;
        let (input, instance_id) = ObisCode::parse(input)?;
        let (input, method_id) = nom_i8(input)?;
        Ok((input, Self { class_id, instance_id, method_id }))
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push_u16(self.class_id);
        buf.extend_from_slice(&self.instance_id.encode());
        buf.push(self.method_id as u8);
    }
}
