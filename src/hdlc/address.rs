//! HDLC address fields.
//!
//! Client addresses are one byte. Server addresses carry a logical part
//! (the addressable entity inside the device) and an optional physical
//! part (the device on a multi-drop), each 7 or 14 bits wide. Every byte
//! holds 7 address bits shifted left; the low bit marks the final byte of
//! the field, which is why a field can be 1, 2 or 4 bytes but never 3.

use crate::error::Error;

#[cfg(feature = "encode")]
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HdlcAddress {
    pub logical: u16,
    pub physical: Option<u16>,
}

impl HdlcAddress {
    /// A client address; always encoded on one byte.
    pub const fn client(address: u8) -> Self {
        Self { logical: address as u16, physical: None }
    }

    pub const fn server(logical: u16, physical: Option<u16>) -> Self {
        Self { logical, physical }
    }

    fn wide(&self) -> bool {
        self.logical > 0x7f || self.physical.map_or(false, |physical| physical > 0x7f)
    }

    /// Number of bytes this address occupies on the wire.
    pub fn length(&self) -> usize {
        match (self.physical.is_some(), self.wide()) {
            (false, false) => 1,
            (false, true) => 2,
            (true, false) => 2,
            (true, true) => 4,
        }
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let wide = self.wide();
        let push_part = |buf: &mut Vec<u8>, part: u16, terminate: bool| {
            if wide {
                buf.push(((part >> 7) as u8 & 0x7f) << 1);
                buf.push((((part & 0x7f) as u8) << 1) | terminate as u8);
            } else {
                buf.push((((part & 0x7f) as u8) << 1) | terminate as u8);
            }
        };
        match self.physical {
            Some(physical) => {
                push_part(buf, self.logical, false);
                push_part(buf, physical, true);
            }
            None => push_part(buf, self.logical, true),
        }
    }

    /// Parse one address field; the terminator bit decides its width.
    pub fn parse(input: &[u8]) -> Result<(&[u8], Self), Error> {
        let mut length = None;
        for (index, byte) in input.iter().take(4).enumerate() {
            if byte & 0x01 != 0 {
                length = Some(index + 1);
                break;
            }
        }
        let length = length.ok_or(Error::Malformed)?;
        let bytes = &input[..length];
        let rest = &input[length..];

        let address = match length {
            1 => Self { logical: (bytes[0] >> 1) as u16, physical: None },
            2 => Self {
                logical: (bytes[0] >> 1) as u16,
                physical: Some((bytes[1] >> 1) as u16),
            },
            4 => Self {
                logical: (((bytes[0] >> 1) as u16) << 7) | (bytes[1] >> 1) as u16,
                physical: Some((((bytes[2] >> 1) as u16) << 7) | (bytes[3] >> 1) as u16),
            },
            _ => return Err(Error::Malformed),
        };
        Ok((rest, address))
    }
}
