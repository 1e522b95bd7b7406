//! DLMS-over-TCP/UDP wrapper framing.
//!
//! Every APDU on a wrapper transport is prefixed by an 8-byte header of
//! four big-endian u16 fields: protocol version (0x0001), source wPort,
//! destination wPort, payload length. The wPorts address application
//! entities inside the physical endpoints (client SAP / logical device).

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{number::streaming::be_u16, IResult};

use crate::error::Error;

pub const WRAPPER_VERSION: u16 = 0x0001;
pub const WRAPPER_HEADER_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WrapperHeader {
    pub version: u16,
    pub source_wport: u16,
    pub destination_wport: u16,
    pub length: u16,
}

impl WrapperHeader {
    pub const fn new(source_wport: u16, destination_wport: u16, length: u16) -> Self {
        Self { version: WRAPPER_VERSION, source_wport, destination_wport, length }
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u16(input)?;
        if version != WRAPPER_VERSION {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            )));
        }
        let (input, source_wport) = be_u16(input)?;
        let (input, destination_wport) = be_u16(input)?;
        let (input, length) = be_u16(input)?;
        Ok((input, Self { version, source_wport, destination_wport, length }))
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> [u8; WRAPPER_HEADER_LENGTH] {
        let mut buf = [0u8; WRAPPER_HEADER_LENGTH];
        buf[0..2].copy_from_slice(&self.version.to_be_bytes());
        buf[2..4].copy_from_slice(&self.source_wport.to_be_bytes());
        buf[4..6].copy_from_slice(&self.destination_wport.to_be_bytes());
        buf[6..8].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/// Prefix `payload` with its wrapper header.
#[cfg(feature = "encode")]
pub fn wrap(source_wport: u16, destination_wport: u16, payload: &[u8]) -> Vec<u8> {
    let header = WrapperHeader::new(source_wport, destination_wport, payload.len() as u16);
    let mut buf = Vec::with_capacity(WRAPPER_HEADER_LENGTH + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Split one complete wrapper message into header and payload. The
/// header length must match the body exactly; partial-read handling
/// belongs to the transport, not here.
#[cfg(feature = "parse")]
pub fn unwrap(message: &[u8]) -> Result<(WrapperHeader, &[u8]), Error> {
    let (body, header) = WrapperHeader::parse(message).map_err(|_| Error::Malformed)?;
    if body.len() != header.length as usize {
        return Err(Error::Malformed);
    }
    Ok((header, body))
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_form() {
        // Public client (16) to management logical device (1), 11 bytes.
        let header = WrapperHeader::new(16, 1, 11);
        assert_eq!(header.encode(), [0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x0b]);
    }

    #[test]
    fn test_wrap_roundtrip() {
        let payload = [0xc0, 0x01, 0xc1, 0x00, 0x0f, 0x00, 0x00, 0x00, 0x2b, 0x01, 0x00];
        let message = wrap(16, 1, &payload);
        assert_eq!(message.len(), 8 + payload.len());

        let (header, body) = unwrap(&message).unwrap();
        assert_eq!(header.source_wport, 16);
        assert_eq!(header.destination_wport, 1);
        assert_eq!(header.length, payload.len() as u16);
        assert_eq!(body, payload);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut message = wrap(16, 1, &[1, 2, 3]);
        message.truncate(message.len() - 1);
        assert_eq!(unwrap(&message), Err(Error::Malformed));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut message = wrap(16, 1, &[1]);
        message[1] = 0x02;
        assert_eq!(unwrap(&message), Err(Error::Malformed));
    }
}
