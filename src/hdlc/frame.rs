//! HDLC frame and field codecs.
//!
//! ```text
//! 7E | format(2) | dest(1-4) | src(1-4) | control(1) | HCS(2) |
//!      information(n) | FCS(2) | 7E
//! ```
//!
//! The HCS is present only when an information field is. The format field
//! is `1010 | segmentation | length(11)`; the length counts everything
//! between (excluding) the flags.

use alloc::vec::Vec;

use super::address::HdlcAddress;
use super::fcs::{fcs16, fcs16_bytes};
use crate::error::Error;

pub const HDLC_FLAG: u8 = 0x7e;

/// Poll/final bit inside the control field.
const PF_BIT: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Set Normal Response Mode: open the link.
    Snrm,
    /// Unnumbered acknowledgement.
    Ua,
    /// Disconnect.
    Disc,
    /// Disconnected mode: the peer refuses the exchange.
    Dm,
    /// Frame reject.
    FrameReject,
    /// Unnumbered information: payload without sequencing.
    UnnumberedInformation { final_bit: bool },
    /// Receive ready: acknowledge up to `nr`.
    ReceiveReady { nr: u8 },
    /// Receive not ready.
    ReceiveNotReady { nr: u8 },
    /// Reject: ask for retransmission from `nr`.
    Reject { nr: u8 },
    /// Numbered information frame.
    Information { ns: u8, nr: u8, final_bit: bool },
}

impl Control {
    pub fn to_byte(self) -> u8 {
        match self {
            Control::Snrm => 0x83 | PF_BIT,
            Control::Ua => 0x63 | PF_BIT,
            Control::Disc => 0x43 | PF_BIT,
            Control::Dm => 0x0f | PF_BIT,
            Control::FrameReject => 0x87 | PF_BIT,
            Control::UnnumberedInformation { final_bit } => {
                0x03 | if final_bit { PF_BIT } else { 0 }
            }
            Control::ReceiveReady { nr } => 0x01 | PF_BIT | (nr << 5),
            Control::ReceiveNotReady { nr } => 0x05 | PF_BIT | (nr << 5),
            Control::Reject { nr } => 0x09 | PF_BIT | (nr << 5),
            Control::Information { ns, nr, final_bit } => {
                (ns << 1) | (nr << 5) | if final_bit { PF_BIT } else { 0 }
            }
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, Error> {
        if byte & 0x01 == 0 {
            return Ok(Control::Information {
                ns: (byte >> 1) & 0x07,
                nr: (byte >> 5) & 0x07,
                final_bit: byte & PF_BIT != 0,
            });
        }
        if byte & 0x02 == 0 {
            let nr = (byte >> 5) & 0x07;
            return match byte & 0x0f {
                0x01 => Ok(Control::ReceiveReady { nr }),
                0x05 => Ok(Control::ReceiveNotReady { nr }),
                0x09 => Ok(Control::Reject { nr }),
                _ => Err(Error::Malformed),
            };
        }
        match byte & !PF_BIT {
            0x83 => Ok(Control::Snrm),
            0x63 => Ok(Control::Ua),
            0x43 => Ok(Control::Disc),
            0x0f => Ok(Control::Dm),
            0x87 => Ok(Control::FrameReject),
            0x03 => Ok(Control::UnnumberedInformation { final_bit: byte & PF_BIT != 0 }),
            _ => Err(Error::Malformed),
        }
    }

    /// Whether a frame with this control field carries an information
    /// field (and therefore an HCS).
    fn has_information(self, information_len: usize) -> bool {
        match self {
            Control::Information { .. } | Control::UnnumberedInformation { .. } => true,
            // SNRM and UA may carry a negotiation parameter field.
            Control::Snrm | Control::Ua => information_len > 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HdlcFrame {
    pub destination: HdlcAddress,
    pub source: HdlcAddress,
    pub control: Control,
    pub segmented: bool,
    pub information: Vec<u8>,
}

impl HdlcFrame {
    pub fn new(destination: HdlcAddress, source: HdlcAddress, control: Control) -> Self {
        Self { destination, source, control, segmented: false, information: Vec::new() }
    }

    pub fn with_information(
        destination: HdlcAddress,
        source: HdlcAddress,
        control: Control,
        segmented: bool,
        information: Vec<u8>,
    ) -> Self {
        Self { destination, source, control, segmented, information }
    }

    /// Value of the 11-bit length field: the frame minus its flags.
    #[cfg(feature = "encode")]
    fn frame_length(&self) -> usize {
        let hcs = if self.control.has_information(self.information.len()) { 2 } else { 0 };
        2 + self.destination.length() + self.source.length() + 1 + hcs + self.information.len() + 2
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let length = self.frame_length();
        let mut format = 0xa000u16 | (length as u16 & 0x07ff);
        if self.segmented {
            format |= 0x0800;
        }

        let mut content = Vec::with_capacity(length);
        content.extend_from_slice(&format.to_be_bytes());
        self.destination.encode_into(&mut content);
        self.source.encode_into(&mut content);
        content.push(self.control.to_byte());
        if self.control.has_information(self.information.len()) {
            let hcs = fcs16_bytes(&content);
            content.extend_from_slice(&hcs);
            content.extend_from_slice(&self.information);
        }
        let fcs = fcs16_bytes(&content);
        content.extend_from_slice(&fcs);

        let mut buf = Vec::with_capacity(length + 2);
        buf.push(HDLC_FLAG);
        buf.extend_from_slice(&content);
        buf.push(HDLC_FLAG);
        buf
    }

    /// Parse one complete flag-delimited frame. The caller has already
    /// located the frame boundaries in its receive buffer.
    pub fn parse(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < 9 || frame[0] != HDLC_FLAG || frame[frame.len() - 1] != HDLC_FLAG {
            return Err(Error::Malformed);
        }
        let content = &frame[1..frame.len() - 1];

        let format = u16::from_be_bytes([content[0], content[1]]);
        if format & 0xf000 != 0xa000 {
            return Err(Error::Malformed);
        }
        let segmented = format & 0x0800 != 0;
        let length = (format & 0x07ff) as usize;
        if length != content.len() {
            return Err(Error::Malformed);
        }

        let (rest, destination) = HdlcAddress::parse(&content[2..])?;
        let (rest, source) = HdlcAddress::parse(rest)?;
        let control = Control::from_byte(*rest.first().ok_or(Error::Malformed)?)?;
        let after_control = &rest[1..];

        let header_len = content.len() - after_control.len();
        let information = if after_control.len() > 2 {
            // HCS(2) ... information ... FCS(2)
            if after_control.len() < 4 {
                return Err(Error::Malformed);
            }
            let hcs = u16::from_le_bytes([after_control[0], after_control[1]]);
            if fcs16(&content[..header_len]) != hcs {
                return Err(Error::Malformed);
            }
            after_control[2..after_control.len() - 2].to_vec()
        } else if after_control.len() == 2 {
            Vec::new()
        } else {
            return Err(Error::Malformed);
        };

        let fcs = u16::from_le_bytes([
            content[content.len() - 2],
            content[content.len() - 1],
        ]);
        if fcs16(&content[..content.len() - 2]) != fcs {
            return Err(Error::Malformed);
        }

        Ok(Self { destination, source, control, segmented, information })
    }
}

#[cfg(all(test, feature = "encode"))]
mod tests {
    use super::*;

    fn server() -> HdlcAddress {
        HdlcAddress::server(1, Some(17))
    }

    fn client() -> HdlcAddress {
        HdlcAddress::client(16)
    }

    #[test]
    fn test_control_byte_values() {
        assert_eq!(Control::Snrm.to_byte(), 0x93);
        assert_eq!(Control::Ua.to_byte(), 0x73);
        assert_eq!(Control::Disc.to_byte(), 0x53);
        assert_eq!(Control::ReceiveReady { nr: 3 }.to_byte(), 0x71);
        assert_eq!(
            Control::Information { ns: 0, nr: 0, final_bit: true }.to_byte(),
            0x10
        );
        assert_eq!(
            Control::Information { ns: 2, nr: 3, final_bit: true }.to_byte(),
            0x74
        );
    }

    #[test]
    fn test_control_byte_roundtrip() {
        for control in [
            Control::Snrm,
            Control::Ua,
            Control::Disc,
            Control::Dm,
            Control::FrameReject,
            Control::UnnumberedInformation { final_bit: true },
            Control::ReceiveReady { nr: 5 },
            Control::ReceiveNotReady { nr: 2 },
            Control::Reject { nr: 7 },
            Control::Information { ns: 6, nr: 1, final_bit: true },
        ] {
            assert_eq!(Control::from_byte(control.to_byte()).unwrap(), control);
        }
    }

    #[test]
    fn test_snrm_wire_form() {
        // Public client 16 opening server 1/physical 17.
        let frame = HdlcFrame::new(server(), client(), Control::Snrm);
        assert_eq!(
            frame.encode(),
            [0x7e, 0xa0, 0x08, 0x02, 0x23, 0x21, 0x93, 0xbd, 0x64, 0x7e]
        );
    }

    #[test]
    fn test_ua_with_negotiation_parses() {
        // Captured UA answering the SNRM above; information carries the
        // negotiated parameter group.
        let raw: Vec<u8> = [
            0x7e, 0xa0, 0x1f, 0x21, 0x02, 0x23, 0x73, 0xe6, 0xc7, 0x81, 0x80, 0x12, 0x05, 0x01,
            0x9a, 0x06, 0x01, 0x9a, 0x07, 0x04, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00,
            0x00, 0x01, 0xcc, 0xa2, 0x7e,
        ]
        .to_vec();
        let frame = HdlcFrame::parse(&raw).unwrap();

        assert_eq!(frame.control, Control::Ua);
        assert_eq!(frame.destination, HdlcAddress::client(16));
        assert_eq!(frame.source, HdlcAddress::server(1, Some(17)));
        assert!(!frame.segmented);
        assert_eq!(frame.information[..3], [0x81, 0x80, 0x12]);

        // and our encoder regenerates it byte for byte
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn test_information_frame_roundtrip() {
        let frame = HdlcFrame::with_information(
            server(),
            client(),
            Control::Information { ns: 4, nr: 2, final_bit: true },
            true,
            vec![0xe6, 0xe6, 0x00, 0xc0, 0x01, 0x81],
        );
        let encoded = frame.encode();
        assert_eq!(HdlcFrame::parse(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_corrupted_fcs_rejected() {
        let mut encoded = HdlcFrame::new(server(), client(), Control::Snrm).encode();
        let last = encoded.len() - 2;
        encoded[last] ^= 0xff;
        assert_eq!(HdlcFrame::parse(&encoded).unwrap_err(), Error::Malformed);
    }

    #[test]
    fn test_corrupted_hcs_rejected() {
        let frame = HdlcFrame::with_information(
            server(),
            client(),
            Control::Information { ns: 0, nr: 0, final_bit: true },
            false,
            vec![0xe6, 0xe6, 0x00, 0x01],
        );
        let mut encoded = frame.encode();
        // HCS sits right after the control byte at offset 6
        encoded[7] ^= 0x01;
        assert_eq!(HdlcFrame::parse(&encoded).unwrap_err(), Error::Malformed);
    }

    #[test]
    fn test_wrong_length_field_rejected() {
        let mut encoded = HdlcFrame::new(server(), client(), Control::Snrm).encode();
        encoded[2] += 1;
        assert_eq!(HdlcFrame::parse(&encoded).unwrap_err(), Error::Malformed);
    }

    #[test]
    fn test_wrong_format_type_rejected() {
        let mut encoded = HdlcFrame::new(server(), client(), Control::Snrm).encode();
        encoded[1] = 0xb0 | (encoded[1] & 0x0f);
        assert!(HdlcFrame::parse(&encoded).is_err());
    }
}
