//! HDLC data link for DLMS (IEC 62056-46 profile of ISO/IEC 13239).
//!
//! Frames are flag-delimited (`0x7E`), carry a type-3 format field with
//! an 11-bit length and a segmentation bit, 1/2/4-byte addresses, a
//! control byte with modulo-8 send/receive sequence numbers, and
//! CRC-16/X.25 check sequences over the header (HCS) and the whole frame
//! (FCS).
//!
//! [`connection::HdlcConnection`] drives the client side: SNRM/UA
//! establishment with parameter negotiation, I-frame sequencing,
//! outbound segmentation and inbound reassembly.

pub mod address;
pub mod connection;
pub mod fcs;
pub mod frame;

pub use address::HdlcAddress;
pub use connection::{HdlcConnection, HdlcParameters, LinkEvent, LinkState};
pub use frame::{Control, HdlcFrame, HDLC_FLAG};

/// LLC header in front of every DLMS payload: destination LSAP 0xE6,
/// source LSAP 0xE6 (command) or 0xE7 (response), quality 0x00.
pub const LLC_COMMAND_HEADER: [u8; 3] = [0xe6, 0xe6, 0x00];
pub const LLC_RESPONSE_HEADER: [u8; 3] = [0xe6, 0xe7, 0x00];
