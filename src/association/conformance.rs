//! The conformance block: a 24-bit set of services an association may
//! use. The client proposes, the server answers with the intersection.
//!
//! The bit string travels inside Initiate APDUs as the BER TLV
//! `5F 1F 04 00 b0 b1 b2` (application tag 31, one unused-bits octet,
//! three value octets). Bit numbering below follows the value as a
//! big-endian integer; the standard's table numbers bits from the other
//! end.

use core::fmt;

#[cfg(feature = "parse")]
use nom::{bytes::streaming::take, bytes::streaming::tag as byte_tag, IResult};

#[cfg(feature = "encode")]
use alloc::vec::Vec;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Conformance {
    bits: u32,
}

impl Conformance {
    pub const GENERAL_PROTECTION: Self = Self { bits: 1 << 22 };
    pub const GENERAL_BLOCK_TRANSFER: Self = Self { bits: 1 << 21 };
    pub const READ: Self = Self { bits: 1 << 20 };
    pub const WRITE: Self = Self { bits: 1 << 19 };
    pub const UNCONFIRMED_WRITE: Self = Self { bits: 1 << 18 };
    pub const DELTA_VALUE_ENCODING: Self = Self { bits: 1 << 17 };
    pub const ATTRIBUTE_0_WITH_SET: Self = Self { bits: 1 << 15 };
    pub const PRIORITY_MGMT: Self = Self { bits: 1 << 14 };
    pub const ATTRIBUTE_0_WITH_GET: Self = Self { bits: 1 << 13 };
    pub const BLOCK_TRANSFER_WITH_GET_OR_READ: Self = Self { bits: 1 << 12 };
    pub const BLOCK_TRANSFER_WITH_SET_OR_WRITE: Self = Self { bits: 1 << 11 };
    pub const BLOCK_TRANSFER_WITH_ACTION: Self = Self { bits: 1 << 10 };
    pub const MULTIPLE_REFERENCES: Self = Self { bits: 1 << 9 };
    pub const INFORMATION_REPORT: Self = Self { bits: 1 << 8 };
    pub const DATA_NOTIFICATION: Self = Self { bits: 1 << 7 };
    pub const ACCESS: Self = Self { bits: 1 << 6 };
    pub const PARAMETERIZED_ACCESS: Self = Self { bits: 1 << 5 };
    pub const GET: Self = Self { bits: 1 << 4 };
    pub const SET: Self = Self { bits: 1 << 3 };
    pub const SELECTIVE_ACCESS: Self = Self { bits: 1 << 2 };
    pub const EVENT_NOTIFICATION: Self = Self { bits: 1 << 1 };
    pub const ACTION: Self = Self { bits: 1 << 0 };

    pub const EMPTY: Self = Self { bits: 0 };

    /// What an LN client proposes by default.
    pub const DEFAULT_CLIENT: Self = Self {
        bits: Self::GET.bits
            | Self::SET.bits
            | Self::ACTION.bits
            | Self::SELECTIVE_ACCESS.bits
            | Self::EVENT_NOTIFICATION.bits
            | Self::PRIORITY_MGMT.bits
            | Self::BLOCK_TRANSFER_WITH_GET_OR_READ.bits
            | Self::BLOCK_TRANSFER_WITH_SET_OR_WRITE.bits,
    };

    pub const fn from_bits(bits: u32) -> Self {
        Self { bits: bits & 0x00ff_ffff }
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::from_bits(
            ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32),
        )
    }

    pub const fn to_bytes(self) -> [u8; 3] {
        [(self.bits >> 16) as u8, (self.bits >> 8) as u8, self.bits as u8]
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// The BER TLV carried in Initiate APDUs: `5F 1F 04 00` + 3 value
    /// octets.
    #[cfg(feature = "encode")]
    pub fn encode_tlv(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[0x5f, 0x1f, 0x04, 0x00]);
        buf.extend_from_slice(&self.to_bytes());
    }

    #[cfg(feature = "parse")]
    pub fn parse_tlv(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, _) = byte_tag(&[0x5f, 0x1f, 0x04][..])(input)?;
        let (input, raw) = take(4usize)(input)?;
        // raw[0] is the unused-bits octet
        Ok((input, Self::from_bytes([raw[1], raw[2], raw[3]])))
    }
}

impl core::ops::BitOr for Conformance {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self { bits: self.bits | rhs.bits }
    }
}

impl core::ops::BitOrAssign for Conformance {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl core::ops::BitAnd for Conformance {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self { bits: self.bits & rhs.bits }
    }
}

impl core::ops::BitAndAssign for Conformance {
    fn bitand_assign(&mut self, rhs: Self) {
        self.bits &= rhs.bits;
    }
}

impl fmt::Debug for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conformance(0x{:06X})", self.bits)
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.bits)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Conformance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits)
    }
}
