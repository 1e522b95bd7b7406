//! Minimal BER (ISO/IEC 8825-1) helpers for the ACSE envelope.
//!
//! The ACSE APDUs are flat sequences of context-tagged TLVs, so a
//! borrowed [`Tlv`] view plus a handful of push helpers covers everything
//! AARQ/AARE/RLRQ/RLRE need. Definite lengths only; multi-byte tags are
//! not used by DLMS and are rejected.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    combinator::fail,
    number::streaming::u8 as nom_u8,
    IResult,
};

/// Universal tags used by the ACSE grammar.
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;

/// One tag-length-value element, content borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'i> {
    pub tag: u8,
    pub content: &'i [u8],
}

#[cfg(feature = "parse")]
impl<'i> Tlv<'i> {
    pub fn parse(input: &'i [u8]) -> IResult<&'i [u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag & 0x1f == 0x1f {
            // multi-byte tag number
            return fail(input);
        }
        let (input, length) = parse_ber_length(input)?;
        let (input, content) = take(length)(input)?;
        Ok((input, Self { tag, content }))
    }

    /// Expect exactly one inner TLV with the given tag.
    pub fn unwrap_inner(&self, expected_tag: u8) -> Option<&'i [u8]> {
        let (rest, inner) = Tlv::parse(self.content).ok()?;
        if inner.tag == expected_tag && rest.is_empty() {
            Some(inner.content)
        } else {
            None
        }
    }
}

/// BER definite length. Short form below 128, else `0x80 | n` count bytes.
#[cfg(feature = "parse")]
pub fn parse_ber_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = nom_u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }
    let octets = (first & 0x7f) as usize;
    if octets == 0 || octets > 2 {
        // indefinite form, or longer than any DLMS APDU can be
        return fail(input);
    }
    let (input, raw) = take(octets)(input)?;
    let mut length = 0usize;
    for &byte in raw {
        length = (length << 8) | byte as usize;
    }
    Ok((input, length))
}

#[cfg(feature = "encode")]
pub fn push_ber_length(buf: &mut Vec<u8>, length: usize) {
    if length < 0x80 {
        buf.push(length as u8);
    } else if length <= 0xff {
        buf.push(0x81);
        buf.push(length as u8);
    } else {
        buf.push(0x82);
        buf.push((length >> 8) as u8);
        buf.push(length as u8);
    }
}

/// Append a complete TLV.
#[cfg(feature = "encode")]
pub fn push_tlv(buf: &mut Vec<u8>, tag: u8, content: &[u8]) {
    buf.push(tag);
    push_ber_length(buf, content.len());
    buf.extend_from_slice(content);
}

/// Append `outer_tag { inner_tag, length, content }`, the explicit
/// tagging pattern AP titles and user information use.
#[cfg(feature = "encode")]
pub fn push_wrapped_tlv(buf: &mut Vec<u8>, outer_tag: u8, inner_tag: u8, content: &[u8]) {
    let mut inner = Vec::with_capacity(content.len() + 4);
    push_tlv(&mut inner, inner_tag, content);
    push_tlv(buf, outer_tag, &inner);
}
