//! A-XDR codec for the DLMS `data` tree.
//!
//! Every DLMS attribute value is a recursive tagged value: a single tag
//! byte, followed by a payload whose layout the tag dictates. Compound
//! values (structure, array, compact-array) nest. Variable-width lengths
//! use the DLMS length codec: one byte below 128, otherwise `0x80 | n`
//! followed by `n` big-endian length bytes.
//!
//! Writing always emits the minimal length form. Reading is permissive:
//! non-minimal long forms occur in real meter traffic and are accepted.
//!
//! Reference: DLMS Blue Book Ed. 14 section 4.1.5 (Common data types).

use alloc::{string::String, vec::Vec};
use core::convert::TryFrom;
use core::fmt;

#[cfg(feature = "serde")]
use alloc::string::ToString;

#[cfg(feature = "parse")]
use nom::{
    bytes::streaming::take,
    combinator::fail,
    number::streaming::{be_f32, be_f64, be_i16, be_i32, be_i64, be_u16, be_u32, be_u64, i8, u8},
    sequence::tuple,
    IResult,
};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[cfg(feature = "parse")]
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum DataType {
  Null               =  0,
  Array              =  1,
  Structure          =  2,
  Bool               =  3,
  BitString          =  4,
  DoubleLong         =  5,
  DoubleLongUnsigned =  6,
  OctetString        =  9,
  VisibleString      = 10,
  Utf8String         = 12,
  BinaryCodedDecimal = 13,
  Integer            = 15,
  Long               = 16,
  Unsigned           = 17,
  LongUnsigned       = 18,
  CompactArray       = 19,
  Long64             = 20,
  Long64Unsigned     = 21,
  Enum               = 22,
  Float32            = 23,
  Float64            = 24,
  DateTime           = 25,
  Date               = 26,
  Time               = 27,
}

impl TryFrom<u8> for DataType {
    type Error = u8;

    fn try_from(dt: u8) -> Result<Self, Self::Error> {
        Ok(match dt {
            0x00 => Self::Null,
            0x01 => Self::Array,
            0x02 => Self::Structure,
            0x03 => Self::Bool,
            0x04 => Self::BitString,
            0x05 => Self::DoubleLong,
            0x06 => Self::DoubleLongUnsigned,
            0x09 => Self::OctetString,
            0x0a => Self::VisibleString,
            0x0c => Self::Utf8String,
            0x0d => Self::BinaryCodedDecimal,
            0x0f => Self::Integer,
            0x10 => Self::Long,
            0x11 => Self::Unsigned,
            0x12 => Self::LongUnsigned,
            0x13 => Self::CompactArray,
            0x14 => Self::Long64,
            0x15 => Self::Long64Unsigned,
            0x16 => Self::Enum,
            0x17 => Self::Float32,
            0x18 => Self::Float64,
            0x19 => Self::DateTime,
            0x1a => Self::Date,
            0x1b => Self::Time,
            dt => return Err(dt),
        })
    }
}

#[cfg(feature = "serde")]
impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

// ============================================================================
// Length codec
// ============================================================================

/// Parse a DLMS length. Accepts non-minimal long forms.
#[cfg(feature = "parse")]
pub fn parse_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, first) = u8(input)?;
    if first & 0x80 == 0 {
        return Ok((input, first as usize));
    }
    let octets = (first & 0x7f) as usize;
    if octets == 0 || octets > core::mem::size_of::<usize>() {
        return fail(input);
    }
    let (input, raw) = take(octets)(input)?;
    let mut length = 0usize;
    for &byte in raw {
        length = (length << 8) | byte as usize;
    }
    Ok((input, length))
}

/// Append a DLMS length in minimal form.
#[cfg(feature = "encode")]
pub fn encode_length(buf: &mut Vec<u8>, length: usize) {
    if length < 0x80 {
        buf.push(length as u8);
        return;
    }
    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    buf.push(0x80 | (bytes.len() - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
}

/// Small extension over `Vec<u8>` for the big-endian fields the APDU
/// grammars are full of.
#[cfg(feature = "encode")]
pub trait ByteBuffer {
    fn push_u16(&mut self, value: u16);
    fn push_u32(&mut self, value: u32);
    fn push_length(&mut self, length: usize);
}

#[cfg(feature = "encode")]
impl ByteBuffer for Vec<u8> {
    fn push_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_be_bytes());
    }

    fn push_length(&mut self, length: usize) {
        encode_length(self, length);
    }
}

// ============================================================================
// Date, time, date-time
// ============================================================================

/// Calendar date. Raw octet semantics: 0xFFFF / 0xFF mean "not specified",
/// 0xFE / 0xFD in day-of-month select last / second-to-last day.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day_of_month: u8,
    pub day_of_week: u8,
}

impl Date {
    pub const fn new(year: u16, month: u8, day_of_month: u8, day_of_week: u8) -> Self {
        Self { year, month, day_of_month, day_of_week }
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (year, month, day_of_month, day_of_week)) =
            tuple((be_u16, u8, u8, u8))(input)?;
        Ok((input, Self { year, month, day_of_month, day_of_week }))
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.year.to_be_bytes());
        buf.push(self.month);
        buf.push(self.day_of_month);
        buf.push(self.day_of_week);
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day_of_month)
    }
}

impl fmt::Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub hundredth: Option<u8>,
}

impl Time {
    pub const fn new(
        hour: Option<u8>,
        minute: Option<u8>,
        second: Option<u8>,
        hundredth: Option<u8>,
    ) -> Self {
        Self { hour, minute, second, hundredth }
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (hour, minute, second, hundredth)) = tuple((u8, u8, u8, u8))(input)?;

        let hour = match hour {
            0xff => None,
            0..=23 => Some(hour),
            _ => return fail(input),
        };
        let minute = match minute {
            0xff => None,
            0..=59 => Some(minute),
            _ => return fail(input),
        };
        let second = match second {
            0xff => None,
            0..=59 => Some(second),
            _ => return fail(input),
        };
        let hundredth = match hundredth {
            0xff => None,
            0..=99 => Some(hundredth),
            _ => return fail(input),
        };

        Ok((input, Self { hour, minute, second, hundredth }))
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.hour.unwrap_or(0xff));
        buf.push(self.minute.unwrap_or(0xff));
        buf.push(self.second.unwrap_or(0xff));
        buf.push(self.hundredth.unwrap_or(0xff));
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.hundredth.unwrap_or(0),
        )
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Time(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Time {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockStatus(pub u8);

impl ClockStatus {
    const INVALID_VALUE_BIT: u8 = 0b0000_0001;
    const DOUBTFUL_VALUE_BIT: u8 = 0b0000_0010;
    const DIFFERENT_BASE_BIT: u8 = 0b0000_0100;
    const INVALID_STATUS_BIT: u8 = 0b0000_1000;
    const DAYLIGHT_SAVING_BIT: u8 = 0b1000_0000;

    pub fn invalid_value(&self) -> bool {
        (self.0 & Self::INVALID_VALUE_BIT) != 0
    }

    pub fn doubtful_value(&self) -> bool {
        (self.0 & Self::DOUBTFUL_VALUE_BIT) != 0
    }

    pub fn different_base(&self) -> bool {
        (self.0 & Self::DIFFERENT_BASE_BIT) != 0
    }

    pub fn invalid_status(&self) -> bool {
        (self.0 & Self::INVALID_STATUS_BIT) != 0
    }

    pub fn daylight_saving(&self) -> bool {
        (self.0 & Self::DAYLIGHT_SAVING_BIT) != 0
    }
}

/// 12-byte date-time.
///
/// The stored deviation follows the Blue Book convention: minutes from
/// *local time to UTC*, i.e. the negated UTC offset. `0x8000` means not
/// specified. Use [`DateTime::from_utc_offset_minutes`] and
/// [`DateTime::utc_offset_minutes`] instead of touching `deviation`
/// directly; they apply the negation. Companion standards interpreting the
/// field with the opposite sign must transform externally.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub date: Date,
    pub time: Time,
    pub deviation: Option<i16>,
    pub clock_status: Option<ClockStatus>,
}

impl DateTime {
    pub const fn new(
        date: Date,
        time: Time,
        deviation: Option<i16>,
        clock_status: Option<ClockStatus>,
    ) -> Self {
        Self { date, time, deviation, clock_status }
    }

    /// Build a date-time carrying the given UTC offset. An instant at
    /// UTC+01:00 stores deviation −60.
    pub fn from_utc_offset_minutes(
        date: Date,
        time: Time,
        utc_offset_minutes: i16,
        clock_status: Option<ClockStatus>,
    ) -> Self {
        Self { date, time, deviation: Some(-utc_offset_minutes), clock_status }
    }

    /// UTC offset in minutes east of UTC, when the deviation is specified.
    pub fn utc_offset_minutes(&self) -> Option<i16> {
        self.deviation.map(|d| -d)
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, date) = Date::parse(input)?;
        let (input, time) = Time::parse(input)?;
        let (input, deviation) = be_i16(input)?;
        let deviation = Some(deviation).filter(|&d| d != 0x8000u16 as i16);
        let (input, clock_status) = u8(input)?;
        let clock_status = Some(clock_status).filter(|&b| b != 0xff).map(ClockStatus);

        Ok((input, Self { date, time, deviation, clock_status }))
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        self.date.encode_into(buf);
        self.time.encode_into(buf);
        let deviation = self.deviation.unwrap_or(0x8000u16 as i16);
        buf.extend_from_slice(&deviation.to_be_bytes());
        buf.push(self.clock_status.map(|s| s.0).unwrap_or(0xff));
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T{}", self.date, self.time)?;

        if let Some(offset) = self.utc_offset_minutes() {
            if offset >= 0 {
                '+'.fmt(f)?;
            } else {
                '-'.fmt(f)?;
            };
            let offset = offset.abs();
            write!(f, "{:02}:{:02}", offset / 60, offset % 60)?;
        }

        Ok(())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime(\"{}\")", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

// ============================================================================
// Compact-array type descriptions
// ============================================================================

/// Type description carried by a compact-array: the element layout once,
/// then the packed contents without per-element tags.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum TypeDescription {
    Primitive(DataType),
    Array { count: u16, element: alloc::boxed::Box<TypeDescription> },
    Structure(Vec<TypeDescription>),
}

impl TypeDescription {
    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        match DataType::try_from(tag) {
            Ok(DataType::Structure) => {
                let (mut input, count) = parse_length(input)?;
                let mut members = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, member) = Self::parse(input)?;
                    members.push(member);
                    input = rest;
                }
                Ok((input, TypeDescription::Structure(members)))
            }
            Ok(DataType::Array) => {
                let (input, count) = be_u16(input)?;
                let (input, element) = Self::parse(input)?;
                Ok((
                    input,
                    TypeDescription::Array { count, element: alloc::boxed::Box::new(element) },
                ))
            }
            Ok(dt) => Ok((input, TypeDescription::Primitive(dt))),
            Err(_) => fail(input),
        }
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            TypeDescription::Primitive(dt) => buf.push(*dt as u8),
            TypeDescription::Array { count, element } => {
                buf.push(DataType::Array as u8);
                buf.extend_from_slice(&count.to_be_bytes());
                element.encode_into(buf);
            }
            TypeDescription::Structure(members) => {
                buf.push(DataType::Structure as u8);
                encode_length(buf, members.len());
                for member in members {
                    member.encode_into(buf);
                }
            }
        }
    }
}

// ============================================================================
// Data tree
// ============================================================================

#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Null,
    Bool(bool),
    BitString { bit_length: usize, data: Vec<u8> },
    OctetString(Vec<u8>),
    VisibleString(String),
    Utf8String(String),
    BinaryCodedDecimal(u8),
    Integer(i8),
    Unsigned(u8),
    Long(i16),
    LongUnsigned(u16),
    DoubleLong(i32),
    DoubleLongUnsigned(u32),
    Long64(i64),
    Long64Unsigned(u64),
    Float32(f32),
    Float64(f64),
    DateTime(DateTime),
    Date(Date),
    Time(Time),
    Enum(u8),
    Structure(Vec<Data>),
    Array(Vec<Data>),
    CompactArray { descriptor: TypeDescription, elements: Vec<Data> },
}

impl Data {
    /// Decode one canonical data tree, returning the value and the number
    /// of bytes consumed. Distinguishes an unregistered tag
    /// ([`Error::UnknownTag`]) from truncated or inconsistent bytes
    /// ([`Error::Malformed`]).
    #[cfg(feature = "parse")]
    pub fn from_bytes(input: &[u8]) -> Result<(Self, usize), Error> {
        let first = *input.first().ok_or(Error::Malformed)?;
        if DataType::try_from(first).is_err() {
            return Err(Error::UnknownTag(first));
        }
        let (rest, data) = Self::parse(input).map_err(|_| Error::Malformed)?;
        Ok((data, input.len() - rest.len()))
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = u8(input)?;
        let data_type = DataType::try_from(tag).map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail))
        })?;
        Self::parse_payload(input, data_type)
    }

    /// Parse the payload of an already-consumed tag. Also used for
    /// compact-array contents, where tags are stripped.
    #[cfg(feature = "parse")]
    fn parse_payload(input: &[u8], data_type: DataType) -> IResult<&[u8], Self> {
        Ok(match data_type {
            DataType::Null => (input, Data::Null),
            DataType::Bool => {
                let (input, b) = u8(input)?;
                (input, Data::Bool(b != 0))
            }
            DataType::BitString => {
                let (input, bit_length) = parse_length(input)?;
                let (input, raw) = take(bit_length.div_ceil(8))(input)?;
                (input, Data::BitString { bit_length, data: raw.to_vec() })
            }
            DataType::OctetString => {
                let (input, len) = parse_length(input)?;
                let (input, raw) = take(len)(input)?;
                (input, Data::OctetString(raw.to_vec()))
            }
            DataType::VisibleString => {
                let (input, len) = parse_length(input)?;
                let (input, raw) = take(len)(input)?;
                match core::str::from_utf8(raw) {
                    Ok(s) => (input, Data::VisibleString(String::from(s))),
                    Err(_) => return fail(input),
                }
            }
            DataType::Utf8String => {
                let (input, len) = parse_length(input)?;
                let (input, raw) = take(len)(input)?;
                match core::str::from_utf8(raw) {
                    Ok(s) => (input, Data::Utf8String(String::from(s))),
                    Err(_) => return fail(input),
                }
            }
            DataType::BinaryCodedDecimal => {
                let (input, n) = u8(input)?;
                (input, Data::BinaryCodedDecimal(n))
            }
            DataType::Integer => {
                let (input, n) = i8(input)?;
                (input, Data::Integer(n))
            }
            DataType::Unsigned => {
                let (input, n) = u8(input)?;
                (input, Data::Unsigned(n))
            }
            DataType::Long => {
                let (input, n) = be_i16(input)?;
                (input, Data::Long(n))
            }
            DataType::LongUnsigned => {
                let (input, n) = be_u16(input)?;
                (input, Data::LongUnsigned(n))
            }
            DataType::DoubleLong => {
                let (input, n) = be_i32(input)?;
                (input, Data::DoubleLong(n))
            }
            DataType::DoubleLongUnsigned => {
                let (input, n) = be_u32(input)?;
                (input, Data::DoubleLongUnsigned(n))
            }
            DataType::Long64 => {
                let (input, n) = be_i64(input)?;
                (input, Data::Long64(n))
            }
            DataType::Long64Unsigned => {
                let (input, n) = be_u64(input)?;
                (input, Data::Long64Unsigned(n))
            }
            DataType::Float32 => {
                let (input, n) = be_f32(input)?;
                (input, Data::Float32(n))
            }
            DataType::Float64 => {
                let (input, n) = be_f64(input)?;
                (input, Data::Float64(n))
            }
            DataType::Enum => {
                let (input, n) = u8(input)?;
                (input, Data::Enum(n))
            }
            DataType::DateTime => {
                let (input, dt) = DateTime::parse(input)?;
                (input, Data::DateTime(dt))
            }
            DataType::Date => {
                let (input, date) = Date::parse(input)?;
                (input, Data::Date(date))
            }
            DataType::Time => {
                let (input, time) = Time::parse(input)?;
                (input, Data::Time(time))
            }
            DataType::Structure => {
                let (mut input, count) = parse_length(input)?;
                let mut members = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, member) = Self::parse(input)?;
                    members.push(member);
                    input = rest;
                }
                (input, Data::Structure(members))
            }
            DataType::Array => {
                let (mut input, count) = parse_length(input)?;
                let mut elements = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    let (rest, element) = Self::parse(input)?;
                    elements.push(element);
                    input = rest;
                }
                (input, Data::Array(elements))
            }
            DataType::CompactArray => {
                let (input, descriptor) = TypeDescription::parse(input)?;
                let (input, content_len) = parse_length(input)?;
                let (input, mut content) = take(content_len)(input)?;
                let mut elements = Vec::new();
                while !content.is_empty() {
                    let (rest, element) = Self::parse_described(content, &descriptor)?;
                    elements.push(element);
                    content = rest;
                }
                (input, Data::CompactArray { descriptor, elements })
            }
        })
    }

    /// Parse one tagless value according to a compact-array description.
    #[cfg(feature = "parse")]
    fn parse_described<'i>(
        input: &'i [u8],
        descriptor: &TypeDescription,
    ) -> IResult<&'i [u8], Self> {
        match descriptor {
            TypeDescription::Primitive(dt) => Self::parse_payload(input, *dt),
            TypeDescription::Structure(members) => {
                let mut input = input;
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    let (rest, value) = Self::parse_described(input, member)?;
                    values.push(value);
                    input = rest;
                }
                Ok((input, Data::Structure(values)))
            }
            TypeDescription::Array { count, element } => {
                let mut input = input;
                let mut values = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    let (rest, value) = Self::parse_described(input, element)?;
                    values.push(value);
                    input = rest;
                }
                Ok((input, Data::Array(values)))
            }
        }
    }

    /// Canonical encoding, tag included.
    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    #[cfg(feature = "encode")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.data_type() as u8);
        self.encode_payload(buf);
    }

    #[cfg(feature = "encode")]
    fn encode_payload(&self, buf: &mut Vec<u8>) {
        match self {
            Data::Null => {}
            Data::Bool(b) => buf.push(*b as u8),
            Data::BitString { bit_length, data } => {
                encode_length(buf, *bit_length);
                buf.extend_from_slice(data);
            }
            Data::OctetString(bytes) => {
                encode_length(buf, bytes.len());
                buf.extend_from_slice(bytes);
            }
            Data::VisibleString(s) | Data::Utf8String(s) => {
                encode_length(buf, s.len());
                buf.extend_from_slice(s.as_bytes());
            }
            Data::BinaryCodedDecimal(n) => buf.push(*n),
            Data::Integer(n) => buf.push(*n as u8),
            Data::Unsigned(n) => buf.push(*n),
            Data::Long(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::LongUnsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::DoubleLong(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::DoubleLongUnsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::Long64(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::Long64Unsigned(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::Float32(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::Float64(n) => buf.extend_from_slice(&n.to_be_bytes()),
            Data::Enum(n) => buf.push(*n),
            Data::DateTime(dt) => dt.encode_into(buf),
            Data::Date(d) => d.encode_into(buf),
            Data::Time(t) => t.encode_into(buf),
            Data::Structure(members) => {
                encode_length(buf, members.len());
                for member in members {
                    member.encode_into(buf);
                }
            }
            Data::Array(elements) => {
                encode_length(buf, elements.len());
                for element in elements {
                    element.encode_into(buf);
                }
            }
            Data::CompactArray { descriptor, elements } => {
                descriptor.encode_into(buf);
                let mut content = Vec::new();
                for element in elements {
                    element.encode_described(&mut content);
                }
                encode_length(buf, content.len());
                buf.extend_from_slice(&content);
            }
        }
    }

    /// Tagless encoding for compact-array contents.
    #[cfg(feature = "encode")]
    fn encode_described(&self, buf: &mut Vec<u8>) {
        match self {
            Data::Structure(members) | Data::Array(members) => {
                for member in members {
                    member.encode_described(buf);
                }
            }
            other => other.encode_payload(buf),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Data::Null => DataType::Null,
            Data::Bool(_) => DataType::Bool,
            Data::BitString { .. } => DataType::BitString,
            Data::OctetString(_) => DataType::OctetString,
            Data::VisibleString(_) => DataType::VisibleString,
            Data::Utf8String(_) => DataType::Utf8String,
            Data::BinaryCodedDecimal(_) => DataType::BinaryCodedDecimal,
            Data::Integer(_) => DataType::Integer,
            Data::Unsigned(_) => DataType::Unsigned,
            Data::Long(_) => DataType::Long,
            Data::LongUnsigned(_) => DataType::LongUnsigned,
            Data::DoubleLong(_) => DataType::DoubleLong,
            Data::DoubleLongUnsigned(_) => DataType::DoubleLongUnsigned,
            Data::Long64(_) => DataType::Long64,
            Data::Long64Unsigned(_) => DataType::Long64Unsigned,
            Data::Float32(_) => DataType::Float32,
            Data::Float64(_) => DataType::Float64,
            Data::DateTime(_) => DataType::DateTime,
            Data::Date(_) => DataType::Date,
            Data::Time(_) => DataType::Time,
            Data::Enum(_) => DataType::Enum,
            Data::Structure(_) => DataType::Structure,
            Data::Array(_) => DataType::Array,
            Data::CompactArray { .. } => DataType::CompactArray,
        }
    }
}
