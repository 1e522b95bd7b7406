//! OBIS codes (Object Identification System).
//!
//! An OBIS code names a COSEM object with six octets A-B:C.D.E.F. The
//! canonical display form is `A-B:C.D.E.F`; the parser additionally accepts
//! dotted form (`A.B.C.D.E.F`) and any form using a single custom
//! separator. A missing F group defaults to 255.

use core::fmt::{self, Debug, Display};
use core::str::FromStr;

use nom::{number::complete::u8, sequence::tuple, IResult};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObisCode {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
}

/// Error produced by the string grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseObisError {
    /// A group was empty, non-decimal or above 255.
    InvalidGroup,
    /// Fewer than five or more than six groups.
    WrongGroupCount,
}

impl fmt::Display for ParseObisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseObisError::InvalidGroup => write!(f, "OBIS group is not a decimal octet"),
            ParseObisError::WrongGroupCount => write!(f, "OBIS code needs 5 or 6 groups"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseObisError {}

impl ObisCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Parse the 6-byte wire form.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, (a, b, c, d, e, f)) = tuple((u8, u8, u8, u8, u8, u8))(input)?;
        Ok((input, Self::new(a, b, c, d, e, f)))
    }

    /// The 6 raw octets, without any A-XDR type tag.
    pub const fn encode(&self) -> [u8; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// The octet-string TLV form used inside descriptors: `09 06 A B C D E F`.
    #[cfg(feature = "encode")]
    pub fn encode_with_type(&self) -> alloc::vec::Vec<u8> {
        alloc::vec![0x09, 0x06, self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// Parse a string using an explicit single separator between all six
    /// groups, e.g. `from_separated("1:0:1:8:0:255", ':')`.
    pub fn from_separated(s: &str, separator: char) -> Result<Self, ParseObisError> {
        Self::from_groups(s.split(separator))
    }

    fn from_groups<'a>(groups: impl Iterator<Item = &'a str>) -> Result<Self, ParseObisError> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for group in groups {
            if count == 6 {
                return Err(ParseObisError::WrongGroupCount);
            }
            octets[count] = group
                .parse::<u8>()
                .map_err(|_| ParseObisError::InvalidGroup)?;
            count += 1;
        }
        match count {
            5 => {
                octets[5] = 255;
                Ok(Self::new(
                    octets[0], octets[1], octets[2], octets[3], octets[4], octets[5],
                ))
            }
            6 => Ok(Self::new(
                octets[0], octets[1], octets[2], octets[3], octets[4], octets[5],
            )),
            _ => Err(ParseObisError::WrongGroupCount),
        }
    }
}

impl FromStr for ObisCode {
    type Err = ParseObisError;

    /// Accepts `A-B:C.D.E.F`, `A.B.C.D.E.F`, or five groups with F omitted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_groups(s.split(['-', ':', '.']))
    }
}

impl Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}.{}.{}.{}",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }
}

impl Debug for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ObisCode({})", self)
    }
}

#[cfg(feature = "serde")]
impl Serialize for ObisCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use alloc::string::ToString;
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_parse_bytes() {
        let input = [1, 0, 1, 8, 0, 255, 0xAA];
        let (remaining, code) = ObisCode::parse(&input).unwrap();

        assert_eq!(remaining, &[0xAA]);
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 255));
    }

    #[test]
    fn test_parse_bytes_truncated() {
        assert!(ObisCode::parse(&[1, 0, 1]).is_err());
    }

    #[test]
    fn test_encode_roundtrip() {
        let code = ObisCode::new(0, 0, 43, 1, 0, 255);
        let (_, parsed) = ObisCode::parse(&code.encode()).unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    #[cfg(feature = "encode")]
    fn test_encode_with_type() {
        let code = ObisCode::new(1, 0, 1, 8, 0, 255);
        assert_eq!(code.encode_with_type(), vec![0x09, 0x06, 1, 0, 1, 8, 0, 255]);
    }

    #[test]
    fn test_from_str_canonical() {
        let code: ObisCode = "1-0:1.8.0.255".parse().unwrap();
        assert_eq!(code, ObisCode::new(1, 0, 1, 8, 0, 255));
    }

    #[test]
    fn test_from_str_dotted() {
        let code: ObisCode = "0.0.1.0.0.255".parse().unwrap();
        assert_eq!(code, ObisCode::new(0, 0, 1, 0, 0, 255));
    }

    #[test]
    fn test_from_str_f_defaults_to_255() {
        let code: ObisCode = "1-0:99.1.0".parse().unwrap();
        assert_eq!(code, ObisCode::new(1, 0, 99, 1, 0, 255));
    }

    #[test]
    fn test_from_separated() {
        let code = ObisCode::from_separated("0:0:40:0:0:255", ':').unwrap();
        assert_eq!(code, ObisCode::new(0, 0, 40, 0, 0, 255));
    }

    #[test]
    fn test_from_str_rejects_bad_groups() {
        assert_eq!(
            "1-0:256.8.0.255".parse::<ObisCode>(),
            Err(ParseObisError::InvalidGroup)
        );
        assert_eq!(
            "1-0:1.8".parse::<ObisCode>(),
            Err(ParseObisError::WrongGroupCount)
        );
        assert_eq!(
            "1-0:1.8.0.255.1".parse::<ObisCode>(),
            Err(ParseObisError::WrongGroupCount)
        );
    }

    #[test]
    fn test_display_roundtrip() {
        let code = ObisCode::new(1, 0, 31, 7, 0, 255);
        let parsed: ObisCode = code.to_string().parse().unwrap();
        assert_eq!(parsed, code);
        assert_eq!(code.to_string(), "1-0:31.7.0.255");
    }
}
