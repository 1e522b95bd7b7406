//! DataNotification (tag 0x0F): unsolicited push data from the meter.
//!
//! Carries a 32-bit long-invoke-id-and-priority word, an optional
//! date-time (length-prefixed, zero length when absent) and one data tree
//! as the notification body. Typically delivered over UI frames or UDP,
//! outside any request/response exchange.

use alloc::vec::Vec;

#[cfg(feature = "parse")]
use nom::{
    number::streaming::{be_u32, u8 as nom_u8},
    IResult,
};

use crate::data::{Data, DateTime};

pub const DATA_NOTIFICATION_TAG: u8 = 0x0f;

/// Unsigned32 bitfield: bits 0-23 invoke id, bit 28 self-descriptive,
/// bit 29 break-on-error, bit 30 confirmed, bit 31 high priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LongInvokeIdAndPriority(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceClass {
    Unconfirmed,
    Confirmed,
}

impl LongInvokeIdAndPriority {
    pub const fn new(invoke_id: u32) -> Self {
        Self(invoke_id & 0x00ff_ffff)
    }

    pub fn invoke_id(&self) -> u32 {
        self.0 & 0x00ff_ffff
    }

    pub fn priority(&self) -> Priority {
        if self.0 & (1 << 31) == 0 {
            Priority::Normal
        } else {
            Priority::High
        }
    }

    pub fn service_class(&self) -> ServiceClass {
        if self.0 & (1 << 30) == 0 {
            ServiceClass::Unconfirmed
        } else {
            ServiceClass::Confirmed
        }
    }

    pub fn break_on_error(&self) -> bool {
        self.0 & (1 << 29) != 0
    }

    pub fn self_descriptive(&self) -> bool {
        self.0 & (1 << 28) != 0
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataNotification {
    pub long_invoke_id: LongInvokeIdAndPriority,
    pub date_time: Option<DateTime>,
    pub body: Data,
}

impl DataNotification {
    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, tag) = nom_u8(input)?;
        if tag != DATA_NOTIFICATION_TAG {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (input, word) = be_u32(input)?;
        let (input, dt_len) = nom_u8(input)?;
        let (input, date_time) = match dt_len {
            0 => (input, None),
            0x0c => {
                let (input, dt) = DateTime::parse(input)?;
                (input, Some(dt))
            }
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::LengthValue,
                )))
            }
        };
        let (input, body) = Data::parse(input)?;
        Ok((input, Self { long_invoke_id: LongInvokeIdAndPriority(word), date_time, body }))
    }

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(DATA_NOTIFICATION_TAG);
        buf.extend_from_slice(&self.long_invoke_id.0.to_be_bytes());
        match &self.date_time {
            Some(dt) => {
                buf.push(0x0c);
                dt.encode_into(&mut buf);
            }
            None => buf.push(0x00),
        }
        self.body.encode_into(&mut buf);
        buf
    }
}

#[cfg(all(test, feature = "encode", feature = "parse"))]
mod tests {
    use super::*;
    use crate::data::{Date, Time};

    #[test]
    fn test_long_invoke_id_bits() {
        let id = LongInvokeIdAndPriority(0x8000_0001);
        assert_eq!(id.invoke_id(), 1);
        assert_eq!(id.priority(), Priority::High);
        assert_eq!(id.service_class(), ServiceClass::Unconfirmed);
        assert!(!id.break_on_error());
        assert!(!id.self_descriptive());

        let id = LongInvokeIdAndPriority(0x5234_5678);
        assert_eq!(id.invoke_id(), 0x0034_5678);
        assert_eq!(id.priority(), Priority::Normal);
        assert_eq!(id.service_class(), ServiceClass::Confirmed);
        assert!(!id.break_on_error());
        assert!(id.self_descriptive());
    }

    #[test]
    fn test_parse_without_datetime() {
        let input = [0x0f, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x11, 0x07];
        let (rest, notification) = DataNotification::parse(&input).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(notification.long_invoke_id.invoke_id(), 42);
        assert_eq!(notification.date_time, None);
        assert_eq!(notification.body, Data::Unsigned(7));
    }

    #[test]
    fn test_roundtrip_with_datetime() {
        let notification = DataNotification {
            long_invoke_id: LongInvokeIdAndPriority::new(1),
            date_time: Some(DateTime::new(
                Date::new(2022, 2, 7, 1),
                Time::new(Some(8), Some(0), Some(0), Some(0)),
                Some(-60),
                None,
            )),
            body: Data::Structure(vec![
                Data::OctetString(vec![1, 0, 1, 8, 0, 255]),
                Data::DoubleLongUnsigned(123456),
            ]),
        };
        let encoded = notification.encode();
        let (rest, parsed) = DataNotification::parse(&encoded).unwrap();
        assert_eq!(rest, &[] as &[u8]);
        assert_eq!(parsed, notification);
    }

    #[test]
    fn test_rejects_bad_datetime_length() {
        let input = [0x0f, 0x00, 0x00, 0x00, 0x01, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(DataNotification::parse(&input).is_err());
    }
}
