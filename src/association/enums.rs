//! ACSE enumerations: results, diagnostics, context and mechanism names.

use core::fmt;

use alloc::vec::Vec;

/// Association-result from the AARE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum AssociationResult {
    Accepted = 0,
    RejectedPermanent = 1,
    RejectedTransient = 2,
}

impl AssociationResult {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Accepted,
            1 => Self::RejectedPermanent,
            2 => Self::RejectedTransient,
            _ => return None,
        })
    }
}

impl fmt::Display for AssociationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::RejectedPermanent => write!(f, "rejected-permanent"),
            Self::RejectedTransient => write!(f, "rejected-transient"),
        }
    }
}

/// The acse-service-user half of result-source-diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum AcseServiceUserDiagnostics {
    Null = 0,
    NoReasonGiven = 1,
    ApplicationContextNameNotSupported = 2,
    CallingApTitleNotRecognized = 3,
    CallingApInvocationIdentifierNotRecognized = 4,
    CallingAeQualifierNotRecognized = 5,
    CallingAeInvocationIdentifierNotRecognized = 6,
    CalledApTitleNotRecognized = 7,
    CalledApInvocationIdentifierNotRecognized = 8,
    CalledAeQualifierNotRecognized = 9,
    CalledAeInvocationIdentifierNotRecognized = 10,
    AuthenticationMechanismNameNotRecognized = 11,
    AuthenticationMechanismNameRequired = 12,
    AuthenticationFailure = 13,
    AuthenticationRequired = 14,
}

impl AcseServiceUserDiagnostics {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Null,
            1 => Self::NoReasonGiven,
            2 => Self::ApplicationContextNameNotSupported,
            3 => Self::CallingApTitleNotRecognized,
            4 => Self::CallingApInvocationIdentifierNotRecognized,
            5 => Self::CallingAeQualifierNotRecognized,
            6 => Self::CallingAeInvocationIdentifierNotRecognized,
            7 => Self::CalledApTitleNotRecognized,
            8 => Self::CalledApInvocationIdentifierNotRecognized,
            9 => Self::CalledAeQualifierNotRecognized,
            10 => Self::CalledAeInvocationIdentifierNotRecognized,
            11 => Self::AuthenticationMechanismNameNotRecognized,
            12 => Self::AuthenticationMechanismNameRequired,
            13 => Self::AuthenticationFailure,
            14 => Self::AuthenticationRequired,
            _ => return None,
        })
    }
}

impl fmt::Display for AcseServiceUserDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::NoReasonGiven => write!(f, "no reason given"),
            Self::ApplicationContextNameNotSupported => {
                write!(f, "application context name not supported")
            }
            Self::AuthenticationMechanismNameNotRecognized => {
                write!(f, "authentication mechanism name not recognized")
            }
            Self::AuthenticationMechanismNameRequired => {
                write!(f, "authentication mechanism name required")
            }
            Self::AuthenticationFailure => write!(f, "authentication failure"),
            Self::AuthenticationRequired => write!(f, "authentication required"),
            other => write!(f, "acse diagnostic {}", *other as u8),
        }
    }
}

/// Application context: LN/SN referencing, plain or ciphered. OIDs under
/// 2.16.756.5.8.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ApplicationContextName {
    LogicalName,
    ShortName,
    LogicalNameWithCiphering,
    ShortNameWithCiphering,
}

const CONTEXT_OID_PREFIX: [u8; 6] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x01];

impl ApplicationContextName {
    pub fn oid_bytes(&self) -> [u8; 7] {
        let last = match self {
            Self::LogicalName => 1,
            Self::ShortName => 2,
            Self::LogicalNameWithCiphering => 3,
            Self::ShortNameWithCiphering => 4,
        };
        let mut oid = [0u8; 7];
        oid[..6].copy_from_slice(&CONTEXT_OID_PREFIX);
        oid[6] = last;
        oid
    }

    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 7 || bytes[..6] != CONTEXT_OID_PREFIX {
            return None;
        }
        Some(match bytes[6] {
            1 => Self::LogicalName,
            2 => Self::ShortName,
            3 => Self::LogicalNameWithCiphering,
            4 => Self::ShortNameWithCiphering,
            _ => return None,
        })
    }

    pub fn ciphered(&self) -> bool {
        matches!(self, Self::LogicalNameWithCiphering | Self::ShortNameWithCiphering)
    }
}

impl fmt::Display for ApplicationContextName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogicalName => write!(f, "LN"),
            Self::ShortName => write!(f, "SN"),
            Self::LogicalNameWithCiphering => write!(f, "LN-ciphered"),
            Self::ShortNameWithCiphering => write!(f, "SN-ciphered"),
        }
    }
}

/// Authentication mechanism. OIDs under 2.16.756.5.8.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MechanismName {
    /// No authentication.
    Lowest,
    /// Password (LLS).
    Low,
    /// Manufacturer-specific HLS.
    High,
    HighMd5,
    HighSha1,
    /// HLS with GMAC (method 5), the one this client implements.
    HighGmac,
    HighSha256,
    HighEcdsa,
}

const MECHANISM_OID_PREFIX: [u8; 6] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x02];

impl MechanismName {
    pub fn mechanism_id(&self) -> u8 {
        match self {
            Self::Lowest => 0,
            Self::Low => 1,
            Self::High => 2,
            Self::HighMd5 => 3,
            Self::HighSha1 => 4,
            Self::HighGmac => 5,
            Self::HighSha256 => 6,
            Self::HighEcdsa => 7,
        }
    }

    pub fn oid_bytes(&self) -> [u8; 7] {
        let mut oid = [0u8; 7];
        oid[..6].copy_from_slice(&MECHANISM_OID_PREFIX);
        oid[6] = self.mechanism_id();
        oid
    }

    pub fn from_oid_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 7 || bytes[..6] != MECHANISM_OID_PREFIX {
            return None;
        }
        Some(match bytes[6] {
            0 => Self::Lowest,
            1 => Self::Low,
            2 => Self::High,
            3 => Self::HighMd5,
            4 => Self::HighSha1,
            5 => Self::HighGmac,
            6 => Self::HighSha256,
            7 => Self::HighEcdsa,
            _ => return None,
        })
    }
}

impl fmt::Display for MechanismName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowest => write!(f, "none"),
            Self::Low => write!(f, "LLS"),
            Self::High => write!(f, "HLS"),
            Self::HighMd5 => write!(f, "HLS-MD5"),
            Self::HighSha1 => write!(f, "HLS-SHA1"),
            Self::HighGmac => write!(f, "HLS-GMAC"),
            Self::HighSha256 => write!(f, "HLS-SHA256"),
            Self::HighEcdsa => write!(f, "HLS-ECDSA"),
        }
    }
}

/// The calling/responding authentication value: an LLS password or an
/// HLS challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AuthenticationValue {
    CharString(Vec<u8>),
    BitString(Vec<u8>),
}

impl AuthenticationValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::CharString(bytes) | Self::BitString(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ReleaseRequestReason {
    Normal = 0,
    Urgent = 1,
    UserDefined = 30,
}

impl ReleaseRequestReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Normal,
            1 => Self::Urgent,
            30 => Self::UserDefined,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ReleaseResponseReason {
    Normal = 0,
    NotFinished = 1,
    UserDefined = 30,
}

impl ReleaseResponseReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Normal,
            1 => Self::NotFinished,
            30 => Self::UserDefined,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_oids() {
        let oid = ApplicationContextName::LogicalName.oid_bytes();
        assert_eq!(oid, [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01]);
        assert_eq!(
            ApplicationContextName::from_oid_bytes(&oid),
            Some(ApplicationContextName::LogicalName)
        );

        let ciphered = ApplicationContextName::LogicalNameWithCiphering;
        assert!(ciphered.ciphered());
        assert_eq!(ciphered.oid_bytes()[6], 3);
    }

    #[test]
    fn test_mechanism_oids() {
        let oid = MechanismName::HighGmac.oid_bytes();
        assert_eq!(oid, [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x05]);
        assert_eq!(MechanismName::from_oid_bytes(&oid), Some(MechanismName::HighGmac));
        assert_eq!(MechanismName::from_oid_bytes(&[0x60, 0x85]), None);
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(AssociationResult::from_u8(0), Some(AssociationResult::Accepted));
        assert_eq!(AssociationResult::from_u8(1), Some(AssociationResult::RejectedPermanent));
        assert_eq!(AssociationResult::from_u8(3), None);

        assert_eq!(
            AcseServiceUserDiagnostics::from_u8(13),
            Some(AcseServiceUserDiagnostics::AuthenticationFailure)
        );
        assert_eq!(AcseServiceUserDiagnostics::from_u8(15), None);
    }
}
