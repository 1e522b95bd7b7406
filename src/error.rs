//! Crate-wide error taxonomy.
//!
//! Every failure mode the protocol core can produce is a distinct variant;
//! callers are expected to match on them rather than on strings. Transport
//! errors stay generic (see `client::ClientError`) because the I/O error
//! type belongs to the transport implementation.

use core::fmt;

use crate::apdu::ExceptionResponse;
use crate::association::{AcseServiceUserDiagnostics, AssociationResult};
use crate::get::DataAccessResult;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Bytes did not parse under the expected grammar.
    Malformed,
    /// The leading byte of an APDU has no registered decoder.
    UnknownApdu(u8),
    /// A data tag inside the A-XDR grammar has no registered decoder.
    UnknownTag(u8),
    /// AES-GCM tag verification failed, or the received invocation counter
    /// rolled back. Deliberately indistinguishable from the caller's side.
    DecryptionError,
    /// HLS challenge verification failed.
    AuthenticationFailed,
    /// The AARE carried a rejection result.
    AssociationRefused {
        result: AssociationResult,
        diagnostic: AcseServiceUserDiagnostics,
    },
    /// The peer answered with something inconsistent with the current state
    /// (wrong block number, unexpected APDU type).
    ProtocolError,
    /// The caller invoked an operation disallowed in the current state.
    PreconditionFailed,
    /// The server returned a typed data-access error.
    ServiceError(DataAccessResult),
    /// The server answered with an ExceptionResponse APDU.
    StateError(ExceptionResponse),
    /// The transport reported a timeout; the session must be released or
    /// re-associated.
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed => write!(f, "malformed bytes"),
            Error::UnknownApdu(tag) => write!(f, "unknown APDU tag 0x{:02X}", tag),
            Error::UnknownTag(tag) => write!(f, "unknown data tag 0x{:02X}", tag),
            Error::DecryptionError => write!(f, "unable to decrypt ciphered APDU"),
            Error::AuthenticationFailed => write!(f, "HLS challenge verification failed"),
            Error::AssociationRefused { result, diagnostic } => {
                write!(f, "association refused: {} ({})", result, diagnostic)
            }
            Error::ProtocolError => write!(f, "response inconsistent with connection state"),
            Error::PreconditionFailed => {
                write!(f, "operation not allowed in the current state")
            }
            Error::ServiceError(result) => write!(f, "data access error: {:?}", result),
            Error::StateError(exception) => write!(f, "exception response: {}", exception),
            Error::Timeout => write!(f, "transport timeout"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl<I> From<nom::Err<nom::error::Error<I>>> for Error {
    fn from(_: nom::Err<nom::error::Error<I>>) -> Self {
        Error::Malformed
    }
}
