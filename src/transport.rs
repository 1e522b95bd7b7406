//! Transport abstractions gluing the protocol core to real sockets.
//!
//! Two layers:
//!
//! - [`Link`] is a raw blocking byte stream with explicit lifecycle
//!   (connect / disconnect / timeouts). [`TcpLink`] is the std TCP
//!   implementation; a serial port would implement the same trait.
//! - [`Transport`] is APDU-delimited: `send_apdu` / `recv_apdu` move whole
//!   application PDUs. [`WrapperTransport`] frames them with the 8-byte
//!   wrapper header; [`HdlcTransport`] runs the HDLC engine over a link.
//!
//! Timeouts are configured here and surface as
//! [`TransportError::Timeout`]; the connection layer treats a timed-out
//! session as unusable.

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use crate::error::Error;

#[cfg(feature = "transport-hdlc")]
pub mod hdlc;
#[cfg(feature = "transport-tcp")]
pub mod tcp;
pub mod wrapper;

#[cfg(feature = "transport-hdlc")]
pub use hdlc::HdlcTransport;
#[cfg(feature = "transport-tcp")]
pub use tcp::TcpLink;
pub use wrapper::WrapperTransport;

/// Errors produced by links and transports. `E` is the I/O error type of
/// the concrete link.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportError<E> {
    /// The underlying I/O failed.
    Io(E),
    /// A read or connect hit its deadline.
    Timeout,
    /// The peer closed the connection.
    ConnectionClosed,
    /// The bytes on the wire violated the framing.
    Protocol(Error),
}

impl<E: fmt::Display> fmt::Display for TransportError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "i/o error: {}", e),
            TransportError::Timeout => write!(f, "timeout"),
            TransportError::ConnectionClosed => write!(f, "connection closed by peer"),
            TransportError::Protocol(e) => write!(f, "framing error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for TransportError<E> {}

/// A blocking byte stream. `recv` returns the number of bytes read;
/// zero means the peer closed.
pub trait Link {
    type Error;

    fn connect(&mut self) -> Result<(), TransportError<Self::Error>>;
    /// Orderly shutdown followed by close. Meter modems are prone to
    /// leaking half-open sessions when the shutdown is skipped.
    fn disconnect(&mut self) -> Result<(), TransportError<Self::Error>>;
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError<Self::Error>>;
    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError<Self::Error>>;
    fn set_timeout(&mut self, timeout: Option<Duration>)
        -> Result<(), TransportError<Self::Error>>;
}

/// An APDU-delimited pipe to the meter.
pub trait Transport {
    type Error;

    fn connect(&mut self) -> Result<(), TransportError<Self::Error>>;
    fn disconnect(&mut self) -> Result<(), TransportError<Self::Error>>;
    fn send_apdu(&mut self, apdu: &[u8]) -> Result<(), TransportError<Self::Error>>;
    fn recv_apdu(&mut self) -> Result<Vec<u8>, TransportError<Self::Error>>;
    fn set_timeout(&mut self, timeout: Option<Duration>)
        -> Result<(), TransportError<Self::Error>>;
}
