//! Blocking TCP link.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::string::String;
use std::time::Duration;

use super::{Link, TransportError};

/// The IANA-registered DLMS port.
pub const DEFAULT_DLMS_PORT: u16 = 4059;

/// Default per-read deadline. Meters answering over cellular backhauls
/// regularly need several seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct TcpLink {
    address: String,
    stream: Option<TcpStream>,
    timeout: Option<Duration>,
}

impl TcpLink {
    /// Create an unconnected link; `Link::connect` opens the socket.
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), stream: None, timeout: Some(DEFAULT_TIMEOUT) }
    }

    /// Create and connect in one step.
    pub fn connect(address: impl Into<String>) -> std::io::Result<Self> {
        let mut link = Self::new(address);
        match Link::connect(&mut link) {
            Ok(()) => Ok(link),
            Err(TransportError::Io(e)) => Err(e),
            Err(TransportError::Timeout) => {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))
            }
            Err(_) => Err(std::io::Error::new(std::io::ErrorKind::Other, "connect failed")),
        }
    }

    fn classify(e: std::io::Error) -> TransportError<std::io::Error> {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout
            }
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset => {
                TransportError::ConnectionClosed
            }
            _ => TransportError::Io(e),
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError<std::io::Error>> {
        self.stream.as_mut().ok_or(TransportError::ConnectionClosed)
    }
}

impl Link for TcpLink {
    type Error = std::io::Error;

    fn connect(&mut self) -> Result<(), TransportError<Self::Error>> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect(&self.address).map_err(Self::classify)?;
        stream.set_read_timeout(self.timeout).map_err(Self::classify)?;
        stream.set_write_timeout(self.timeout).map_err(Self::classify)?;
        stream.set_nodelay(true).map_err(Self::classify)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError<Self::Error>> {
        if let Some(stream) = self.stream.take() {
            // Orderly shutdown before close; some meter-side modems keep
            // the session reserved otherwise.
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError<Self::Error>> {
        self.stream()?.write_all(data).map_err(Self::classify)
    }

    fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError<Self::Error>> {
        self.stream()?.read(buffer).map_err(Self::classify)
    }

    fn set_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError<Self::Error>> {
        self.timeout = timeout;
        if let Some(ref stream) = self.stream {
            stream.set_read_timeout(timeout).map_err(Self::classify)?;
            stream.set_write_timeout(timeout).map_err(Self::classify)?;
        }
        Ok(())
    }
}
