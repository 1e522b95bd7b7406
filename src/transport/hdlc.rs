//! HDLC transport: the data-link engine driven over a raw byte link.
//!
//! `connect` runs the SNRM/UA handshake, `send_apdu`/`recv_apdu` exchange
//! I-frames with segmentation handled transparently, `disconnect` closes
//! the link with DISC/UA before releasing the socket.

use alloc::vec::Vec;
use core::time::Duration;

use super::{Link, Transport, TransportError};
use crate::error::Error;
use crate::hdlc::{HdlcAddress, HdlcConnection, HdlcParameters, LinkEvent};

#[derive(Debug)]
pub struct HdlcTransport<L: Link> {
    link: L,
    connection: HdlcConnection,
}

impl<L: Link> HdlcTransport<L> {
    pub fn new(link: L, client_address: HdlcAddress, server_address: HdlcAddress) -> Self {
        Self { link, connection: HdlcConnection::new(client_address, server_address) }
    }

    pub fn with_parameters(
        link: L,
        client_address: HdlcAddress,
        server_address: HdlcAddress,
        parameters: HdlcParameters,
    ) -> Self {
        Self {
            link,
            connection: HdlcConnection::with_parameters(
                client_address,
                server_address,
                parameters,
            ),
        }
    }

    pub fn negotiated(&self) -> &HdlcParameters {
        self.connection.negotiated()
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Read from the link and run the engine until it produces something
    /// other than `NeedData`.
    fn pump(&mut self) -> Result<LinkEvent, TransportError<L::Error>> {
        loop {
            match self.connection.next_event().map_err(TransportError::Protocol)? {
                LinkEvent::NeedData => {
                    let mut buffer = [0u8; 512];
                    let n = self.link.recv(&mut buffer)?;
                    if n == 0 {
                        return Err(TransportError::ConnectionClosed);
                    }
                    self.connection.receive_data(&buffer[..n]);
                }
                event => return Ok(event),
            }
        }
    }
}

impl<L: Link> Transport for HdlcTransport<L> {
    type Error = L::Error;

    fn connect(&mut self) -> Result<(), TransportError<Self::Error>> {
        self.link.connect()?;
        let snrm = self.connection.snrm_request().map_err(TransportError::Protocol)?;
        self.link.send(&snrm)?;
        match self.pump()? {
            LinkEvent::Connected(_) => Ok(()),
            _ => Err(TransportError::Protocol(Error::ProtocolError)),
        }
    }

    fn disconnect(&mut self) -> Result<(), TransportError<Self::Error>> {
        let disc = self.connection.disconnect_request().map_err(TransportError::Protocol)?;
        self.link.send(&disc)?;
        match self.pump() {
            Ok(LinkEvent::Disconnected) => {}
            // The peer may simply drop the socket instead of answering.
            Ok(_) | Err(TransportError::ConnectionClosed) | Err(TransportError::Timeout) => {}
            Err(e) => return Err(e),
        }
        self.link.disconnect()
    }

    fn send_apdu(&mut self, apdu: &[u8]) -> Result<(), TransportError<Self::Error>> {
        let frames = self.connection.send_information(apdu).map_err(TransportError::Protocol)?;
        let count = frames.len();
        for (index, frame) in frames.into_iter().enumerate() {
            self.link.send(&frame)?;
            if index + 1 < count {
                // wait for the RR before releasing the next segment
                match self.pump()? {
                    LinkEvent::Acknowledged => {}
                    _ => return Err(TransportError::Protocol(Error::ProtocolError)),
                }
            }
        }
        Ok(())
    }

    fn recv_apdu(&mut self) -> Result<Vec<u8>, TransportError<Self::Error>> {
        loop {
            match self.pump()? {
                LinkEvent::Information(payload)
                | LinkEvent::UnnumberedInformation(payload) => return Ok(payload),
                LinkEvent::Segment => {
                    let rr = self.connection.receive_ready();
                    self.link.send(&rr)?;
                }
                // Out-of-sequence frames are dropped; the peer
                // retransmits within its window.
                LinkEvent::Rejected { .. } => {}
                LinkEvent::Acknowledged => {}
                _ => return Err(TransportError::Protocol(Error::ProtocolError)),
            }
        }
    }

    fn set_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError<Self::Error>> {
        self.link.set_timeout(timeout)
    }
}
