//! Wrapper transport: APDUs framed by the 8-byte TCP/UDP wrapper header.
//!
//! Reads loop on the link until the full advertised length has been
//! drained; short TCP reads are routine and must never fail a decode.

use alloc::vec::Vec;
use core::time::Duration;

use super::{Link, Transport, TransportError};
use crate::error::Error;
use crate::wrapper::{WrapperHeader, WRAPPER_HEADER_LENGTH};

#[derive(Debug)]
pub struct WrapperTransport<L: Link> {
    link: L,
    client_wport: u16,
    server_wport: u16,
}

impl<L: Link> WrapperTransport<L> {
    /// `client_wport` is the client SAP (16 = public client);
    /// `server_wport` addresses the logical device (1 = management).
    pub fn new(link: L, client_wport: u16, server_wport: u16) -> Self {
        Self { link, client_wport, server_wport }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Read exactly `buffer.len()` bytes, looping over short reads.
    fn recv_exact(&mut self, buffer: &mut [u8]) -> Result<(), TransportError<L::Error>> {
        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.link.recv(&mut buffer[filled..])?;
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            filled += n;
        }
        Ok(())
    }
}

impl<L: Link> Transport for WrapperTransport<L> {
    type Error = L::Error;

    fn connect(&mut self) -> Result<(), TransportError<Self::Error>> {
        self.link.connect()
    }

    fn disconnect(&mut self) -> Result<(), TransportError<Self::Error>> {
        self.link.disconnect()
    }

    fn send_apdu(&mut self, apdu: &[u8]) -> Result<(), TransportError<Self::Error>> {
        let message = crate::wrapper::wrap(self.client_wport, self.server_wport, apdu);
        self.link.send(&message)
    }

    fn recv_apdu(&mut self) -> Result<Vec<u8>, TransportError<Self::Error>> {
        let mut header_bytes = [0u8; WRAPPER_HEADER_LENGTH];
        self.recv_exact(&mut header_bytes)?;
        let (_, header) = WrapperHeader::parse(&header_bytes)
            .map_err(|_| TransportError::Protocol(Error::Malformed))?;

        let mut payload = alloc::vec![0u8; header.length as usize];
        self.recv_exact(&mut payload)?;
        Ok(payload)
    }

    fn set_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<(), TransportError<Self::Error>> {
        self.link.set_timeout(timeout)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::collections::VecDeque;

    /// A scripted link: queued inbound chunks are handed out one per
    /// `recv` call, which is exactly how a congested TCP stream behaves.
    #[derive(Debug, Default)]
    pub(crate) struct MockLink {
        pub sent: Vec<Vec<u8>>,
        pub inbound: VecDeque<Vec<u8>>,
        pub connected: bool,
    }

    impl MockLink {
        pub fn queue(&mut self, chunk: &[u8]) {
            self.inbound.push_back(chunk.to_vec());
        }
    }

    impl Link for MockLink {
        type Error = ();

        fn connect(&mut self) -> Result<(), TransportError<()>> {
            self.connected = true;
            Ok(())
        }

        fn disconnect(&mut self) -> Result<(), TransportError<()>> {
            self.connected = false;
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<(), TransportError<()>> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn recv(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError<()>> {
            match self.inbound.front_mut() {
                Some(chunk) => {
                    let n = chunk.len().min(buffer.len());
                    buffer[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.inbound.pop_front();
                    }
                    Ok(n)
                }
                None => Err(TransportError::Timeout),
            }
        }

        fn set_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), TransportError<()>> {
            Ok(())
        }
    }

    #[test]
    fn test_send_prefixes_header() {
        let mut transport = WrapperTransport::new(MockLink::default(), 16, 1);
        transport.send_apdu(&[0xc0, 0x01, 0x81]).unwrap();
        assert_eq!(
            transport.link_mut().sent[0],
            [0x00, 0x01, 0x00, 0x10, 0x00, 0x01, 0x00, 0x03, 0xc0, 0x01, 0x81]
        );
    }

    #[test]
    fn test_recv_assembles_partial_reads() {
        // 200-byte payload delivered as 64 + 64 + 72 after the header.
        let payload: Vec<u8> = (0..200u8).collect();
        let mut message = WrapperHeader::new(1, 16, 200).encode().to_vec();
        message.extend_from_slice(&payload);

        let mut link = MockLink::default();
        link.queue(&message[..8]);
        link.queue(&message[8..72]);
        link.queue(&message[72..136]);
        link.queue(&message[136..]);

        let mut transport = WrapperTransport::new(link, 16, 1);
        assert_eq!(transport.recv_apdu().unwrap(), payload);
    }

    #[test]
    fn test_recv_single_read() {
        let mut message = WrapperHeader::new(1, 16, 3).encode().to_vec();
        message.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
        let mut link = MockLink::default();
        link.queue(&message);

        let mut transport = WrapperTransport::new(link, 16, 1);
        assert_eq!(transport.recv_apdu().unwrap(), [0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_recv_closed_midway() {
        let mut link = MockLink::default();
        link.queue(&[0x00, 0x01, 0x00]);
        // stream ends here
        link.inbound.push_back(Vec::new());

        let mut transport = WrapperTransport::new(link, 16, 1);
        assert!(matches!(
            transport.recv_apdu(),
            Err(TransportError::ConnectionClosed | TransportError::Timeout)
        ));
    }

    #[test]
    fn test_recv_bad_version() {
        let mut link = MockLink::default();
        link.queue(&[0x00, 0x02, 0x00, 0x10, 0x00, 0x01, 0x00, 0x00]);
        let mut transport = WrapperTransport::new(link, 16, 1);
        assert_eq!(
            transport.recv_apdu(),
            Err(TransportError::Protocol(Error::Malformed))
        );
    }
}
