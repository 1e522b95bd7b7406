//! Client-side HDLC link state machine.
//!
//! Owns the modulo-8 send/receive state variables, the SNRM/UA
//! negotiation, outbound segmentation and inbound reassembly. Bytes go in
//! through [`HdlcConnection::receive_data`]; [`HdlcConnection::next_event`]
//! hunts for a complete flag-delimited frame, validates it against the
//! current state and hands back a [`LinkEvent`]. An I-frame whose N(S)
//! does not match V(R) is dropped and surfaced as [`LinkEvent::Rejected`];
//! it is never delivered upstream.

use alloc::vec::Vec;

use super::address::HdlcAddress;
use super::frame::{Control, HdlcFrame, HDLC_FLAG};
use super::{LLC_COMMAND_HEADER, LLC_RESPONSE_HEADER};
use crate::error::Error;

/// Negotiable link parameters, carried in the SNRM/UA information field
/// as parameter group `81 80`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdlcParameters {
    pub max_info_transmit: u16,
    pub max_info_receive: u16,
    pub window_transmit: u32,
    pub window_receive: u32,
}

impl Default for HdlcParameters {
    fn default() -> Self {
        Self {
            max_info_transmit: 128,
            max_info_receive: 128,
            window_transmit: 1,
            window_receive: 1,
        }
    }
}

impl HdlcParameters {
    const FORMAT_IDENTIFIER: u8 = 0x81;
    const GROUP_IDENTIFIER: u8 = 0x80;

    const MAX_INFO_TRANSMIT_TAG: u8 = 5;
    const MAX_INFO_RECEIVE_TAG: u8 = 6;
    const WINDOW_TRANSMIT_TAG: u8 = 7;
    const WINDOW_RECEIVE_TAG: u8 = 8;

    #[cfg(feature = "encode")]
    pub fn encode(&self) -> Vec<u8> {
        fn push_u16_param(buf: &mut Vec<u8>, tag: u8, value: u16) {
            buf.push(tag);
            if value <= 0xff {
                buf.push(1);
                buf.push(value as u8);
            } else {
                buf.push(2);
                buf.extend_from_slice(&value.to_be_bytes());
            }
        }

        let mut group = Vec::new();
        push_u16_param(&mut group, Self::MAX_INFO_TRANSMIT_TAG, self.max_info_transmit);
        push_u16_param(&mut group, Self::MAX_INFO_RECEIVE_TAG, self.max_info_receive);
        group.push(Self::WINDOW_TRANSMIT_TAG);
        group.push(4);
        group.extend_from_slice(&self.window_transmit.to_be_bytes());
        group.push(Self::WINDOW_RECEIVE_TAG);
        group.push(4);
        group.extend_from_slice(&self.window_receive.to_be_bytes());

        let mut buf = Vec::with_capacity(group.len() + 3);
        buf.push(Self::FORMAT_IDENTIFIER);
        buf.push(Self::GROUP_IDENTIFIER);
        buf.push(group.len() as u8);
        buf.extend_from_slice(&group);
        buf
    }

    /// Parse a parameter group; fields the peer omits keep their
    /// defaults.
    pub fn parse(information: &[u8]) -> Result<Self, Error> {
        if information.len() < 3
            || information[0] != Self::FORMAT_IDENTIFIER
            || information[1] != Self::GROUP_IDENTIFIER
        {
            return Err(Error::Malformed);
        }
        let group_len = information[2] as usize;
        let mut group = information.get(3..3 + group_len).ok_or(Error::Malformed)?;

        let mut parameters = Self::default();
        while !group.is_empty() {
            if group.len() < 2 {
                return Err(Error::Malformed);
            }
            let tag = group[0];
            let len = group[1] as usize;
            let value = group.get(2..2 + len).ok_or(Error::Malformed)?;
            group = &group[2 + len..];

            let as_u32 = {
                let mut acc = 0u32;
                if value.len() > 4 {
                    return Err(Error::Malformed);
                }
                for &byte in value {
                    acc = (acc << 8) | byte as u32;
                }
                acc
            };
            match tag {
                Self::MAX_INFO_TRANSMIT_TAG => parameters.max_info_transmit = as_u32 as u16,
                Self::MAX_INFO_RECEIVE_TAG => parameters.max_info_receive = as_u32 as u16,
                Self::WINDOW_TRANSMIT_TAG => parameters.window_transmit = as_u32,
                Self::WINDOW_RECEIVE_TAG => parameters.window_receive = as_u32,
                _ => {}
            }
        }
        Ok(parameters)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    AwaitingConnection,
    Idle,
    AwaitingResponse,
    AwaitingDisconnect,
}

/// What the link layer produced for one received frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// No complete frame in the buffer yet.
    NeedData,
    /// UA accepted our SNRM; the link is up with these parameters.
    Connected(HdlcParameters),
    /// The peer acknowledged our last I-frame (RR); send the next
    /// segment.
    Acknowledged,
    /// A segment of a larger response arrived; acknowledge with
    /// [`HdlcConnection::receive_ready`] to solicit the next one.
    Segment,
    /// A complete reassembled DLMS payload, LLC header stripped.
    Information(Vec<u8>),
    /// A connectionless UI payload, LLC header stripped.
    UnnumberedInformation(Vec<u8>),
    /// An out-of-sequence I-frame was discarded.
    Rejected { expected_ns: u8 },
    /// UA answered our DISC; the link is down.
    Disconnected,
}

#[derive(Debug)]
pub struct HdlcConnection {
    client_address: HdlcAddress,
    server_address: HdlcAddress,
    proposed: HdlcParameters,
    negotiated: HdlcParameters,
    state: LinkState,
    /// V(S): sequence number of the next I-frame we send.
    send_sequence: u8,
    /// V(R): sequence number we expect on the next received I-frame.
    receive_sequence: u8,
    buffer: Vec<u8>,
    buffer_search_position: usize,
    reassembly: Vec<u8>,
}

impl HdlcConnection {
    pub fn new(client_address: HdlcAddress, server_address: HdlcAddress) -> Self {
        Self::with_parameters(client_address, server_address, HdlcParameters::default())
    }

    pub fn with_parameters(
        client_address: HdlcAddress,
        server_address: HdlcAddress,
        proposed: HdlcParameters,
    ) -> Self {
        Self {
            client_address,
            server_address,
            proposed,
            negotiated: HdlcParameters::default(),
            state: LinkState::Disconnected,
            send_sequence: 0,
            receive_sequence: 0,
            buffer: Vec::new(),
            buffer_search_position: 1,
            reassembly: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn negotiated(&self) -> &HdlcParameters {
        &self.negotiated
    }

    /// V(S), the next send sequence number.
    pub fn send_sequence(&self) -> u8 {
        self.send_sequence
    }

    /// V(R), the next expected receive sequence number.
    pub fn receive_sequence(&self) -> u8 {
        self.receive_sequence
    }

    /// SNRM opening the link. Proposed parameters ride in the
    /// information field only when they differ from the defaults.
    #[cfg(feature = "encode")]
    pub fn snrm_request(&mut self) -> Result<Vec<u8>, Error> {
        if self.state != LinkState::Disconnected {
            return Err(Error::PreconditionFailed);
        }
        let mut frame = HdlcFrame::new(self.server_address, self.client_address, Control::Snrm);
        if self.proposed != HdlcParameters::default() {
            frame.information = self.proposed.encode();
        }
        self.state = LinkState::AwaitingConnection;
        Ok(frame.encode())
    }

    #[cfg(feature = "encode")]
    pub fn disconnect_request(&mut self) -> Result<Vec<u8>, Error> {
        if self.state != LinkState::Idle {
            return Err(Error::PreconditionFailed);
        }
        self.state = LinkState::AwaitingDisconnect;
        Ok(HdlcFrame::new(self.server_address, self.client_address, Control::Disc).encode())
    }

    /// Wrap a DLMS payload into one or more I-frames. All but the last
    /// carry the segmentation bit; the frames must be sent in order, each
    /// non-final one acknowledged by the peer (RR) before the next goes
    /// out.
    #[cfg(feature = "encode")]
    pub fn send_information(&mut self, payload: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        if self.state != LinkState::Idle {
            return Err(Error::PreconditionFailed);
        }

        let mut stream = Vec::with_capacity(LLC_COMMAND_HEADER.len() + payload.len());
        stream.extend_from_slice(&LLC_COMMAND_HEADER);
        stream.extend_from_slice(payload);

        let chunk_size = (self.negotiated.max_info_transmit as usize).max(1);
        let chunks: Vec<&[u8]> = stream.chunks(chunk_size).collect();
        let mut frames = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let last = index == chunks.len() - 1;
            let frame = HdlcFrame::with_information(
                self.server_address,
                self.client_address,
                Control::Information {
                    ns: self.send_sequence,
                    nr: self.receive_sequence,
                    final_bit: last,
                },
                !last,
                chunk.to_vec(),
            );
            self.send_sequence = (self.send_sequence + 1) % 8;
            frames.push(frame.encode());
        }

        self.reassembly.clear();
        self.state = LinkState::AwaitingResponse;
        Ok(frames)
    }

    /// RR acknowledging everything up to V(R).
    #[cfg(feature = "encode")]
    pub fn receive_ready(&self) -> Vec<u8> {
        HdlcFrame::new(
            self.server_address,
            self.client_address,
            Control::ReceiveReady { nr: self.receive_sequence },
        )
        .encode()
    }

    pub fn receive_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn next_event(&mut self) -> Result<LinkEvent, Error> {
        let frame_bytes = match self.find_frame() {
            Some(bytes) => bytes,
            None => return Ok(LinkEvent::NeedData),
        };

        let frame = match HdlcFrame::parse(&frame_bytes) {
            Ok(frame) => frame,
            // A 0x7E inside the information field produces a bogus
            // candidate; keep searching for the real closing flag.
            Err(_) => return Ok(LinkEvent::NeedData),
        };
        self.tidy_buffer();

        match (self.state, frame.control) {
            (LinkState::AwaitingConnection, Control::Ua) => {
                self.negotiated = if frame.information.is_empty() {
                    HdlcParameters::default()
                } else {
                    HdlcParameters::parse(&frame.information)?
                };
                self.send_sequence = 0;
                self.receive_sequence = 0;
                self.state = LinkState::Idle;
                Ok(LinkEvent::Connected(self.negotiated))
            }
            (LinkState::AwaitingConnection, Control::Dm) => {
                self.state = LinkState::Disconnected;
                Err(Error::ProtocolError)
            }
            (LinkState::AwaitingDisconnect, Control::Ua | Control::Dm) => {
                self.state = LinkState::Disconnected;
                Ok(LinkEvent::Disconnected)
            }
            (LinkState::AwaitingResponse, Control::Information { ns, .. }) => {
                if ns != self.receive_sequence {
                    return Ok(LinkEvent::Rejected { expected_ns: self.receive_sequence });
                }
                self.receive_sequence = (self.receive_sequence + 1) % 8;

                if self.reassembly.is_empty() {
                    self.reassembly.extend_from_slice(strip_llc(&frame.information)?);
                } else {
                    self.reassembly.extend_from_slice(&frame.information);
                }

                if frame.segmented {
                    Ok(LinkEvent::Segment)
                } else {
                    self.state = LinkState::Idle;
                    Ok(LinkEvent::Information(core::mem::take(&mut self.reassembly)))
                }
            }
            (LinkState::AwaitingResponse, Control::ReceiveReady { .. }) => {
                Ok(LinkEvent::Acknowledged)
            }
            (_, Control::UnnumberedInformation { .. }) => {
                Ok(LinkEvent::UnnumberedInformation(strip_llc(&frame.information)?.to_vec()))
            }
            (_, Control::FrameReject) | (_, Control::Reject { .. }) => Err(Error::ProtocolError),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Locate the next flag-delimited frame candidate. Keeps the search
    /// position so a flag byte inside frame data extends the candidate
    /// instead of looping forever.
    fn find_frame(&mut self) -> Option<Vec<u8>> {
        let end = self.buffer[self.buffer_search_position.min(self.buffer.len())..]
            .iter()
            .position(|&b| b == HDLC_FLAG)?
            + self.buffer_search_position
            + 1;

        self.buffer_search_position = end;
        let mut frame = self.buffer[..end].to_vec();
        if frame.first() != Some(&HDLC_FLAG) {
            // Back-to-back frames may share a single separating flag.
            frame.insert(0, HDLC_FLAG);
        }
        Some(frame)
    }

    fn tidy_buffer(&mut self) {
        self.buffer.drain(..self.buffer_search_position);
        self.buffer_search_position = 1;
    }
}

/// Drop the 3-byte LLC header in front of a DLMS payload.
fn strip_llc(information: &[u8]) -> Result<&[u8], Error> {
    if information.len() < 3 {
        return Err(Error::Malformed);
    }
    let (header, payload) = information.split_at(3);
    if header == LLC_RESPONSE_HEADER || header == LLC_COMMAND_HEADER {
        Ok(payload)
    } else {
        Err(Error::Malformed)
    }
}

#[cfg(all(test, feature = "encode"))]
mod tests {
    use super::*;

    fn client() -> HdlcAddress {
        HdlcAddress::client(16)
    }

    fn server() -> HdlcAddress {
        HdlcAddress::server(1, Some(17))
    }

    fn connected() -> HdlcConnection {
        let mut connection = HdlcConnection::new(client(), server());
        connection.snrm_request().unwrap();
        let ua = HdlcFrame::new(client(), server(), Control::Ua).encode();
        connection.receive_data(&ua);
        assert!(matches!(connection.next_event().unwrap(), LinkEvent::Connected(_)));
        connection
    }

    /// A server I-frame opening a payload (LLC header included).
    fn server_response(ns: u8, nr: u8, segmented: bool, payload: &[u8]) -> Vec<u8> {
        let mut information = Vec::new();
        information.extend_from_slice(&LLC_RESPONSE_HEADER);
        information.extend_from_slice(payload);
        HdlcFrame::with_information(
            client(),
            server(),
            Control::Information { ns, nr, final_bit: !segmented },
            segmented,
            information,
        )
        .encode()
    }

    #[test]
    fn test_snrm_ua_handshake_with_negotiation() {
        let mut connection = HdlcConnection::new(client(), server());
        let snrm = connection.snrm_request().unwrap();
        assert_eq!(snrm, [0x7e, 0xa0, 0x08, 0x02, 0x23, 0x21, 0x93, 0xbd, 0x64, 0x7e]);
        assert_eq!(connection.state(), LinkState::AwaitingConnection);

        // Captured UA negotiating max-info 154/154, windows 1/1.
        let ua: [u8; 33] = [
            0x7e, 0xa0, 0x1f, 0x21, 0x02, 0x23, 0x73, 0xe6, 0xc7, 0x81, 0x80, 0x12, 0x05, 0x01,
            0x9a, 0x06, 0x01, 0x9a, 0x07, 0x04, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00,
            0x00, 0x01, 0xcc, 0xa2, 0x7e,
        ];
        connection.receive_data(&ua);
        match connection.next_event().unwrap() {
            LinkEvent::Connected(parameters) => {
                assert_eq!(parameters.max_info_transmit, 154);
                assert_eq!(parameters.max_info_receive, 154);
                assert_eq!(parameters.window_transmit, 1);
                assert_eq!(parameters.window_receive, 1);
            }
            other => panic!("expected Connected, got {:?}", other),
        }
        assert_eq!(connection.state(), LinkState::Idle);
    }

    #[test]
    fn test_snrm_refused_by_dm() {
        let mut connection = HdlcConnection::new(client(), server());
        connection.snrm_request().unwrap();
        connection.receive_data(&HdlcFrame::new(client(), server(), Control::Dm).encode());
        assert_eq!(connection.next_event(), Err(Error::ProtocolError));
        assert_eq!(connection.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_information_exchange() {
        let mut connection = connected();
        let frames = connection.send_information(&[0xc0, 0x01, 0x81]).unwrap();
        assert_eq!(frames.len(), 1);
        let sent = HdlcFrame::parse(&frames[0]).unwrap();
        assert_eq!(
            sent.control,
            Control::Information { ns: 0, nr: 0, final_bit: true }
        );
        assert_eq!(&sent.information[..3], &LLC_COMMAND_HEADER);

        connection.receive_data(&server_response(0, 1, false, &[0xc4, 0x01, 0x81, 0x00, 0x00]));
        match connection.next_event().unwrap() {
            LinkEvent::Information(payload) => {
                assert_eq!(payload, [0xc4, 0x01, 0x81, 0x00, 0x00])
            }
            other => panic!("expected Information, got {:?}", other),
        }
        assert_eq!(connection.state(), LinkState::Idle);
    }

    #[test]
    fn test_send_sequence_wraps_mod_8() {
        let mut connection = connected();
        for exchange in 0..10u8 {
            let frames = connection.send_information(&[exchange]).unwrap();
            let frame = HdlcFrame::parse(&frames[0]).unwrap();
            match frame.control {
                Control::Information { ns, .. } => assert_eq!(ns, exchange % 8),
                other => panic!("expected I-frame, got {:?}", other),
            }
            connection.receive_data(&server_response(
                exchange % 8,
                (exchange + 1) % 8,
                false,
                &[0xaa],
            ));
            assert!(matches!(connection.next_event().unwrap(), LinkEvent::Information(_)));
        }
        assert_eq!(connection.send_sequence(), 10 % 8);
    }

    #[test]
    fn test_out_of_sequence_frame_rejected() {
        let mut connection = connected();
        connection.send_information(&[0x01]).unwrap();

        // Server claims N(S)=5, we expect 0: drop it, nothing delivered.
        connection.receive_data(&server_response(5, 1, false, &[0xbb]));
        assert_eq!(
            connection.next_event().unwrap(),
            LinkEvent::Rejected { expected_ns: 0 }
        );
        assert_eq!(connection.receive_sequence(), 0);

        // The in-sequence retransmission goes through.
        connection.receive_data(&server_response(0, 1, false, &[0xbb]));
        assert!(matches!(connection.next_event().unwrap(), LinkEvent::Information(_)));
    }

    #[test]
    fn test_outbound_segmentation() {
        let mut connection = connected();
        // 300-byte APDU against the default 128-byte info field: LLC + 300
        // = 303 bytes -> 3 frames.
        let payload = vec![0x5a; 300];
        let frames = connection.send_information(&payload).unwrap();
        assert_eq!(frames.len(), 3);

        let parsed: Vec<HdlcFrame> =
            frames.iter().map(|f| HdlcFrame::parse(f).unwrap()).collect();
        assert!(parsed[0].segmented);
        assert!(parsed[1].segmented);
        assert!(!parsed[2].segmented);
        match (parsed[0].control, parsed[1].control, parsed[2].control) {
            (
                Control::Information { ns: 0, final_bit: false, .. },
                Control::Information { ns: 1, final_bit: false, .. },
                Control::Information { ns: 2, final_bit: true, .. },
            ) => {}
            other => panic!("unexpected control fields: {:?}", other),
        }

        let total: usize = parsed.iter().map(|f| f.information.len()).sum();
        assert_eq!(total, 303);
    }

    #[test]
    fn test_inbound_reassembly() {
        let mut connection = connected();
        connection.send_information(&[0xc0]).unwrap();

        let part1 = server_response(0, 1, true, &[0x01, 0x02]);
        connection.receive_data(&part1);
        assert_eq!(connection.next_event().unwrap(), LinkEvent::Segment);

        // Client asks for the next segment.
        let rr = HdlcFrame::parse(&connection.receive_ready()).unwrap();
        assert_eq!(rr.control, Control::ReceiveReady { nr: 1 });

        // Continuation segments carry no LLC header.
        let part2 = HdlcFrame::with_information(
            client(),
            server(),
            Control::Information { ns: 1, nr: 1, final_bit: true },
            false,
            vec![0x03, 0x04],
        )
        .encode();
        connection.receive_data(&part2);
        assert_eq!(
            connection.next_event().unwrap(),
            LinkEvent::Information(vec![0x01, 0x02, 0x03, 0x04])
        );
    }

    #[test]
    fn test_rr_acknowledges_outbound_segment() {
        let mut connection = connected();
        connection.send_information(&vec![0x00; 200]).unwrap();
        let rr = HdlcFrame::new(client(), server(), Control::ReceiveReady { nr: 1 }).encode();
        connection.receive_data(&rr);
        assert_eq!(connection.next_event().unwrap(), LinkEvent::Acknowledged);
    }

    #[test]
    fn test_ui_frame_passes_without_sequencing() {
        let mut connection = connected();
        let mut information = LLC_RESPONSE_HEADER.to_vec();
        information.extend_from_slice(&[0x0f, 0, 0, 0, 1, 0, 0x11, 0x05]);
        let ui = HdlcFrame::with_information(
            client(),
            server(),
            Control::UnnumberedInformation { final_bit: true },
            false,
            information,
        )
        .encode();
        connection.receive_data(&ui);
        assert_eq!(
            connection.next_event().unwrap(),
            LinkEvent::UnnumberedInformation(vec![0x0f, 0, 0, 0, 1, 0, 0x11, 0x05])
        );
        assert_eq!(connection.receive_sequence(), 0);
    }

    #[test]
    fn test_partial_frame_needs_data() {
        let mut connection = connected();
        connection.send_information(&[0x01]).unwrap();
        let full = server_response(0, 1, false, &[0xcc]);
        connection.receive_data(&full[..5]);
        assert_eq!(connection.next_event().unwrap(), LinkEvent::NeedData);
        connection.receive_data(&full[5..]);
        assert!(matches!(connection.next_event().unwrap(), LinkEvent::Information(_)));
    }

    #[test]
    fn test_disconnect_handshake() {
        let mut connection = connected();
        let disc = connection.disconnect_request().unwrap();
        let parsed = HdlcFrame::parse(&disc).unwrap();
        assert_eq!(parsed.control, Control::Disc);

        connection.receive_data(&HdlcFrame::new(client(), server(), Control::Ua).encode());
        assert_eq!(connection.next_event().unwrap(), LinkEvent::Disconnected);
        assert_eq!(connection.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_parameters_group_roundtrip() {
        let parameters = HdlcParameters {
            max_info_transmit: 1024,
            max_info_receive: 500,
            window_transmit: 1,
            window_receive: 1,
        };
        let encoded = parameters.encode();
        assert_eq!(encoded[0], 0x81);
        assert_eq!(encoded[1], 0x80);
        assert_eq!(HdlcParameters::parse(&encoded).unwrap(), parameters);
    }
}
