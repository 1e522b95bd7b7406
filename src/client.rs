//! Synchronous DLMS client: the connection state machine glued to a
//! transport.
//!
//! Every operation is one or more blocking request/response round trips;
//! the only suspension points are the transport reads. Block transfers
//! are plain loops: GET keeps acknowledging blocks with
//! GET-Request-Next until the last one arrives, SET partitions the
//! encoded value into chunks sized to the negotiated PDU and sends them
//! one acknowledged block at a time.

use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use crate::action::{ActionRequest, ActionResponse, ActionResult};
use crate::apdu::Apdu;
use crate::association::{AssociationResult, Conformance, Rlre};
use crate::connection::{ConnectionSettings, DlmsConnection};
use crate::cosem::{
    class_id, CosemAttribute, CosemMethod, CLOCK_OBJECT, CLOCK_TIME_ATTRIBUTE,
    PROFILE_BUFFER_ATTRIBUTE,
};
use crate::data::{Data, DateTime};
use crate::error::Error;
use crate::get::{
    AccessSelector, AttributeWithSelection, DataAccessResult, GetDataBlockResult, GetDataResult,
    GetRequest, GetResponse,
};
use crate::notification::DataNotification;
use crate::obis::ObisCode;
use crate::security::SYSTEM_TITLE_LENGTH;
use crate::selective_access::RangeDescriptor;
use crate::set::{DataBlock, SetRequest, SetResponse};
use crate::transport::{Transport, TransportError};

/// Framing headroom subtracted from the negotiated PDU size when
/// partitioning SET block transfers: request header, block bookkeeping
/// and ciphering overhead.
const SET_BLOCK_OVERHEAD: usize = 40;

#[derive(Debug, PartialEq)]
pub enum ClientError<E> {
    Transport(TransportError<E>),
    Dlms(Error),
}

impl<E> From<Error> for ClientError<E> {
    fn from(e: Error) -> Self {
        ClientError::Dlms(e)
    }
}

impl<E> From<TransportError<E>> for ClientError<E> {
    fn from(e: TransportError<E>) -> Self {
        match e {
            // A transport deadline is part of the protocol taxonomy: the
            // session is undefined afterwards.
            TransportError::Timeout => ClientError::Dlms(Error::Timeout),
            other => ClientError::Transport(other),
        }
    }
}

impl<E: fmt::Display> fmt::Display for ClientError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(e) => write!(f, "transport: {}", e),
            ClientError::Dlms(e) => write!(f, "dlms: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug + fmt::Display> std::error::Error for ClientError<E> {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub connection: ConnectionSettings,
    /// Override for the SET block chunk size; derived from the
    /// negotiated PDU size when absent.
    pub set_block_size: Option<usize>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self { connection: ConnectionSettings::default(), set_block_size: None }
    }
}

/// What an accepted association negotiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationSummary {
    pub result: AssociationResult,
    pub negotiated_conformance: Conformance,
    pub max_pdu_size: u16,
    pub server_system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
}

#[derive(Debug)]
pub struct DlmsClient<T: Transport> {
    transport: T,
    connection: DlmsConnection,
    set_block_size: Option<usize>,
}

impl<T: Transport> DlmsClient<T> {
    pub fn new(transport: T, settings: ClientSettings) -> Result<Self, ClientError<T::Error>> {
        Ok(Self {
            transport,
            connection: DlmsConnection::new(settings.connection)?,
            set_block_size: settings.set_block_size,
        })
    }

    /// A client over a pre-established association: no AARQ/AARE, no
    /// release.
    pub fn pre_established(
        transport: T,
        settings: ClientSettings,
        conformance: Conformance,
        server_system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    ) -> Result<Self, ClientError<T::Error>> {
        Ok(Self {
            transport,
            connection: DlmsConnection::pre_established(
                settings.connection,
                conformance,
                server_system_title,
            )?,
            set_block_size: settings.set_block_size,
        })
    }

    pub fn connection(&self) -> &DlmsConnection {
        &self.connection
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the transport (TCP connect / SNRM).
    pub fn connect(&mut self) -> Result<(), ClientError<T::Error>> {
        self.transport.connect().map_err(Into::into)
    }

    /// Close the transport. Distinct from [`Self::release_association`]:
    /// this tears the socket down.
    pub fn disconnect(&mut self) -> Result<(), ClientError<T::Error>> {
        self.transport.disconnect().map_err(Into::into)
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ClientError<T::Error>> {
        self.transport.set_timeout(timeout).map_err(Into::into)
    }

    fn exchange(&mut self, bytes: Vec<u8>) -> Result<Apdu, ClientError<T::Error>> {
        self.transport.send_apdu(&bytes)?;
        let reply = self.transport.recv_apdu()?;
        Ok(self.connection.receive(&reply)?)
    }

    /// Establish the application association, running the HLS challenge
    /// exchange when the profile demands it.
    pub fn associate(&mut self) -> Result<AssociationSummary, ClientError<T::Error>> {
        let aarq = self.connection.aarq()?;
        let apdu = self.exchange(aarq)?;
        let result = match apdu {
            Apdu::Aare(ref aare) => aare.result,
            _ => return Err(ClientError::Dlms(Error::ProtocolError)),
        };

        if self.connection.hls_pending() {
            let reply = self.connection.hls_reply()?;
            // receive() verifies f(CtoS) and fails the association on a
            // bad tag
            self.exchange(reply)?;
        }

        Ok(AssociationSummary {
            result,
            negotiated_conformance: self.connection.negotiated_conformance(),
            max_pdu_size: self.connection.max_pdu_size(),
            server_system_title: self.connection.server_system_title(),
        })
    }

    /// Graceful release; the transport stays open.
    pub fn release_association(&mut self) -> Result<Rlre, ClientError<T::Error>> {
        let rlrq = self.connection.rlrq()?;
        match self.exchange(rlrq)? {
            Apdu::Rlre(rlre) => Ok(rlre),
            _ => Err(ClientError::Dlms(Error::ProtocolError)),
        }
    }

    /// Read one attribute, following block transfers transparently.
    pub fn get(
        &mut self,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
    ) -> Result<Data, ClientError<T::Error>> {
        match self.get_internal(attribute, access_selection)? {
            GetPayload::Value(data) => Ok(data),
            GetPayload::Raw(raw) => {
                let (data, _) = Data::from_bytes(&raw)?;
                Ok(data)
            }
        }
    }

    /// Read one attribute and keep the reassembled encoding instead of
    /// parsing it.
    pub fn get_raw(
        &mut self,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
    ) -> Result<Vec<u8>, ClientError<T::Error>> {
        match self.get_internal(attribute, access_selection)? {
            GetPayload::Value(data) => Ok(data.encode()),
            GetPayload::Raw(raw) => Ok(raw),
        }
    }

    fn get_internal(
        &mut self,
        attribute: CosemAttribute,
        access_selection: Option<AccessSelector>,
    ) -> Result<GetPayload, ClientError<T::Error>> {
        let invoke_id = self.connection.next_invoke_id();
        let request = Apdu::GetRequest(GetRequest::Normal {
            invoke_id,
            attribute,
            access_selection,
        });
        let bytes = self.connection.request(&request)?;
        let mut response = self.exchange(bytes)?;

        let mut assembled: Vec<u8> = Vec::new();
        loop {
            match response {
                Apdu::GetResponse(GetResponse::Normal { result, .. }) => {
                    return match result {
                        GetDataResult::Data(data) => Ok(GetPayload::Value(data)),
                        GetDataResult::DataAccessError(error) => {
                            Err(ClientError::Dlms(Error::ServiceError(error)))
                        }
                    };
                }
                Apdu::GetResponse(GetResponse::WithDataBlock {
                    last_block,
                    block_number,
                    result,
                    ..
                }) => {
                    match result {
                        GetDataBlockResult::RawData(raw) => assembled.extend_from_slice(&raw),
                        GetDataBlockResult::DataAccessError(error) => {
                            return Err(ClientError::Dlms(Error::ServiceError(error)))
                        }
                    }
                    if last_block {
                        let plain = self.connection.unwrap_reassembled(&assembled)?;
                        return Ok(GetPayload::Raw(plain));
                    }
                    let next = Apdu::GetRequest(GetRequest::Next {
                        invoke_id,
                        block_number: block_number + 1,
                    });
                    let bytes = self.connection.request(&next)?;
                    response = self.exchange(bytes)?;
                }
                _ => return Err(ClientError::Dlms(Error::ProtocolError)),
            }
        }
    }

    /// GET.WITH_LIST: one round trip, one result per attribute.
    pub fn get_with_list(
        &mut self,
        attributes: &[CosemAttribute],
    ) -> Result<Vec<Result<Data, DataAccessResult>>, ClientError<T::Error>> {
        let invoke_id = self.connection.next_invoke_id();
        let request = Apdu::GetRequest(GetRequest::WithList {
            invoke_id,
            attributes: attributes
                .iter()
                .map(|&attribute| AttributeWithSelection::from(attribute))
                .collect(),
        });
        let bytes = self.connection.request(&request)?;
        match self.exchange(bytes)? {
            Apdu::GetResponse(GetResponse::WithList { results, .. }) => Ok(results
                .into_iter()
                .map(|result| match result {
                    GetDataResult::Data(data) => Ok(data),
                    GetDataResult::DataAccessError(error) => Err(error),
                })
                .collect()),
            _ => Err(ClientError::Dlms(Error::ProtocolError)),
        }
    }

    /// Write one attribute, partitioning into acknowledged blocks when
    /// the encoded value exceeds the negotiated PDU size.
    pub fn set(
        &mut self,
        attribute: CosemAttribute,
        value: Data,
        access_selection: Option<AccessSelector>,
    ) -> Result<(), ClientError<T::Error>> {
        let encoded = value.encode();
        let chunk_size = self
            .set_block_size
            .unwrap_or((self.connection.max_pdu_size() as usize).saturating_sub(SET_BLOCK_OVERHEAD))
            .max(1);

        if encoded.len() <= chunk_size {
            let invoke_id = self.connection.next_invoke_id();
            let request = Apdu::SetRequest(SetRequest::Normal {
                invoke_id,
                attribute,
                access_selection,
                value,
            });
            let bytes = self.connection.request(&request)?;
            return match self.exchange(bytes)? {
                Apdu::SetResponse(SetResponse::Normal { result, .. }) => access_result(result),
                _ => Err(ClientError::Dlms(Error::ProtocolError)),
            };
        }

        // Block transfer: first chunk with the descriptor, the rest bare.
        let invoke_id = self.connection.next_invoke_id();
        let chunks: Vec<&[u8]> = encoded.chunks(chunk_size).collect();
        let total = chunks.len();

        for (index, chunk) in chunks.iter().enumerate() {
            let block_number = (index + 1) as u32;
            let last_block = index + 1 == total;
            let block = DataBlock { last_block, block_number, raw_data: chunk.to_vec() };
            let request = if index == 0 {
                Apdu::SetRequest(SetRequest::WithFirstBlock {
                    invoke_id,
                    attribute,
                    access_selection: access_selection.clone(),
                    block,
                })
            } else {
                Apdu::SetRequest(SetRequest::WithBlock { invoke_id, block })
            };
            let bytes = self.connection.request(&request)?;

            match self.exchange(bytes)? {
                Apdu::SetResponse(SetResponse::DataBlock { .. }) if !last_block => {
                    // the connection already checked the block number
                }
                Apdu::SetResponse(SetResponse::Normal { result, .. }) if last_block => {
                    return access_result(result)
                }
                Apdu::SetResponse(SetResponse::LastDataBlock { result, .. }) if last_block => {
                    return access_result(result)
                }
                _ => return Err(ClientError::Dlms(Error::ProtocolError)),
            }
        }
        // chunks() never yields an empty iterator for a non-empty value
        Err(ClientError::Dlms(Error::ProtocolError))
    }

    /// Invoke a method; returns the optional return parameter.
    pub fn action(
        &mut self,
        method: CosemMethod,
        parameters: Option<Data>,
    ) -> Result<Option<Data>, ClientError<T::Error>> {
        let invoke_id = self.connection.next_invoke_id();
        let request = Apdu::ActionRequest(ActionRequest::Normal { invoke_id, method, parameters });
        let bytes = self.connection.request(&request)?;
        match self.exchange(bytes)? {
            Apdu::ActionResponse(ActionResponse::Normal { result, return_parameters, .. }) => {
                if result != ActionResult::Success {
                    let code = DataAccessResult::from_u8(result as u8)
                        .unwrap_or(DataAccessResult::OtherReason);
                    return Err(ClientError::Dlms(Error::ServiceError(code)));
                }
                match return_parameters {
                    Some(GetDataResult::Data(data)) => Ok(Some(data)),
                    Some(GetDataResult::DataAccessError(error)) => {
                        Err(ClientError::Dlms(Error::ServiceError(error)))
                    }
                    None => Ok(None),
                }
            }
            _ => Err(ClientError::Dlms(Error::ProtocolError)),
        }
    }

    /// Decode an unsolicited DataNotification delivered out of band (UI
    /// frame, UDP datagram). Handles glo-ciphered notifications.
    pub fn receive_data_notification(
        &mut self,
        bytes: &[u8],
    ) -> Result<DataNotification, ClientError<T::Error>> {
        match self.connection.receive(bytes)? {
            Apdu::DataNotification(notification) => Ok(notification),
            _ => Err(ClientError::Dlms(Error::ProtocolError)),
        }
    }

    /// Read the meter clock (class 8, attribute 2).
    pub fn read_clock(&mut self) -> Result<DateTime, ClientError<T::Error>> {
        let attribute =
            CosemAttribute::new(class_id::CLOCK, CLOCK_OBJECT, CLOCK_TIME_ATTRIBUTE);
        match self.get(attribute, None)? {
            Data::DateTime(date_time) => Ok(date_time),
            // many meters deliver the clock as a 12-byte octet-string
            Data::OctetString(raw) if raw.len() == 12 => DateTime::parse(&raw)
                .map(|(_, date_time)| date_time)
                .map_err(|_| ClientError::Dlms(Error::Malformed)),
            _ => Err(ClientError::Dlms(Error::Malformed)),
        }
    }

    /// Read a ProfileGeneric buffer restricted by a range descriptor;
    /// rows come back as vectors of columns.
    pub fn read_profile_range(
        &mut self,
        profile: ObisCode,
        range: &RangeDescriptor,
    ) -> Result<Vec<Vec<Data>>, ClientError<T::Error>> {
        let attribute = CosemAttribute::new(
            class_id::PROFILE_GENERIC,
            profile,
            PROFILE_BUFFER_ATTRIBUTE,
        );
        let buffer = self.get(attribute, Some(range.access_selector()))?;
        let rows = match buffer {
            Data::Array(rows) | Data::Structure(rows) => rows,
            Data::CompactArray { elements, .. } => elements,
            _ => return Err(ClientError::Dlms(Error::Malformed)),
        };
        rows.into_iter()
            .map(|row| match row {
                Data::Structure(columns) => Ok(columns),
                _ => Err(ClientError::Dlms(Error::Malformed)),
            })
            .collect()
    }
}

enum GetPayload {
    Value(Data),
    Raw(Vec<u8>),
}

fn access_result<E>(result: DataAccessResult) -> Result<(), ClientError<E>> {
    match result {
        DataAccessResult::Success => Ok(()),
        error => Err(ClientError::Dlms(Error::ServiceError(error))),
    }
}
