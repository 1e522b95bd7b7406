//! The xDLMS application-layer state machine.
//!
//! [`DlmsConnection`] owns everything an association needs: state,
//! security material, invocation counters, negotiated parameters and the
//! single-outstanding-request discipline. It converts typed APDUs to
//! protected bytes ([`DlmsConnection::aarq`], [`DlmsConnection::rlrq`],
//! [`DlmsConnection::request`]) and protected bytes back to typed APDUs
//! ([`DlmsConnection::receive`]); the transport round-trips live in the
//! client facade.
//!
//! ```text
//! NoAssociation --AARQ-->  AwaitingResponse
//! AwaitingResponse --AARE accepted--> Associated
//! AwaitingResponse --AARE rejected--> NoAssociation
//! Associated --RLRQ--> AwaitingReleaseResponse --RLRE--> Released
//! Associated --service--> Associated   (one outstanding)
//! ```
//!
//! Pre-established associations skip AARQ/AARE, start in `Ready` and
//! refuse ACSE services.

use alloc::vec::Vec;

use crate::apdu::Apdu;
use crate::association::{
    Aare, AareUserInformation, Aarq, AarqUserInformation, AssociationResult, Conformance,
    GlobalCipherInitiateRequest, InitiateRequest, InitiateResponse, MechanismName, Rlrq,
};
use crate::ciphering::GeneralGlobalCipher;
use crate::cosem::{class_id, CosemMethod, ASSOCIATION_LN_OBJECT, REPLY_TO_HLS_METHOD};
use crate::action::{ActionRequest, ActionResponse, ActionResult};
use crate::data::Data;
use crate::error::Error;
use crate::get::{GetDataResult, GetRequest, GetResponse};
use crate::security::{self, SecurityControl, SYSTEM_TITLE_LENGTH};
use crate::set::{SetRequest, SetResponse};

/// Authentication profile for the association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// Lowest-level security: no credentials.
    None,
    /// Low-level security: a password in the AARQ.
    LowLevel { password: Vec<u8> },
    /// High-level security, method 5 (GMAC challenge exchange).
    HighLevelGmac,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub authentication: Authentication,
    /// Fixed client system title; a random one is generated when absent.
    pub client_system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    pub global_encryption_key: Option<Vec<u8>>,
    pub global_authentication_key: Option<Vec<u8>>,
    /// Dedicated session key offered in the InitiateRequest.
    pub dedicated_key: Option<Vec<u8>>,
    /// Only suite 0 is implemented.
    pub security_suite: u8,
    /// HLS challenge length, 8 to 64 bytes.
    pub challenge_length: usize,
    pub max_pdu_size: u16,
    /// First outbound invocation counter value; persist the counter
    /// between sessions and hand it back here.
    pub client_invocation_counter: u32,
    /// Last invocation counter seen from the server.
    pub server_invocation_counter: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            authentication: Authentication::None,
            client_system_title: None,
            global_encryption_key: None,
            global_authentication_key: None,
            dedicated_key: None,
            security_suite: 0,
            challenge_length: 32,
            max_pdu_size: 0xffff,
            client_invocation_counter: 0,
            server_invocation_counter: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    NoAssociation,
    AwaitingResponse,
    Associated,
    AwaitingReleaseResponse,
    Released,
    /// Pre-established association: usable immediately, never released.
    Ready,
}

/// The one service allowed to be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Aarq,
    Rlrq,
    Get,
    Set,
    Action,
}

#[derive(Debug)]
pub struct DlmsConnection {
    state: AssociationState,
    pending: Option<Pending>,
    pre_established: bool,

    authentication: Authentication,
    client_system_title: [u8; SYSTEM_TITLE_LENGTH],
    server_system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    global_encryption_key: Option<Vec<u8>>,
    global_authentication_key: Option<Vec<u8>>,
    dedicated_key: Option<Vec<u8>>,
    security_suite: u8,

    client_to_server_challenge: Vec<u8>,
    server_to_client_challenge: Option<Vec<u8>>,
    /// Set between an accepted HLS AARE and the verified reply_to_HLS
    /// exchange; plain services stay blocked meanwhile.
    hls_pending: bool,

    client_invocation_counter: u32,
    server_invocation_counter: u32,

    conformance: Conformance,
    max_pdu_size: u16,
    invoke_id: u8,

    /// Next expected inbound GET block number.
    next_get_block: u32,
    /// Block number of the outbound SET chunk awaiting its ack.
    pending_set_block: Option<u32>,
}

impl DlmsConnection {
    pub fn new(settings: ConnectionSettings) -> Result<Self, Error> {
        let client_system_title = match settings.client_system_title {
            Some(title) => title,
            None => security::default_system_title()?,
        };
        let client_to_server_challenge = match settings.authentication {
            Authentication::HighLevelGmac => {
                security::make_client_challenge(settings.challenge_length)?
            }
            _ => Vec::new(),
        };
        let mut conformance = Conformance::DEFAULT_CLIENT;
        if settings.global_encryption_key.is_some() {
            conformance = conformance | Conformance::GENERAL_PROTECTION;
        }

        Ok(Self {
            state: AssociationState::NoAssociation,
            pending: None,
            pre_established: false,
            authentication: settings.authentication,
            client_system_title,
            server_system_title: None,
            global_encryption_key: settings.global_encryption_key,
            global_authentication_key: settings.global_authentication_key,
            dedicated_key: settings.dedicated_key,
            security_suite: settings.security_suite,
            client_to_server_challenge,
            server_to_client_challenge: None,
            hls_pending: false,
            client_invocation_counter: settings.client_invocation_counter,
            server_invocation_counter: settings.server_invocation_counter,
            conformance,
            max_pdu_size: settings.max_pdu_size,
            invoke_id: 1,
            next_get_block: 1,
            pending_set_block: None,
        })
    }

    /// A pre-established association: access rights and conformance are
    /// agreed out of band, the connection starts in `Ready` and ACSE
    /// services are refused.
    pub fn pre_established(
        settings: ConnectionSettings,
        conformance: Conformance,
        server_system_title: Option<[u8; SYSTEM_TITLE_LENGTH]>,
    ) -> Result<Self, Error> {
        let mut connection = Self::new(settings)?;
        connection.state = AssociationState::Ready;
        connection.pre_established = true;
        connection.conformance = conformance;
        connection.server_system_title = server_system_title;
        Ok(connection)
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn negotiated_conformance(&self) -> Conformance {
        self.conformance
    }

    pub fn max_pdu_size(&self) -> u16 {
        self.max_pdu_size
    }

    /// The next outbound invocation counter; persist this between
    /// sessions.
    pub fn client_invocation_counter(&self) -> u32 {
        self.client_invocation_counter
    }

    pub fn server_system_title(&self) -> Option<[u8; SYSTEM_TITLE_LENGTH]> {
        self.server_system_title
    }

    /// Whether the HLS handshake still has to finish before services
    /// run.
    pub fn hls_pending(&self) -> bool {
        self.hls_pending
    }

    /// The client-to-server challenge generated for HLS profiles; empty
    /// otherwise.
    pub fn client_challenge(&self) -> &[u8] {
        &self.client_to_server_challenge
    }

    /// Invoke-id-and-priority byte for the next request: high priority,
    /// confirmed, rotating low nibble.
    pub fn next_invoke_id(&mut self) -> u8 {
        let id = 0xc0 | (self.invoke_id & 0x0f);
        self.invoke_id = self.invoke_id.wrapping_add(1);
        id
    }

    fn keys(&self) -> Result<(&[u8], &[u8]), Error> {
        match (&self.global_encryption_key, &self.global_authentication_key) {
            (Some(ek), Some(ak)) => Ok((ek, ak)),
            _ => Err(Error::DecryptionError),
        }
    }

    fn protection_configured(&self) -> bool {
        self.global_encryption_key.is_some()
    }

    /// Ciphering policy: keys configured, and (once negotiated) the
    /// general-protection conformance bit granted.
    fn ciphering_active(&self) -> bool {
        self.protection_configured() && self.conformance.contains(Conformance::GENERAL_PROTECTION)
    }

    fn security_control(&self) -> SecurityControl {
        let mut control = SecurityControl::from_byte(self.security_suite & 0x0f);
        control.set_authentication(self.global_authentication_key.is_some());
        control.set_encryption(self.global_encryption_key.is_some());
        control
    }

    /// Wrap plaintext APDU bytes in a general-glo-cipher, consuming one
    /// invocation-counter value.
    fn protect(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let control = self.security_control();
        let counter = self.client_invocation_counter;
        let (ek, ak) = self.keys()?;
        let wrapped = GeneralGlobalCipher::protect(
            control,
            self.client_system_title,
            counter,
            ek,
            ak,
            plaintext,
        )?;
        self.client_invocation_counter += 1;
        Ok(wrapped.encode())
    }

    fn check_server_invocation_counter(&mut self, received: u32) -> Result<(), Error> {
        if received <= self.server_invocation_counter {
            return Err(Error::DecryptionError);
        }
        self.server_invocation_counter = received;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Send side
    // ------------------------------------------------------------------

    /// Build the AARQ for the configured authentication profile and move
    /// to `AwaitingResponse`. With ciphering configured the inner
    /// InitiateRequest travels glo-ciphered.
    pub fn aarq(&mut self) -> Result<Vec<u8>, Error> {
        if self.pre_established
            || self.state != AssociationState::NoAssociation
            || self.pending.is_some()
        {
            return Err(Error::PreconditionFailed);
        }

        let mut initiate = InitiateRequest::new(self.conformance, self.max_pdu_size);
        if let Some(ref key) = self.dedicated_key {
            initiate = initiate.with_dedicated_key(key.clone());
        }

        let mut apdu = match self.authentication {
            Authentication::None => Aarq::new_no_security(self.conformance, self.max_pdu_size),
            Authentication::LowLevel { ref password } => Aarq::new_with_password(
                self.conformance,
                self.max_pdu_size,
                password.clone(),
            ),
            Authentication::HighLevelGmac => Aarq::new_with_hls_gmac(
                self.conformance,
                self.max_pdu_size,
                self.client_system_title,
                self.client_to_server_challenge.clone(),
            ),
        };

        if self.protection_configured() {
            apdu.system_title = Some(self.client_system_title);
            let control = self.security_control();
            let counter = self.client_invocation_counter;
            let (ek, ak) = self.keys()?;
            let ciphered_text = security::encrypt(
                control,
                &self.client_system_title,
                counter,
                ek,
                ak,
                &initiate.encode(),
            )?;
            self.client_invocation_counter += 1;
            apdu.user_information = Some(AarqUserInformation::Ciphered(
                GlobalCipherInitiateRequest {
                    security_control: control,
                    invocation_counter: counter,
                    ciphered_text,
                },
            ));
        } else {
            apdu.user_information = Some(AarqUserInformation::Initiate(initiate));
        }

        self.state = AssociationState::AwaitingResponse;
        self.pending = Some(Pending::Aarq);
        Ok(apdu.encode())
    }

    /// Build the RLRQ and move to `AwaitingReleaseResponse`.
    pub fn rlrq(&mut self) -> Result<Vec<u8>, Error> {
        if self.pre_established
            || self.state != AssociationState::Associated
            || self.pending.is_some()
        {
            return Err(Error::PreconditionFailed);
        }
        self.state = AssociationState::AwaitingReleaseResponse;
        self.pending = Some(Pending::Rlrq);
        Ok(Rlrq::default().encode())
    }

    /// Serialize a service request, enforcing state, the at-most-one
    /// rule and the ciphering policy.
    pub fn request(&mut self, apdu: &Apdu) -> Result<Vec<u8>, Error> {
        if !matches!(self.state, AssociationState::Associated | AssociationState::Ready) {
            return Err(Error::PreconditionFailed);
        }

        match apdu {
            Apdu::GetRequest(GetRequest::Normal { .. })
            | Apdu::GetRequest(GetRequest::WithList { .. }) => {
                self.begin_service(Pending::Get)?;
                self.next_get_block = 1;
            }
            Apdu::GetRequest(GetRequest::Next { .. }) => {
                if self.pending != Some(Pending::Get) {
                    return Err(Error::PreconditionFailed);
                }
            }
            Apdu::SetRequest(SetRequest::Normal { .. })
            | Apdu::SetRequest(SetRequest::WithList { .. }) => {
                self.begin_service(Pending::Set)?;
                self.pending_set_block = None;
            }
            Apdu::SetRequest(SetRequest::WithFirstBlock { block, .. }) => {
                self.begin_service(Pending::Set)?;
                self.pending_set_block = Some(block.block_number);
            }
            Apdu::SetRequest(SetRequest::WithBlock { block, .. }) => {
                if self.pending != Some(Pending::Set) {
                    return Err(Error::PreconditionFailed);
                }
                self.pending_set_block = Some(block.block_number);
            }
            Apdu::ActionRequest(_) => {
                self.begin_service(Pending::Action)?;
            }
            _ => return Err(Error::PreconditionFailed),
        }

        let plain = apdu.encode();
        if self.ciphering_active() {
            self.protect(&plain)
        } else {
            Ok(plain)
        }
    }

    fn begin_service(&mut self, kind: Pending) -> Result<(), Error> {
        if self.pending.is_some() {
            return Err(Error::PreconditionFailed);
        }
        // During the HLS handshake only the reply action may run.
        if self.hls_pending && kind != Pending::Action {
            return Err(Error::PreconditionFailed);
        }
        self.pending = Some(kind);
        Ok(())
    }

    /// The reply_to_HLS_authentication action carrying
    /// `f(StoC) = SC || IC || GMAC(SC || AK || StoC)`.
    pub fn hls_reply(&mut self) -> Result<Vec<u8>, Error> {
        if !self.hls_pending {
            return Err(Error::PreconditionFailed);
        }
        let challenge = self
            .server_to_client_challenge
            .clone()
            .ok_or(Error::AuthenticationFailed)?;
        let counter = self.client_invocation_counter;
        let (ek, ak) = self.keys()?;
        let reply = security::hls_gmac_reply(
            self.security_suite,
            &self.client_system_title,
            counter,
            ek,
            ak,
            &challenge,
        )?;

        let invoke_id = self.next_invoke_id();
        let apdu = Apdu::ActionRequest(ActionRequest::Normal {
            invoke_id,
            method: CosemMethod::new(
                class_id::ASSOCIATION_LN,
                ASSOCIATION_LN_OBJECT,
                REPLY_TO_HLS_METHOD,
            ),
            parameters: Some(Data::OctetString(reply)),
        });
        self.request(&apdu)
    }

    // ------------------------------------------------------------------
    // Receive side
    // ------------------------------------------------------------------

    /// Classify server bytes, strip ciphering, verify counters and drive
    /// the state machine. Service errors and rejections surface as typed
    /// errors; everything else comes back as the decoded APDU.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Apdu, Error> {
        let (apdu, _) = Apdu::from_bytes(bytes)?;

        let apdu = match apdu {
            Apdu::GeneralGlobalCipher(ciphered) => {
                self.check_server_invocation_counter(ciphered.invocation_counter)?;
                let known_title = self.server_system_title.unwrap_or(ciphered.system_title);
                let (ek, ak) = self.keys()?;
                let plain = security::decrypt(
                    ciphered.security_control,
                    &known_title,
                    ciphered.invocation_counter,
                    ek,
                    ak,
                    &ciphered.ciphered_text,
                )?;
                let (inner, _) = Apdu::from_bytes(&plain)?;
                inner
            }
            other => other,
        };

        match apdu {
            Apdu::Aare(aare) => self.handle_aare(aare).map(Apdu::Aare),
            Apdu::Rlre(rlre) => {
                if self.pre_established
                    || self.pending != Some(Pending::Rlrq)
                    || self.state != AssociationState::AwaitingReleaseResponse
                {
                    return Err(Error::ProtocolError);
                }
                self.pending = None;
                self.state = AssociationState::Released;
                Ok(Apdu::Rlre(rlre))
            }
            Apdu::ExceptionResponse(exception) => {
                self.pending = None;
                if self.state == AssociationState::AwaitingResponse {
                    self.state = AssociationState::NoAssociation;
                }
                Err(Error::StateError(exception))
            }
            Apdu::GetResponse(response) => {
                if self.pending != Some(Pending::Get) {
                    return Err(Error::ProtocolError);
                }
                self.track_get_blocks(&response)?;
                Ok(Apdu::GetResponse(response))
            }
            Apdu::SetResponse(response) => {
                if self.pending != Some(Pending::Set) {
                    return Err(Error::ProtocolError);
                }
                self.track_set_blocks(&response)?;
                Ok(Apdu::SetResponse(response))
            }
            Apdu::ActionResponse(response) => {
                if self.pending != Some(Pending::Action) {
                    return Err(Error::ProtocolError);
                }
                self.pending = None;
                if self.hls_pending {
                    self.verify_hls_response(&response)?;
                }
                Ok(Apdu::ActionResponse(response))
            }
            Apdu::DataNotification(notification) => Ok(Apdu::DataNotification(notification)),
            _ => Err(Error::ProtocolError),
        }
    }

    fn handle_aare(&mut self, mut aare: Aare) -> Result<Aare, Error> {
        if self.pre_established
            || self.pending != Some(Pending::Aarq)
            || self.state != AssociationState::AwaitingResponse
        {
            return Err(Error::ProtocolError);
        }
        self.pending = None;
        self.server_system_title = aare.system_title;
        self.server_to_client_challenge = aare.server_challenge.clone();

        if let Some(AareUserInformation::Ciphered(ref ciphered)) = aare.user_information {
            let title = self.server_system_title.ok_or(Error::DecryptionError)?;
            self.check_server_invocation_counter(ciphered.invocation_counter)?;
            let (ek, ak) = self.keys()?;
            let plain = security::decrypt(
                ciphered.security_control,
                &title,
                ciphered.invocation_counter,
                ek,
                ak,
                &ciphered.ciphered_text,
            )?;
            let (_, initiate) =
                InitiateResponse::parse(&plain).map_err(|_| Error::Malformed)?;
            aare.user_information = Some(AareUserInformation::Initiate(initiate));
        }

        if let Some(AareUserInformation::Initiate(ref initiate)) = aare.user_information {
            self.conformance = initiate.negotiated_conformance;
            self.max_pdu_size = initiate.server_max_receive_pdu_size;
        }

        match aare.result {
            AssociationResult::Accepted => {
                self.state = AssociationState::Associated;
                if aare.mechanism_name == Some(MechanismName::HighGmac)
                    || self.authentication == Authentication::HighLevelGmac
                {
                    self.hls_pending = true;
                }
                Ok(aare)
            }
            result => {
                self.state = AssociationState::NoAssociation;
                Err(Error::AssociationRefused {
                    result,
                    diagnostic: aare.result_source_diagnostic,
                })
            }
        }
    }

    fn track_get_blocks(&mut self, response: &GetResponse) -> Result<(), Error> {
        match response {
            GetResponse::Normal { .. } | GetResponse::WithList { .. } => {
                self.pending = None;
                Ok(())
            }
            GetResponse::WithDataBlock { last_block, block_number, .. } => {
                if *block_number != self.next_get_block {
                    self.pending = None;
                    return Err(Error::ProtocolError);
                }
                self.next_get_block += 1;
                if *last_block {
                    self.pending = None;
                }
                Ok(())
            }
        }
    }

    fn track_set_blocks(&mut self, response: &SetResponse) -> Result<(), Error> {
        match response {
            SetResponse::Normal { .. }
            | SetResponse::WithList { .. }
            | SetResponse::LastDataBlock { .. }
            | SetResponse::LastDataBlockWithList { .. } => {
                self.pending = None;
                self.pending_set_block = None;
                Ok(())
            }
            SetResponse::DataBlock { block_number, .. } => {
                if Some(*block_number) != self.pending_set_block {
                    self.pending = None;
                    self.pending_set_block = None;
                    return Err(Error::ProtocolError);
                }
                Ok(())
            }
        }
    }

    /// Verify the server's `f(CtoS)` from the reply_to_HLS action
    /// response. A mismatch tears the association down.
    fn verify_hls_response(&mut self, response: &ActionResponse) -> Result<(), Error> {
        let failed = |connection: &mut Self| {
            connection.state = AssociationState::NoAssociation;
            connection.hls_pending = false;
            Err(Error::AuthenticationFailed)
        };

        let reply = match response {
            ActionResponse::Normal {
                result: ActionResult::Success,
                return_parameters: Some(GetDataResult::Data(Data::OctetString(reply))),
                ..
            } => reply.clone(),
            _ => return failed(self),
        };

        let title = match self.server_system_title {
            Some(title) => title,
            None => return failed(self),
        };
        let (ek, ak) = self.keys()?;
        match security::hls_gmac_reply_valid(
            &reply,
            &title,
            ek,
            ak,
            &self.client_to_server_challenge,
        ) {
            Ok(true) => {
                self.hls_pending = false;
                Ok(())
            }
            _ => failed(self),
        }
    }

    /// Interpret raw data reassembled from a GET block transfer: when the
    /// whole response was ciphered as one APDU the outer 0xDB tag is
    /// still present and gets stripped here.
    pub fn unwrap_reassembled(&mut self, bytes: &[u8]) -> Result<Vec<u8>, Error> {
        if bytes.first() == Some(&crate::ciphering::GENERAL_GLOBAL_CIPHER_TAG) {
            let (_, ciphered) =
                GeneralGlobalCipher::parse(bytes).map_err(|_| Error::Malformed)?;
            self.check_server_invocation_counter(ciphered.invocation_counter)?;
            let known_title = self.server_system_title.unwrap_or(ciphered.system_title);
            let (ek, ak) = self.keys()?;
            return security::decrypt(
                ciphered.security_control,
                &known_title,
                ciphered.invocation_counter,
                ek,
                ak,
                &ciphered.ciphered_text,
            );
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::association::{AcseServiceUserDiagnostics, ApplicationContextName};
    use crate::cosem::CosemAttribute;
    use crate::obis::ObisCode;

    const EK: [u8; 16] = *b"SUCHINSECUREKIND";
    const AK: [u8; 16] = *b"SUCHINSECUREAUTH";
    const SERVER_ST: [u8; 8] = [0x4d, 0x4d, 0x4d, 0x00, 0x01, 0x23, 0x45, 0x67];
    const CLIENT_ST: [u8; 8] = [0x4d, 0x4d, 0x4d, 0x00, 0x00, 0xbc, 0x61, 0x4e];

    fn attribute() -> CosemAttribute {
        CosemAttribute::new(3, ObisCode::new(1, 0, 1, 8, 0, 255), 2)
    }

    fn get_request(connection: &mut DlmsConnection) -> Apdu {
        let invoke_id = connection.next_invoke_id();
        Apdu::GetRequest(GetRequest::Normal {
            invoke_id,
            attribute: attribute(),
            access_selection: None,
        })
    }

    fn plain_connection() -> DlmsConnection {
        DlmsConnection::new(ConnectionSettings::default()).unwrap()
    }

    fn associated_connection() -> DlmsConnection {
        let mut connection = plain_connection();
        connection.aarq().unwrap();
        let aare = Aare::new_accepted(
            ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(Conformance::DEFAULT_CLIENT, 0x0400),
        );
        connection.receive(&aare.encode()).unwrap();
        connection
    }

    fn ciphered_settings() -> ConnectionSettings {
        ConnectionSettings {
            client_system_title: Some(CLIENT_ST),
            global_encryption_key: Some(EK.to_vec()),
            global_authentication_key: Some(AK.to_vec()),
            client_invocation_counter: 100,
            ..ConnectionSettings::default()
        }
    }

    /// An accepted AARE granting general protection.
    fn protected_aare() -> Aare {
        let mut aare = Aare::new_accepted(
            ApplicationContextName::LogicalNameWithCiphering,
            InitiateResponse::new_ln(
                Conformance::DEFAULT_CLIENT | Conformance::GENERAL_PROTECTION,
                0x0400,
            ),
        );
        aare.system_title = Some(SERVER_ST);
        aare
    }

    #[test]
    fn test_plain_association_lifecycle() {
        let mut connection = plain_connection();
        assert_eq!(connection.state(), AssociationState::NoAssociation);

        let aarq_bytes = connection.aarq().unwrap();
        assert_eq!(aarq_bytes[0], 0x60);
        assert_eq!(connection.state(), AssociationState::AwaitingResponse);

        let aare = Aare::new_accepted(
            ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(Conformance::DEFAULT_CLIENT, 0x0400),
        );
        connection.receive(&aare.encode()).unwrap();
        assert_eq!(connection.state(), AssociationState::Associated);
        assert_eq!(connection.max_pdu_size(), 0x0400);

        let rlrq_bytes = connection.rlrq().unwrap();
        assert_eq!(rlrq_bytes[0], 0x62);
        assert_eq!(connection.state(), AssociationState::AwaitingReleaseResponse);

        connection.receive(&crate::association::Rlre::default().encode()).unwrap();
        assert_eq!(connection.state(), AssociationState::Released);
    }

    #[test]
    fn test_negotiated_conformance_is_intersection_result() {
        let mut connection = plain_connection();
        connection.aarq().unwrap();
        let negotiated = Conformance::GET | Conformance::SET;
        let aare = Aare::new_accepted(
            ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(negotiated, 0x0400),
        );
        connection.receive(&aare.encode()).unwrap();
        assert_eq!(connection.negotiated_conformance(), negotiated);
    }

    #[test]
    fn test_rejected_association() {
        let mut connection = plain_connection();
        connection.aarq().unwrap();
        let aare = Aare::new_rejected(
            ApplicationContextName::LogicalName,
            AssociationResult::RejectedPermanent,
            AcseServiceUserDiagnostics::AuthenticationFailure,
        );
        assert_eq!(
            connection.receive(&aare.encode()),
            Err(Error::AssociationRefused {
                result: AssociationResult::RejectedPermanent,
                diagnostic: AcseServiceUserDiagnostics::AuthenticationFailure,
            })
        );
        assert_eq!(connection.state(), AssociationState::NoAssociation);
    }

    #[test]
    fn test_service_requires_association() {
        let mut connection = plain_connection();
        let apdu = get_request(&mut connection);
        assert_eq!(connection.request(&apdu), Err(Error::PreconditionFailed));
    }

    #[test]
    fn test_at_most_one_outstanding() {
        let mut connection = associated_connection();
        let first = get_request(&mut connection);
        connection.request(&first).unwrap();

        let second = get_request(&mut connection);
        assert_eq!(connection.request(&second), Err(Error::PreconditionFailed));

        // response clears the slot
        let response = GetResponse::Normal {
            invoke_id: 0xc1,
            result: GetDataResult::Data(Data::DoubleLongUnsigned(1)),
        };
        connection.receive(&Apdu::GetResponse(response).encode()).unwrap();
        let third = get_request(&mut connection);
        connection.request(&third).unwrap();
    }

    #[test]
    fn test_mismatched_response_type() {
        let mut connection = associated_connection();
        let request = get_request(&mut connection);
        connection.request(&request).unwrap();

        let response = SetResponse::Normal {
            invoke_id: 0xc1,
            result: crate::get::DataAccessResult::Success,
        };
        assert_eq!(
            connection.receive(&Apdu::SetResponse(response).encode()),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_get_block_number_monotonic() {
        let mut connection = associated_connection();
        let request = get_request(&mut connection);
        connection.request(&request).unwrap();

        let block1 = GetResponse::WithDataBlock {
            invoke_id: 0xc1,
            last_block: false,
            block_number: 1,
            result: crate::get::GetDataBlockResult::RawData(vec![1, 2]),
        };
        connection.receive(&Apdu::GetResponse(block1).encode()).unwrap();

        // skipping to block 3 aborts the transfer
        let block3 = GetResponse::WithDataBlock {
            invoke_id: 0xc1,
            last_block: true,
            block_number: 3,
            result: crate::get::GetDataBlockResult::RawData(vec![3, 4]),
        };
        assert_eq!(
            connection.receive(&Apdu::GetResponse(block3).encode()),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_set_block_ack_mismatch() {
        let mut connection = associated_connection();
        let invoke_id = connection.next_invoke_id();
        let request = Apdu::SetRequest(SetRequest::WithFirstBlock {
            invoke_id,
            attribute: attribute(),
            access_selection: None,
            block: crate::set::DataBlock {
                last_block: false,
                block_number: 1,
                raw_data: vec![0; 10],
            },
        });
        connection.request(&request).unwrap();

        let wrong_ack = SetResponse::DataBlock { invoke_id, block_number: 2 };
        assert_eq!(
            connection.receive(&Apdu::SetResponse(wrong_ack).encode()),
            Err(Error::ProtocolError)
        );
    }

    #[test]
    fn test_pre_established_starts_ready_and_refuses_acse() {
        let mut connection = DlmsConnection::pre_established(
            ConnectionSettings::default(),
            Conformance::DEFAULT_CLIENT,
            None,
        )
        .unwrap();
        assert_eq!(connection.state(), AssociationState::Ready);

        assert_eq!(connection.aarq(), Err(Error::PreconditionFailed));
        assert_eq!(connection.rlrq(), Err(Error::PreconditionFailed));

        let apdu = get_request(&mut connection);
        connection.request(&apdu).unwrap();
    }

    #[test]
    fn test_exception_response_surfaces_as_state_error() {
        let mut connection = associated_connection();
        let request = get_request(&mut connection);
        connection.request(&request).unwrap();

        let result = connection.receive(&[0xd8, 0x01, 0x01]);
        assert!(matches!(result, Err(Error::StateError(_))));
        // slot is free again
        let retry = get_request(&mut connection);
        connection.request(&retry).unwrap();
    }

    #[test]
    fn test_outbound_invocation_counter_monotonic() {
        let mut connection = DlmsConnection::new(ciphered_settings()).unwrap();
        connection.aarq().unwrap();
        // the ciphered AARQ consumed IC 100
        connection.receive(&protected_aare().encode()).unwrap();

        for expected in 101..104u32 {
            let apdu = get_request(&mut connection);
            let bytes = connection.request(&apdu).unwrap();
            assert_eq!(bytes[0], 0xdb);
            let (_, ggc) = GeneralGlobalCipher::parse(&bytes).unwrap();
            assert_eq!(ggc.invocation_counter, expected);

            let response = GetResponse::Normal {
                invoke_id: 0xc1,
                result: GetDataResult::Data(Data::Null),
            };
            let wrapped = GeneralGlobalCipher::protect(
                SecurityControl::authenticated_and_encrypted(),
                SERVER_ST,
                expected, // server counters move independently; reuse for brevity
                &EK,
                &AK,
                &Apdu::GetResponse(response).encode(),
            )
            .unwrap();
            connection.receive(&wrapped.encode()).unwrap();
        }
    }

    #[test]
    fn test_server_invocation_counter_rollback_rejected() {
        let mut connection = DlmsConnection::new(ciphered_settings()).unwrap();
        connection.aarq().unwrap();
        connection.receive(&protected_aare().encode()).unwrap();

        let make_response = |counter: u32, connection: &mut DlmsConnection| {
            let apdu = get_request(connection);
            connection.request(&apdu).unwrap();
            GeneralGlobalCipher::protect(
                SecurityControl::authenticated_and_encrypted(),
                SERVER_ST,
                counter,
                &EK,
                &AK,
                &Apdu::GetResponse(GetResponse::Normal {
                    invoke_id: 0xc1,
                    result: GetDataResult::Data(Data::Null),
                })
                .encode(),
            )
            .unwrap()
            .encode()
        };

        let first = make_response(10, &mut connection);
        connection.receive(&first).unwrap();

        // an equal counter is a replay
        let replay = make_response(10, &mut connection);
        assert_eq!(connection.receive(&replay), Err(Error::DecryptionError));
    }

    #[test]
    fn test_hls_handshake_success_and_failure() {
        let settings = ConnectionSettings {
            authentication: Authentication::HighLevelGmac,
            ..ciphered_settings()
        };
        let mut connection = DlmsConnection::new(settings).unwrap();
        connection.aarq().unwrap();

        let mut aare = protected_aare();
        aare.mechanism_name = Some(MechanismName::HighGmac);
        aare.server_challenge = Some(b"ZnVpVK7gAzLS".to_vec());
        connection.receive(&aare.encode()).unwrap();
        assert!(connection.hls_pending());

        // plain services are blocked until the handshake completes
        let blocked = get_request(&mut connection);
        assert_eq!(connection.request(&blocked), Err(Error::PreconditionFailed));

        let reply_bytes = connection.hls_reply().unwrap();
        assert_eq!(reply_bytes[0], 0xdb);

        // the server answers with f(CtoS) over the client challenge
        let client_challenge = connection.client_to_server_challenge.clone();
        let server_ic = 77;
        let f_ctos =
            security::hls_gmac_reply(0, &SERVER_ST, server_ic, &EK, &AK, &client_challenge)
                .unwrap();
        let response = Apdu::ActionResponse(ActionResponse::Normal {
            invoke_id: 0xc1,
            result: ActionResult::Success,
            return_parameters: Some(GetDataResult::Data(Data::OctetString(f_ctos))),
        });
        let wrapped = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            SERVER_ST,
            50,
            &EK,
            &AK,
            &response.encode(),
        )
        .unwrap();
        connection.receive(&wrapped.encode()).unwrap();
        assert!(!connection.hls_pending());
        assert_eq!(connection.state(), AssociationState::Associated);

        // now services are allowed
        let allowed = get_request(&mut connection);
        connection.request(&allowed).unwrap();
    }

    #[test]
    fn test_hls_bad_tag_fails_association() {
        let settings = ConnectionSettings {
            authentication: Authentication::HighLevelGmac,
            ..ciphered_settings()
        };
        let mut connection = DlmsConnection::new(settings).unwrap();
        connection.aarq().unwrap();

        let mut aare = protected_aare();
        aare.mechanism_name = Some(MechanismName::HighGmac);
        aare.server_challenge = Some(b"ZnVpVK7gAzLS".to_vec());
        connection.receive(&aare.encode()).unwrap();
        connection.hls_reply().unwrap();

        // reply computed over the wrong challenge
        let bogus =
            security::hls_gmac_reply(0, &SERVER_ST, 9, &EK, &AK, b"not-the-challenge").unwrap();
        let response = Apdu::ActionResponse(ActionResponse::Normal {
            invoke_id: 0xc1,
            result: ActionResult::Success,
            return_parameters: Some(GetDataResult::Data(Data::OctetString(bogus))),
        });
        let wrapped = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            SERVER_ST,
            50,
            &EK,
            &AK,
            &response.encode(),
        )
        .unwrap();
        assert_eq!(connection.receive(&wrapped.encode()), Err(Error::AuthenticationFailed));
        assert_eq!(connection.state(), AssociationState::NoAssociation);
    }

    #[test]
    fn test_unwrap_reassembled_passthrough_and_ciphered() {
        let mut connection = DlmsConnection::new(ciphered_settings()).unwrap();
        connection.server_system_title = Some(SERVER_ST);

        let plain = [0x01, 0x02, 0x03];
        assert_eq!(connection.unwrap_reassembled(&plain).unwrap(), plain);

        let wrapped = GeneralGlobalCipher::protect(
            SecurityControl::authenticated_and_encrypted(),
            SERVER_ST,
            5,
            &EK,
            &AK,
            &plain,
        )
        .unwrap();
        assert_eq!(connection.unwrap_reassembled(&wrapped.encode()).unwrap(), plain);
    }
}
