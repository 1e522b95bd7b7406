//! ACSE association layer: AARQ/AARE establishment, RLRQ/RLRE release.
//!
//! An application association is negotiated before any service runs. The
//! client proposes context, authentication and an xDLMS InitiateRequest
//! (conformance + PDU size) in the AARQ; the server answers with result,
//! diagnostic, its system title, an optional HLS challenge and the
//! negotiated InitiateResponse in the AARE. The ACSE envelope is BER;
//! the xDLMS user information inside stays A-XDR.
//!
//! Reference: DLMS Green Book Ed. 12, section 11.

pub use self::{
    aare::{Aare, AareUserInformation},
    aarq::{Aarq, AarqUserInformation},
    conformance::Conformance,
    enums::{
        AcseServiceUserDiagnostics, ApplicationContextName, AssociationResult,
        AuthenticationValue, MechanismName, ReleaseRequestReason, ReleaseResponseReason,
    },
    initiate::{
        GlobalCipherInitiateRequest, GlobalCipherInitiateResponse, InitiateRequest,
        InitiateResponse,
    },
    rlre::Rlre,
    rlrq::Rlrq,
};

pub(crate) mod ber;

mod aare;
mod aarq;
mod conformance;
mod enums;
pub(crate) mod initiate;
mod rlre;
mod rlrq;

pub const AARQ_TAG: u8 = 0x60;
pub const AARE_TAG: u8 = 0x61;
pub const RLRQ_TAG: u8 = 0x62;
pub const RLRE_TAG: u8 = 0x63;

/// DLMS version negotiated in Initiate APDUs.
pub const DLMS_VERSION: u8 = 6;

/// VAA name confirming Logical Name referencing.
pub const VAA_NAME_LN: u16 = 0x0007;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acse_tags() {
        assert_eq!(AARQ_TAG, 0x60);
        assert_eq!(AARE_TAG, 0x61);
        assert_eq!(RLRQ_TAG, 0x62);
        assert_eq!(RLRE_TAG, 0x63);
    }

    /// Client encodes an AARQ, server parses it, answers with an accepted
    /// AARE carrying the negotiated subset, client applies it.
    #[cfg(all(feature = "encode", feature = "parse"))]
    #[test]
    fn test_plain_association_handshake() {
        let aarq = Aarq::new_no_security(Conformance::DEFAULT_CLIENT, 0xffff);
        let aarq_bytes = aarq.encode();
        let (_, seen_by_server) = Aarq::parse(&aarq_bytes).unwrap();
        assert_eq!(seen_by_server.application_context_name, ApplicationContextName::LogicalName);

        let proposed = match seen_by_server.user_information {
            Some(AarqUserInformation::Initiate(ref initiate)) => initiate.proposed_conformance,
            ref other => panic!("expected plain InitiateRequest, got {:?}", other),
        };
        let negotiated = proposed & (Conformance::GET | Conformance::SET | Conformance::ACTION);

        let aare = Aare::new_accepted(
            ApplicationContextName::LogicalName,
            InitiateResponse::new_ln(negotiated, 0x0400),
        );
        let aare_bytes = aare.encode();
        let (_, seen_by_client) = Aare::parse(&aare_bytes).unwrap();

        assert!(seen_by_client.is_accepted());
        match seen_by_client.user_information {
            Some(AareUserInformation::Initiate(initiate)) => {
                assert_eq!(initiate.negotiated_conformance, negotiated);
                assert_eq!(initiate.server_max_receive_pdu_size, 0x0400);
            }
            other => panic!("expected InitiateResponse, got {:?}", other),
        }
    }

    /// Release is a two-APDU exchange with reasons on both sides.
    #[cfg(all(feature = "encode", feature = "parse"))]
    #[test]
    fn test_release_handshake() {
        let rlrq = Rlrq::default();
        let (_, parsed) = Rlrq::parse(&rlrq.encode()).unwrap();
        assert_eq!(parsed.reason, Some(ReleaseRequestReason::Normal));

        let rlre = Rlre::default();
        let (_, parsed) = Rlre::parse(&rlre.encode()).unwrap();
        assert_eq!(parsed.reason, Some(ReleaseResponseReason::Normal));
    }
}
