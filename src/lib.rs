//! Client-side DLMS/COSEM (IEC 62056) protocol engine.
//!
//! DLMS/COSEM is the application protocol spoken by most modern electricity,
//! gas and water meters. This crate implements the client (head-end) half of
//! it:
//!
//! - the A-XDR codec for the recursive DLMS `data` tree ([`Data`]),
//! - the xDLMS service APDUs (GET/SET/ACTION, DataNotification) and the ACSE
//!   association APDUs (AARQ/AARE/RLRQ/RLRE), collected in the [`Apdu`]
//!   registry,
//! - security suite 0 ciphering (AES-GCM-128) and HLS-GMAC authentication,
//! - the application-layer connection state machine
//!   ([`connection::DlmsConnection`]),
//! - the IEC 62056-46 HDLC data link ([`hdlc`]) and the DLMS-over-TCP
//!   wrapper ([`wrapper`]),
//! - a blocking client facade ([`client::DlmsClient`]) that drives a
//!   [`transport::Transport`].
//!
//! The protocol core is `no_std + alloc`; the socket transports require
//! `std` (on by default).
//!
//! # Example
//!
//! ```no_run
//! use cosem_client::client::{ClientSettings, DlmsClient};
//! use cosem_client::cosem::CosemAttribute;
//! use cosem_client::transport::{TcpLink, WrapperTransport};
//! use cosem_client::ObisCode;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let link = TcpLink::connect("10.0.0.42:4059")?;
//! let transport = WrapperTransport::new(link, 16, 1);
//! let mut client = DlmsClient::new(transport, ClientSettings::default())?;
//!
//! client.associate()?;
//! let attr = CosemAttribute::new(3, "1-0:1.8.0.255".parse::<ObisCode>()?, 2);
//! let energy = client.get(attr, None)?;
//! println!("total import: {:?}", energy);
//! client.release_association()?;
//! client.disconnect()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod action;
pub mod apdu;
pub mod association;
pub mod ciphering;
pub mod cosem;
pub mod data;
pub mod error;
pub mod get;
pub mod notification;
pub mod obis;
pub mod security;
pub mod selective_access;
pub mod set;
pub mod wrapper;

#[cfg(feature = "transport-hdlc")]
pub mod hdlc;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod connection;
#[cfg(feature = "client")]
pub mod transport;

pub use apdu::Apdu;
pub use data::{Data, DataType, Date, DateTime, Time};
pub use error::Error;
pub use obis::ObisCode;
pub use security::SecurityControl;
