//! Security suite 0: AES-GCM-128 ciphering and HLS-GMAC authentication.
//!
//! DLMS protects APDUs with AES-GCM-128 using 12-byte authentication
//! tags. The nonce is `system_title(8) || invocation_counter(4 BE)`; the
//! additional authenticated data is `security_control || authentication
//! key`, with the challenge appended for GMAC. GMAC is GCM with all input
//! supplied as additional data and an empty plaintext.
//!
//! Reference: DLMS Green Book Ed. 12, section 9.2.7.2.4.

use alloc::vec::Vec;
use core::fmt;

use aes::Aes128;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{AesGcm, Nonce, Tag};
use cipher::Key;
#[cfg(feature = "parse")]
use nom::{number::complete::u8, IResult};

use crate::error::Error;

/// AES-GCM-128 with the 12-byte tag DLMS mandates.
type DlmsGcm = AesGcm<Aes128, U12, U12>;

/// DLMS truncates GCM tags to 12 bytes.
pub const GCM_TAG_LENGTH: usize = 12;

/// System titles are always 8 octets.
pub const SYSTEM_TITLE_LENGTH: usize = 8;

/// The security control byte: suite id in the low nibble, protection
/// bits above it. Travels in front of every ciphered payload.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecurityControl {
    security_control: u8,
}

impl fmt::Debug for SecurityControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityControl")
            .field("suite_id", &self.suite_id())
            .field("authentication", &self.authentication())
            .field("encryption", &self.encryption())
            .field("broadcast", &self.broadcast())
            .field("compression", &self.compression())
            .finish()
    }
}

impl SecurityControl {
    const COMPRESSION_BIT: u8 = 0b1000_0000;
    const BROADCAST_BIT: u8 = 0b0100_0000;
    const ENCRYPTION_BIT: u8 = 0b0010_0000;
    const AUTHENTICATION_BIT: u8 = 0b0001_0000;

    /// Suite 0, no protection bits.
    pub const fn none() -> Self {
        Self { security_control: 0 }
    }

    /// Suite 0, authenticated and encrypted.
    pub const fn authenticated_and_encrypted() -> Self {
        Self { security_control: Self::AUTHENTICATION_BIT | Self::ENCRYPTION_BIT }
    }

    /// Suite 0, authenticated only. Ciphertext equals plaintext; the
    /// GCM tag still covers it.
    pub const fn authenticated_only() -> Self {
        Self { security_control: Self::AUTHENTICATION_BIT }
    }

    pub const fn from_byte(security_control: u8) -> Self {
        Self { security_control }
    }

    pub const fn to_byte(self) -> u8 {
        self.security_control
    }

    #[cfg(feature = "parse")]
    pub fn parse(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, security_control) = u8(input)?;
        Ok((input, Self { security_control }))
    }

    pub fn suite_id(&self) -> u8 {
        self.security_control & 0b0000_1111
    }

    pub fn authentication(&self) -> bool {
        (self.security_control & Self::AUTHENTICATION_BIT) != 0
    }

    pub fn set_authentication(&mut self, authentication: bool) {
        if authentication {
            self.security_control |= Self::AUTHENTICATION_BIT
        } else {
            self.security_control &= !Self::AUTHENTICATION_BIT
        }
    }

    pub fn encryption(&self) -> bool {
        (self.security_control & Self::ENCRYPTION_BIT) != 0
    }

    pub fn set_encryption(&mut self, encryption: bool) {
        if encryption {
            self.security_control |= Self::ENCRYPTION_BIT
        } else {
            self.security_control &= !Self::ENCRYPTION_BIT
        }
    }

    pub fn broadcast(&self) -> bool {
        (self.security_control & Self::BROADCAST_BIT) != 0
    }

    pub fn compression(&self) -> bool {
        (self.security_control & Self::COMPRESSION_BIT) != 0
    }
}

fn build_nonce(system_title: &[u8; 8], invocation_counter: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(system_title);
    nonce[8..].copy_from_slice(&invocation_counter.to_be_bytes());
    nonce
}

fn cipher_for(key: &[u8]) -> Result<DlmsGcm, Error> {
    // suite 0 keys are 128 bits; anything else cannot decrypt anything
    if key.len() != 16 {
        return Err(Error::DecryptionError);
    }
    Ok(DlmsGcm::new(Key::<Aes128>::from_slice(key)))
}

/// Protect `plaintext` under the given security context. The output is
/// `ciphertext || tag(12)` in the authenticated-and-encrypted mode and
/// `plaintext || tag(12)` in the authenticated-only mode.
pub fn encrypt(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, Error> {
    let cipher = cipher_for(key)?;
    let nonce = build_nonce(system_title, invocation_counter);
    let nonce = Nonce::from_slice(&nonce);

    let mut out = plaintext.to_vec();

    if security_control.encryption() {
        let mut aad = Vec::with_capacity(1 + auth_key.len());
        aad.push(security_control.to_byte());
        aad.extend_from_slice(auth_key);

        let tag = cipher
            .encrypt_in_place_detached(nonce, &aad, &mut out)
            .map_err(|_| Error::DecryptionError)?;
        out.extend_from_slice(&tag);
        Ok(out)
    } else if security_control.authentication() {
        let mut aad = Vec::with_capacity(1 + auth_key.len() + plaintext.len());
        aad.push(security_control.to_byte());
        aad.extend_from_slice(auth_key);
        aad.extend_from_slice(plaintext);

        let mut empty = [0u8; 0];
        let tag = cipher
            .encrypt_in_place_detached(nonce, &aad, &mut empty)
            .map_err(|_| Error::DecryptionError)?;
        out.extend_from_slice(&tag);
        Ok(out)
    } else {
        Ok(out)
    }
}

/// Undo [`encrypt`]. `payload` is `ciphertext || tag` (or
/// `plaintext || tag` in authenticated-only mode). Any verification
/// failure surfaces as [`Error::DecryptionError`]; the caller never sees
/// the underlying aead error.
pub fn decrypt(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, Error> {
    if !security_control.encryption() && !security_control.authentication() {
        return Ok(payload.to_vec());
    }
    if payload.len() < GCM_TAG_LENGTH {
        return Err(Error::DecryptionError);
    }

    let cipher = cipher_for(key)?;
    let nonce = build_nonce(system_title, invocation_counter);
    let nonce = Nonce::from_slice(&nonce);

    let (body, tag_bytes) = payload.split_at(payload.len() - GCM_TAG_LENGTH);
    let tag = Tag::<U12>::from_slice(tag_bytes);

    if security_control.encryption() {
        let mut aad = Vec::with_capacity(1 + auth_key.len());
        aad.push(security_control.to_byte());
        aad.extend_from_slice(auth_key);

        let mut out = body.to_vec();
        cipher
            .decrypt_in_place_detached(nonce, &aad, &mut out, tag)
            .map_err(|_| Error::DecryptionError)?;
        Ok(out)
    } else {
        let mut aad = Vec::with_capacity(1 + auth_key.len() + body.len());
        aad.push(security_control.to_byte());
        aad.extend_from_slice(auth_key);
        aad.extend_from_slice(body);

        let mut empty = [0u8; 0];
        cipher
            .decrypt_in_place_detached(nonce, &aad, &mut empty, tag)
            .map_err(|_| Error::DecryptionError)?;
        Ok(body.to_vec())
    }
}

/// GMAC over a challenge: a 12-byte tag with
/// `security_control || auth_key || challenge` as additional data and no
/// plaintext.
pub fn gmac(
    security_control: SecurityControl,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    challenge: &[u8],
) -> Result<[u8; GCM_TAG_LENGTH], Error> {
    let cipher = cipher_for(key)?;
    let nonce = build_nonce(system_title, invocation_counter);
    let nonce = Nonce::from_slice(&nonce);

    let mut aad = Vec::with_capacity(1 + auth_key.len() + challenge.len());
    aad.push(security_control.to_byte());
    aad.extend_from_slice(auth_key);
    aad.extend_from_slice(challenge);

    let mut empty = [0u8; 0];
    let tag = cipher
        .encrypt_in_place_detached(nonce, &aad, &mut empty)
        .map_err(|_| Error::DecryptionError)?;

    let mut out = [0u8; GCM_TAG_LENGTH];
    out.copy_from_slice(&tag);
    Ok(out)
}

/// The HLS-GMAC challenge reply: `SC || IC(4 BE) || GMAC(SC || AK ||
/// challenge)`, computed over the *peer's* challenge with *our* system
/// title and invocation counter.
pub fn hls_gmac_reply(
    suite: u8,
    system_title: &[u8; 8],
    invocation_counter: u32,
    key: &[u8],
    auth_key: &[u8],
    challenge: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut security_control = SecurityControl::from_byte(suite & 0x0f);
    security_control.set_authentication(true);

    let tag = gmac(
        security_control,
        system_title,
        invocation_counter,
        key,
        auth_key,
        challenge,
    )?;

    let mut out = Vec::with_capacity(1 + 4 + GCM_TAG_LENGTH);
    out.push(security_control.to_byte());
    out.extend_from_slice(&invocation_counter.to_be_bytes());
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Verify the peer's `SC || IC || tag` reply against the challenge we
/// sent. The security control byte and invocation counter come from the
/// reply itself; the system title is the peer's.
pub fn hls_gmac_reply_valid(
    reply: &[u8],
    peer_system_title: &[u8; 8],
    key: &[u8],
    auth_key: &[u8],
    own_challenge: &[u8],
) -> Result<bool, Error> {
    if reply.len() != 1 + 4 + GCM_TAG_LENGTH {
        return Err(Error::AuthenticationFailed);
    }
    let security_control = SecurityControl::from_byte(reply[0]);
    let invocation_counter = u32::from_be_bytes([reply[1], reply[2], reply[3], reply[4]]);
    let expected = gmac(
        security_control,
        peer_system_title,
        invocation_counter,
        key,
        auth_key,
        own_challenge,
    )?;
    Ok(reply[5..] == expected)
}

/// A random client-to-server challenge. HLS challenges must be 8 to 64
/// bytes long.
pub fn make_client_challenge(length: usize) -> Result<Vec<u8>, Error> {
    if !(8..=64).contains(&length) {
        return Err(Error::PreconditionFailed);
    }
    let mut challenge = alloc::vec![0u8; length];
    getrandom::getrandom(&mut challenge).map_err(|_| Error::PreconditionFailed)?;
    Ok(challenge)
}

/// A client system title: a 3-letter vendor id plus 5 random bytes.
pub fn default_system_title() -> Result<[u8; 8], Error> {
    let mut title = *b"cli\0\0\0\0\0";
    getrandom::getrandom(&mut title[3..]).map_err(|_| Error::PreconditionFailed)?;
    Ok(title)
}
