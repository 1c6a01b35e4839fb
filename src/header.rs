//! Container header: magic, version, and recipient-addressed packets.
//!
//! Wire layout (all integers little-endian):
//!
//! ```text
//! "crypt4gh" | version(4) | packet_count(4)
//! per packet:
//!   packet_length(4, incl. this field) | header_encryption(4)
//!   writer_public(32) | nonce(12) | sealed body (incl. 16-byte tag)
//! ```
//!
//! Each packet is sealed for one recipient with the writer-side shared key.
//! On read, every packet is tried with the reader-side key; packets that do
//! not open are simply someone else's.

use std::io::Read;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use tracing::debug;

use crate::error::{Crypt4ghError, Result};
use crate::keys::{derive_public_key, derive_reader_shared_key, derive_writer_shared_key, SecretKey};

pub const MAGIC_NUMBER: &[u8; 8] = b"crypt4gh";
pub const VERSION: u32 = 1;

/// Header packet encryption method: X25519 + ChaCha20-Poly1305 (IETF).
pub const X25519_CHACHA20_IETF_POLY1305: u32 = 0;
/// Data encryption method: ChaCha20-Poly1305 (IETF).
pub const CHACHA20_IETF_POLY1305: u32 = 0;

const PACKET_TYPE_DATA_ENCRYPTION_PARAMETERS: u32 = 0;
const PACKET_TYPE_DATA_EDIT_LIST: u32 = 1;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;
/// length + method + writer public key + nonce.
const PACKET_PREFIX_SIZE: usize = 4 + 4 + 32 + NONCE_SIZE;

/// Alternating skip/keep byte runs, applied to the decrypted stream.
/// The first length is a skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEditList {
    pub lengths: Vec<u64>,
}

impl DataEditList {
    fn to_packet_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.lengths.len() * 8);
        out.extend_from_slice(&PACKET_TYPE_DATA_EDIT_LIST.to_le_bytes());
        out.extend_from_slice(&(self.lengths.len() as u32).to_le_bytes());
        for length in &self.lengths {
            out.extend_from_slice(&length.to_le_bytes());
        }
        out
    }

    fn from_packet_body(body: &[u8]) -> Option<Self> {
        if body.len() < 4 {
            return None;
        }
        let count = u32::from_le_bytes(body[..4].try_into().ok()?) as usize;
        let rest = &body[4..];
        if rest.len() != count * 8 {
            return None;
        }
        let lengths = rest
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        Some(Self { lengths })
    }
}

/// What a reader recovers from the header with its private key.
pub struct DecryptedHeader {
    pub data_key: SecretKey,
    pub edit_list: Option<DataEditList>,
}

impl std::fmt::Debug for DecryptedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedHeader")
            .field("data_key", &"<redacted>")
            .field("edit_list", &self.edit_list)
            .finish()
    }
}

fn data_encryption_parameters_body(data_key: &SecretKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 4 + 32);
    out.extend_from_slice(&PACKET_TYPE_DATA_ENCRYPTION_PARAMETERS.to_le_bytes());
    out.extend_from_slice(&CHACHA20_IETF_POLY1305.to_le_bytes());
    out.extend_from_slice(data_key.as_bytes());
    out
}

fn seal_packet(
    writer_secret: &[u8; 32],
    writer_public: &[u8; 32],
    recipient_public: &[u8; 32],
    body: &[u8],
) -> Result<Vec<u8>> {
    let shared = derive_writer_shared_key(writer_secret, recipient_public)?;
    let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes())
        .map_err(|_| Crypt4ghError::Encrypt)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), body)
        .map_err(|_| Crypt4ghError::Encrypt)?;

    let packet_length = (PACKET_PREFIX_SIZE + sealed.len()) as u32;
    let mut out = Vec::with_capacity(packet_length as usize);
    out.extend_from_slice(&packet_length.to_le_bytes());
    out.extend_from_slice(&X25519_CHACHA20_IETF_POLY1305.to_le_bytes());
    out.extend_from_slice(writer_public);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Build the serialized header: one DataEncryptionParameters packet per
/// recipient, then one DataEditList packet per recipient when an edit list
/// is given.
pub fn build(
    writer_secret: &[u8; 32],
    recipient_publics: &[[u8; 32]],
    data_key: &SecretKey,
    edit_list: Option<&DataEditList>,
) -> Result<Vec<u8>> {
    let writer_public = derive_public_key(writer_secret);

    let mut packets = Vec::new();
    let parameters_body = data_encryption_parameters_body(data_key);
    for recipient in recipient_publics {
        packets.push(seal_packet(writer_secret, &writer_public, recipient, &parameters_body)?);
    }
    if let Some(edit_list) = edit_list {
        let edit_body = edit_list.to_packet_body();
        for recipient in recipient_publics {
            packets.push(seal_packet(writer_secret, &writer_public, recipient, &edit_body)?);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC_NUMBER);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(packets.len() as u32).to_le_bytes());
    for packet in packets {
        out.extend_from_slice(&packet);
    }
    Ok(out)
}

/// One decrypted header packet, or `None` when the packet is not ours or
/// not something we understand.
fn open_packet(reader_secret: &[u8; 32], packet: &[u8]) -> Option<Vec<u8>> {
    let method = u32::from_le_bytes(packet[..4].try_into().ok()?);
    if method != X25519_CHACHA20_IETF_POLY1305 {
        debug!(method, "skipping header packet with unknown encryption method");
        return None;
    }
    let mut writer_public = [0u8; 32];
    writer_public.copy_from_slice(&packet[4..36]);
    let nonce = &packet[36..36 + NONCE_SIZE];
    let sealed = &packet[36 + NONCE_SIZE..];

    let shared = derive_reader_shared_key(reader_secret, &writer_public).ok()?;
    let cipher = ChaCha20Poly1305::new_from_slice(shared.as_bytes()).ok()?;
    cipher.decrypt(Nonce::from_slice(nonce), sealed).ok()
}

/// Read and decrypt the header from `source`.
///
/// Packets that fail to open are skipped without comment; a multi-recipient
/// file looks like that to every one of its readers. Failing to recover any
/// data key, or recovering two that disagree, is `HeaderInconsistent`.
pub fn parse<R: Read>(source: &mut R, reader_secret: &[u8; 32]) -> Result<DecryptedHeader> {
    let mut prelude = [0u8; 16];
    source.read_exact(&mut prelude)?;
    if &prelude[..8] != MAGIC_NUMBER {
        return Err(Crypt4ghError::BadMagic);
    }
    let version = u32::from_le_bytes(prelude[8..12].try_into().unwrap());
    if version != VERSION {
        return Err(Crypt4ghError::UnsupportedVersion(version));
    }
    let packet_count = u32::from_le_bytes(prelude[12..16].try_into().unwrap());

    let mut data_key: Option<SecretKey> = None;
    let mut edit_list: Option<DataEditList> = None;

    for _ in 0..packet_count {
        let mut length_bytes = [0u8; 4];
        source.read_exact(&mut length_bytes)?;
        let packet_length = u32::from_le_bytes(length_bytes) as usize;
        if packet_length < PACKET_PREFIX_SIZE + TAG_SIZE {
            return Err(Crypt4ghError::TruncatedStream);
        }
        let mut packet = vec![0u8; packet_length - 4];
        source.read_exact(&mut packet)?;

        let Some(body) = open_packet(reader_secret, &packet) else {
            debug!("header packet does not open with this key, skipping");
            continue;
        };
        if body.len() < 4 {
            continue;
        }
        let packet_type = u32::from_le_bytes(body[..4].try_into().unwrap());
        match packet_type {
            PACKET_TYPE_DATA_ENCRYPTION_PARAMETERS => {
                if body.len() != 4 + 4 + 32 {
                    continue;
                }
                let method = u32::from_le_bytes(body[4..8].try_into().unwrap());
                if method != CHACHA20_IETF_POLY1305 {
                    debug!(method, "skipping data key with unknown encryption method");
                    continue;
                }
                let Some(key) = SecretKey::from_slice(&body[8..40]) else {
                    continue;
                };
                match &data_key {
                    Some(existing) if existing.as_bytes() != key.as_bytes() => {
                        return Err(Crypt4ghError::HeaderInconsistent);
                    }
                    Some(_) => {}
                    None => data_key = Some(key),
                }
            }
            PACKET_TYPE_DATA_EDIT_LIST => {
                if edit_list.is_none() {
                    edit_list = DataEditList::from_packet_body(&body[4..]);
                }
            }
            other => {
                debug!(packet_type = other, "skipping header packet of unknown type");
            }
        }
    }

    let data_key = data_key.ok_or(Crypt4ghError::HeaderInconsistent)?;
    Ok(DecryptedHeader { data_key, edit_list })
}
