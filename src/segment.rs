//! Per-segment ChaCha20-Poly1305 encryption.
//!
//! The container body is a sequence of independently authenticated
//! segments. Wire form: `[12-byte nonce][ciphertext][16-byte tag]`, no
//! associated data. Every non-final segment carries exactly 64 KiB of
//! plaintext; nonces are random per segment, so segments stand alone but
//! only make sense read in stream order.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

use crate::error::{Crypt4ghError, Result};
use crate::keys::SecretKey;

pub const UNENCRYPTED_SEGMENT_SIZE: usize = 65536;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;
pub const ENCRYPTED_SEGMENT_SIZE: usize = UNENCRYPTED_SEGMENT_SIZE + NONCE_SIZE + TAG_SIZE;

/// Seal one segment of plaintext with a fresh random nonce.
pub fn seal(data_key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(data_key.as_bytes())
        .map_err(|_| Crypt4ghError::Encrypt)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| Crypt4ghError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open one wire segment, verifying its tag.
pub fn open(data_key: &SecretKey, wire: &[u8]) -> Result<Vec<u8>> {
    if wire.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Crypt4ghError::TruncatedStream);
    }
    let (nonce, ciphertext) = wire.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new_from_slice(data_key.as_bytes())
        .map_err(|_| Crypt4ghError::SegmentAuthFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Crypt4ghError::SegmentAuthFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SecretKey {
        SecretKey::new([0x42u8; 32])
    }

    #[test]
    fn test_roundtrip() {
        let key = test_key();
        let sealed = seal(&key, b"hello").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 5 + TAG_SIZE);
        assert_eq!(open(&key, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_full_segment_size() {
        let key = test_key();
        let plaintext = vec![0xABu8; UNENCRYPTED_SEGMENT_SIZE];
        let sealed = seal(&key, &plaintext).unwrap();
        assert_eq!(sealed.len(), ENCRYPTED_SEGMENT_SIZE);
        assert_eq!(open(&key, &sealed).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&test_key(), b"secret").unwrap();
        let other = SecretKey::new([0x43u8; 32]);
        assert!(matches!(
            open(&other, &sealed).unwrap_err(),
            Crypt4ghError::SegmentAuthFailed
        ));
    }

    #[test]
    fn test_any_flipped_byte_fails() {
        let key = test_key();
        let sealed = seal(&key, b"integrity matters").unwrap();
        for index in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[index] ^= 0x01;
            assert!(matches!(
                open(&key, &tampered).unwrap_err(),
                Crypt4ghError::SegmentAuthFailed
            ));
        }
    }

    #[test]
    fn test_truncated_below_minimum() {
        let key = test_key();
        let sealed = seal(&key, b"x").unwrap();
        assert!(matches!(
            open(&key, &sealed[..NONCE_SIZE + TAG_SIZE - 1]).unwrap_err(),
            Crypt4ghError::TruncatedStream
        ));
    }

    #[test]
    fn test_truncated_tag_fails_auth() {
        let key = test_key();
        let sealed = seal(&key, b"some segment payload").unwrap();
        assert!(matches!(
            open(&key, &sealed[..sealed.len() - 4]).unwrap_err(),
            Crypt4ghError::SegmentAuthFailed
        ));
    }

    #[test]
    fn test_nonces_differ() {
        let key = test_key();
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }
}
