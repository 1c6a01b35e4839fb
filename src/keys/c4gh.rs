//! The Crypt4GH private-key container.
//!
//! PEM body layout (all lengths big-endian `u16`, unlike the little-endian
//! container body; the mismatch is part of the format):
//!
//! ```text
//! "c4gh-v1"
//! [len | kdf name]
//! [len | rounds (u32 BE) | salt]     absent entirely when kdf = "none"
//! [len | cipher name]
//! [len | payload]                    nonce(12) | ciphertext | tag(16),
//!                                    or the raw 32-byte key when kdf = "none"
//! ```

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;

use crate::error::{Crypt4ghError, Result};
use crate::kdf;
use crate::keys::SecretKey;

pub const MAGIC: &[u8; 7] = b"c4gh-v1";

const CIPHER_NONE: &str = "none";
const CIPHER_CHACHA20_POLY1305: &str = "chacha20_poly1305";

const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;

fn read_field<'a>(cursor: &mut &'a [u8]) -> Result<&'a [u8]> {
    if cursor.len() < 2 {
        return Err(Crypt4ghError::UnsupportedPrivateKeyFormat);
    }
    let len = u16::from_be_bytes([cursor[0], cursor[1]]) as usize;
    if cursor.len() < 2 + len {
        return Err(Crypt4ghError::UnsupportedPrivateKeyFormat);
    }
    let field = &cursor[2..2 + len];
    *cursor = &cursor[2 + len..];
    Ok(field)
}

fn write_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u16).to_be_bytes());
    out.extend_from_slice(field);
}

/// Decode the PEM body of a Crypt4GH private key.
pub fn decode_private_key(body: &[u8], passphrase: Option<&[u8]>) -> Result<SecretKey> {
    let mut cursor = body
        .strip_prefix(MAGIC)
        .ok_or(Crypt4ghError::UnsupportedPrivateKeyFormat)?;

    let kdf_name = String::from_utf8(read_field(&mut cursor)?.to_vec())
        .map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;
    if !kdf::is_supported(&kdf_name) {
        return Err(Crypt4ghError::UnsupportedKdf(kdf_name));
    }

    let mut rounds = 0u32;
    let mut salt = Vec::new();
    if kdf_name != kdf::KDF_NONE {
        if passphrase.is_none() {
            return Err(Crypt4ghError::PasswordRequired);
        }
        let options = read_field(&mut cursor)?;
        if options.len() < 4 {
            return Err(Crypt4ghError::UnsupportedPrivateKeyFormat);
        }
        rounds = u32::from_be_bytes([options[0], options[1], options[2], options[3]]);
        salt = options[4..].to_vec();
    }

    let cipher_name = String::from_utf8(read_field(&mut cursor)?.to_vec())
        .map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;
    let payload = read_field(&mut cursor)?;

    if kdf_name == kdf::KDF_NONE {
        if cipher_name != CIPHER_NONE {
            return Err(Crypt4ghError::MismatchedKdfCipher);
        }
        return SecretKey::from_slice(payload)
            .ok_or(Crypt4ghError::UnsupportedPrivateKeyFormat);
    }

    if cipher_name != CIPHER_CHACHA20_POLY1305 {
        return Err(Crypt4ghError::UnsupportedCipher(cipher_name));
    }
    if payload.len() < NONCE_SIZE + 16 {
        return Err(Crypt4ghError::UnsupportedPrivateKeyFormat);
    }

    let passphrase = passphrase.ok_or(Crypt4ghError::PasswordRequired)?;
    let key = kdf::derive(&kdf_name, rounds, passphrase, &salt)?;

    let cipher =
        ChaCha20Poly1305::new_from_slice(&key).map_err(|_| Crypt4ghError::Decrypt)?;
    let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
    let decrypted = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Crypt4ghError::Decrypt)?;

    SecretKey::from_slice(&decrypted).ok_or(Crypt4ghError::Decrypt)
}

/// Encode an X25519 secret as the PEM body of a Crypt4GH private key,
/// sealed under a scrypt-derived key.
pub fn encode_private_key(secret: &SecretKey, passphrase: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let rounds = 0u32;

    let key = kdf::derive("scrypt", rounds, passphrase, &salt)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| Crypt4ghError::Encrypt)?;
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), secret.as_bytes().as_slice())
        .map_err(|_| Crypt4ghError::Encrypt)?;

    let mut rounds_and_salt = Vec::with_capacity(4 + SALT_SIZE);
    rounds_and_salt.extend_from_slice(&rounds.to_be_bytes());
    rounds_and_salt.extend_from_slice(&salt);

    let mut payload = Vec::with_capacity(NONCE_SIZE + sealed.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_field(&mut out, b"scrypt");
    write_field(&mut out, &rounds_and_salt);
    write_field(&mut out, CIPHER_CHACHA20_POLY1305.as_bytes());
    write_field(&mut out, &payload);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_roundtrip() {
        let secret = SecretKey::new([0x11u8; 32]);
        let body = encode_private_key(&secret, b"correct horse").unwrap();
        let parsed = decode_private_key(&body, Some(b"correct horse")).unwrap();
        assert_eq!(parsed.as_bytes(), secret.as_bytes());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let secret = SecretKey::new([0x11u8; 32]);
        let body = encode_private_key(&secret, b"correct horse").unwrap();
        assert!(matches!(
            decode_private_key(&body, Some(b"battery staple")).unwrap_err(),
            Crypt4ghError::Decrypt
        ));
        assert!(matches!(
            decode_private_key(&body, Some(b"")).unwrap_err(),
            Crypt4ghError::Decrypt
        ));
    }

    #[test]
    fn test_missing_passphrase_fails() {
        let secret = SecretKey::new([0x11u8; 32]);
        let body = encode_private_key(&secret, b"correct horse").unwrap();
        assert!(matches!(
            decode_private_key(&body, None).unwrap_err(),
            Crypt4ghError::PasswordRequired
        ));
    }

    #[test]
    fn test_unprotected_key() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        write_field(&mut body, b"none");
        write_field(&mut body, b"none");
        write_field(&mut body, &[0x22u8; 32]);

        let parsed = decode_private_key(&body, None).unwrap();
        assert_eq!(parsed.as_bytes(), &[0x22u8; 32]);
    }

    #[test]
    fn test_kdf_none_requires_cipher_none() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        write_field(&mut body, b"none");
        write_field(&mut body, CIPHER_CHACHA20_POLY1305.as_bytes());
        write_field(&mut body, &[0x22u8; 32]);

        assert!(matches!(
            decode_private_key(&body, None).unwrap_err(),
            Crypt4ghError::MismatchedKdfCipher
        ));
    }

    #[test]
    fn test_unknown_kdf_name() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        write_field(&mut body, b"argon2id");

        assert!(matches!(
            decode_private_key(&body, Some(b"pw")).unwrap_err(),
            Crypt4ghError::UnsupportedKdf(name) if name == "argon2id"
        ));
    }

    #[test]
    fn test_unknown_cipher_name() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        write_field(&mut body, b"scrypt");
        let mut options = vec![0, 0, 0, 0];
        options.extend_from_slice(&[1u8; 16]);
        write_field(&mut body, &options);
        write_field(&mut body, b"aes256-gcm");
        write_field(&mut body, &[0u8; 60]);

        assert!(matches!(
            decode_private_key(&body, Some(b"pw")).unwrap_err(),
            Crypt4ghError::UnsupportedCipher(name) if name == "aes256-gcm"
        ));
    }

    #[test]
    fn test_truncated_body() {
        let mut body = Vec::new();
        body.extend_from_slice(MAGIC);
        body.extend_from_slice(&[0, 50]);
        body.extend_from_slice(b"scrypt");
        assert!(decode_private_key(&body, Some(b"pw")).is_err());
    }
}
