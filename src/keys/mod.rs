//! Key material handling for Crypt4GH.
//!
//! Reading dispatches on the PEM label (or `authorized_keys` prefix) and
//! hands the payload to the matching codec: OpenSSH, PKCS#8 or the Crypt4GH
//! container. Whatever the source format, everything is normalised to
//! X25519 form; Ed25519 keys exist only transiently during conversion.

pub mod c4gh;
pub mod convert;
pub mod openssl;
pub mod ssh;

use blake2::{Blake2b512, Digest};
use rand::rngs::OsRng;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Crypt4ghError, Result};

const PEM_OPENSSH_PRIVATE: &str = "OPENSSH PRIVATE KEY";
const PEM_OPENSSL_PRIVATE: &str = "PRIVATE KEY";
const PEM_OPENSSL_PUBLIC: &str = "PUBLIC KEY";
const PEM_CRYPT4GH_PRIVATE: &str = "CRYPT4GH ENCRYPTED PRIVATE KEY";
const PEM_CRYPT4GH_PUBLIC: &str = "CRYPT4GH PUBLIC KEY";

/// A 32-byte X25519 secret, zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }
}

impl AsRef<[u8]> for SecretKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey").field("bytes", &"[REDACTED]").finish()
    }
}

/// Generate a fresh X25519 key pair as `(public, secret)`.
pub fn generate_key_pair() -> ([u8; 32], SecretKey) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    (public.to_bytes(), SecretKey::new(secret.to_bytes()))
}

/// Derive the public key of an X25519 secret (base-point multiplication).
pub fn derive_public_key(secret: &[u8; 32]) -> [u8; 32] {
    let secret = StaticSecret::from(*secret);
    PublicKey::from(&secret).to_bytes()
}

/// Read a private key in any supported format, yielding its X25519 form.
///
/// The format is picked by the PEM label; a malformed key of one format is
/// never re-tried as another.
pub fn read_private_key(data: &[u8], passphrase: Option<&[u8]>) -> Result<SecretKey> {
    let block =
        pem::parse(data).map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;
    match block.tag() {
        PEM_OPENSSH_PRIVATE => {
            debug!("reading OpenSSH private key");
            let text = std::str::from_utf8(data)
                .map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;
            ssh::decode_private_key(text, passphrase)
        }
        PEM_OPENSSL_PRIVATE => {
            debug!("reading PKCS#8 private key");
            openssl::decode_private_key(block.contents())
        }
        tag if tag == PEM_CRYPT4GH_PRIVATE || block.contents().starts_with(c4gh::MAGIC) => {
            debug!("reading Crypt4GH private key");
            c4gh::decode_private_key(block.contents(), passphrase)
        }
        _ => Err(Crypt4ghError::UnsupportedPrivateKeyFormat),
    }
}

/// Read a public key in any supported format, yielding its X25519 form.
pub fn read_public_key(data: &[u8]) -> Result<[u8; 32]> {
    let text =
        std::str::from_utf8(data).map_err(|_| Crypt4ghError::UnsupportedPublicKeyFormat)?;
    let trimmed = text.trim();
    if trimmed.starts_with("ssh-") {
        debug!("reading OpenSSH public key");
        return ssh::decode_public_key(trimmed);
    }

    let block = pem::parse(data).map_err(|_| Crypt4ghError::UnsupportedPublicKeyFormat)?;
    match block.tag() {
        PEM_OPENSSL_PUBLIC => {
            debug!("reading SubjectPublicKeyInfo public key");
            openssl::decode_public_key(block.contents())
        }
        PEM_CRYPT4GH_PUBLIC => {
            debug!("reading Crypt4GH public key");
            let contents = block.contents();
            if contents.len() < 32 {
                return Err(Crypt4ghError::UnsupportedPublicKeyFormat);
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&contents[contents.len() - 32..]);
            Ok(key)
        }
        _ => Err(Crypt4ghError::UnsupportedPublicKeyFormat),
    }
}

/// Write an X25519 secret as a PKCS#8 PEM (`PRIVATE KEY`).
pub fn write_openssl_private_key(secret: &SecretKey) -> Result<String> {
    let der = openssl::encode_private_key(secret)?;
    Ok(pem::encode(&pem::Pem::new(PEM_OPENSSL_PRIVATE, der)))
}

/// Write an X25519 public key as a SubjectPublicKeyInfo PEM (`PUBLIC KEY`).
pub fn write_openssl_public_key(public: &[u8; 32]) -> Result<String> {
    let der = openssl::encode_public_key(public)?;
    Ok(pem::encode(&pem::Pem::new(PEM_OPENSSL_PUBLIC, der)))
}

/// Write an X25519 public key in the Crypt4GH format.
pub fn write_crypt4gh_public_key(public: &[u8; 32]) -> String {
    pem::encode(&pem::Pem::new(PEM_CRYPT4GH_PUBLIC, public.to_vec()))
}

/// Write an X25519 secret as a passphrase-protected Crypt4GH key.
pub fn write_crypt4gh_private_key(secret: &SecretKey, passphrase: &[u8]) -> Result<String> {
    let body = c4gh::encode_private_key(secret, passphrase)?;
    Ok(pem::encode(&pem::Pem::new(PEM_CRYPT4GH_PRIVATE, body)))
}

/// Derive the header-packet AEAD key on the reader (recipient) side.
///
/// BLAKE2b-512 over `dh || reader_public || writer_public`, truncated to
/// 32 bytes. The reader's own public key goes first; the writer side puts
/// them the other way around, so the two roles agree on the same key.
pub fn derive_reader_shared_key(secret: &[u8; 32], writer_public: &[u8; 32]) -> Result<SecretKey> {
    let (dh, own_public) = diffie_hellman(secret, writer_public)?;
    Ok(shared_key_hash(&dh, &own_public, writer_public))
}

/// Derive the header-packet AEAD key on the writer (sender) side.
pub fn derive_writer_shared_key(secret: &[u8; 32], reader_public: &[u8; 32]) -> Result<SecretKey> {
    let (dh, own_public) = diffie_hellman(secret, reader_public)?;
    Ok(shared_key_hash(&dh, reader_public, &own_public))
}

fn diffie_hellman(secret: &[u8; 32], peer_public: &[u8; 32]) -> Result<([u8; 32], [u8; 32])> {
    let secret = StaticSecret::from(*secret);
    let shared = secret.diffie_hellman(&PublicKey::from(*peer_public));
    if !shared.was_contributory() {
        return Err(Crypt4ghError::InvalidPoint);
    }
    let own_public = PublicKey::from(&secret).to_bytes();
    Ok((shared.to_bytes(), own_public))
}

fn shared_key_hash(dh: &[u8; 32], reader_public: &[u8; 32], writer_public: &[u8; 32]) -> SecretKey {
    let mut hasher = Blake2b512::new();
    hasher.update(dh);
    hasher.update(reader_public);
    hasher.update(writer_public);
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    SecretKey::new(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};

    #[test]
    fn test_derive_public_key_is_basepoint_mult() {
        let secret = [0x77u8; 32];
        assert_eq!(derive_public_key(&secret), x25519(secret, X25519_BASEPOINT_BYTES));
    }

    #[test]
    fn test_rfc7748_vector() {
        // RFC 7748 §6.1.
        let alice = hex!("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a");
        let bob = hex!("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb");
        let shared = x25519(alice, derive_public_key(&bob));
        assert_eq!(
            shared,
            hex!("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742")
        );
    }

    #[test]
    fn test_reader_and_writer_sides_agree() {
        let (writer_public, writer_secret) = generate_key_pair();
        let (reader_public, reader_secret) = generate_key_pair();

        let writer_side =
            derive_writer_shared_key(writer_secret.as_bytes(), &reader_public).unwrap();
        let reader_side =
            derive_reader_shared_key(reader_secret.as_bytes(), &writer_public).unwrap();
        assert_eq!(writer_side.as_bytes(), reader_side.as_bytes());
    }

    #[test]
    fn test_roles_produce_distinct_keys() {
        let (_, secret) = generate_key_pair();
        let (peer_public, _) = generate_key_pair();

        let as_reader = derive_reader_shared_key(secret.as_bytes(), &peer_public).unwrap();
        let as_writer = derive_writer_shared_key(secret.as_bytes(), &peer_public).unwrap();
        assert_ne!(as_reader.as_bytes(), as_writer.as_bytes());
    }

    #[test]
    fn test_low_order_peer_rejected() {
        let (_, secret) = generate_key_pair();
        assert!(matches!(
            derive_reader_shared_key(secret.as_bytes(), &[0u8; 32]).unwrap_err(),
            Crypt4ghError::InvalidPoint
        ));
    }

    #[test]
    fn test_openssl_private_roundtrip() {
        let (_, secret) = generate_key_pair();
        let out = write_openssl_private_key(&secret).unwrap();
        let parsed = read_private_key(out.as_bytes(), None).unwrap();
        assert_eq!(parsed.as_bytes(), secret.as_bytes());
    }

    #[test]
    fn test_openssl_public_roundtrip() {
        let (public, _) = generate_key_pair();
        let out = write_openssl_public_key(&public).unwrap();
        assert_eq!(read_public_key(out.as_bytes()).unwrap(), public);
    }

    #[test]
    fn test_crypt4gh_public_roundtrip() {
        let (public, _) = generate_key_pair();
        let out = write_crypt4gh_public_key(&public);
        assert_eq!(read_public_key(out.as_bytes()).unwrap(), public);
    }

    #[test]
    fn test_crypt4gh_private_roundtrip() {
        let (_, secret) = generate_key_pair();
        let out = write_crypt4gh_private_key(&secret, b"sesame").unwrap();

        let parsed = read_private_key(out.as_bytes(), Some(b"sesame")).unwrap();
        assert_eq!(parsed.as_bytes(), secret.as_bytes());

        assert!(matches!(
            read_private_key(out.as_bytes(), Some(b"wrong")).unwrap_err(),
            Crypt4ghError::Decrypt
        ));
        assert!(matches!(
            read_private_key(out.as_bytes(), None).unwrap_err(),
            Crypt4ghError::PasswordRequired
        ));
    }

    #[test]
    fn test_unlabelled_key_rejected() {
        let block = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0u8; 64]));
        assert!(matches!(
            read_private_key(block.as_bytes(), None).unwrap_err(),
            Crypt4ghError::UnsupportedPrivateKeyFormat
        ));
        assert!(matches!(
            read_public_key(block.as_bytes()).unwrap_err(),
            Crypt4ghError::UnsupportedPublicKeyFormat
        ));
    }

    #[test]
    fn test_not_pem_rejected() {
        assert!(read_private_key(b"random bytes", None).is_err());
        assert!(read_public_key(b"random bytes").is_err());
    }
}
