//! PKCS#8 / SubjectPublicKeyInfo key files as produced by OpenSSL.
//!
//! Ed25519 and X25519 keys share the same DER skeleton (RFC 8410); only the
//! algorithm OID distinguishes them. Ed25519 material is converted to X25519
//! on the way in, X25519 keys are written out as-is.

use pkcs8::der::asn1::{AnyRef, BitStringRef};
use pkcs8::der::{Decode, Encode};
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};
use spki::SubjectPublicKeyInfoRef;

use crate::error::{Crypt4ghError, Result};
use crate::keys::convert;
use crate::keys::SecretKey;

pub const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
pub const X25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");

/// Pull the 32-byte key out of an RFC 8410 `privateKey` field. The field is
/// an OCTET STRING whose content is itself an OCTET STRING (`0x04 0x20`
/// prefix); some encoders leave the inner wrap off, so a bare 32-byte body
/// is accepted too.
fn curve_private_key(field: &[u8]) -> Result<[u8; 32]> {
    let raw: &[u8] = match field {
        [0x04, 0x20, rest @ ..] => rest,
        raw if raw.len() == 32 => raw,
        _ => return Err(Crypt4ghError::UnsupportedPrivateKeyFormat),
    };
    let mut key = [0u8; 32];
    key.copy_from_slice(raw);
    Ok(key)
}

/// Decode a PKCS#8 `PrivateKeyInfo` DER body into an X25519 secret.
pub fn decode_private_key(der: &[u8]) -> Result<SecretKey> {
    let info =
        PrivateKeyInfo::from_der(der).map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;
    let key = curve_private_key(info.private_key)?;
    match info.algorithm.oid {
        ED25519_OID => Ok(convert::ed25519_secret_to_x25519(&key)),
        X25519_OID => Ok(SecretKey::new(key)),
        _ => Err(Crypt4ghError::UnsupportedPrivateKeyFormat),
    }
}

/// Decode a `SubjectPublicKeyInfo` DER body into an X25519 public key.
pub fn decode_public_key(der: &[u8]) -> Result<[u8; 32]> {
    let info = SubjectPublicKeyInfoRef::from_der(der)
        .map_err(|_| Crypt4ghError::UnsupportedPublicKeyFormat)?;
    let raw = info
        .subject_public_key
        .as_bytes()
        .ok_or(Crypt4ghError::UnsupportedPublicKeyFormat)?;
    if raw.len() != 32 {
        return Err(Crypt4ghError::UnsupportedPublicKeyFormat);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(raw);
    match info.algorithm.oid {
        ED25519_OID => convert::ed25519_public_to_x25519(&key),
        X25519_OID => Ok(key),
        _ => Err(Crypt4ghError::UnsupportedPublicKeyFormat),
    }
}

/// Encode an X25519 secret as a PKCS#8 DER body (RFC 8410 nested
/// OCTET STRING).
pub fn encode_private_key(secret: &SecretKey) -> Result<Vec<u8>> {
    let mut inner = [0u8; 34];
    inner[0] = 0x04;
    inner[1] = 0x20;
    inner[2..].copy_from_slice(secret.as_bytes());

    let info = PrivateKeyInfo {
        algorithm: AlgorithmIdentifierRef {
            oid: X25519_OID,
            parameters: None::<AnyRef>,
        },
        private_key: &inner,
        public_key: None,
    };
    info.to_der().map_err(|_| Crypt4ghError::Encrypt)
}

/// Encode an X25519 public key as a `SubjectPublicKeyInfo` DER body.
pub fn encode_public_key(public: &[u8; 32]) -> Result<Vec<u8>> {
    let info = SubjectPublicKeyInfoRef {
        algorithm: AlgorithmIdentifierRef {
            oid: X25519_OID,
            parameters: None::<AnyRef>,
        },
        subject_public_key: BitStringRef::from_bytes(public)
            .map_err(|_| Crypt4ghError::Encrypt)?,
    };
    info.to_der().map_err(|_| Crypt4ghError::Encrypt)
}
