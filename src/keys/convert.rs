//! Ed25519 to X25519 conversions.
//!
//! Both key types live on Curve25519: Ed25519 in the Edwards form, X25519 in
//! the Montgomery form. The private side is `clamp(SHA-512(seed)[0..32])`
//! (RFC 7748 §5), the public side is the birational map from the decompressed
//! Edwards point (RFC 8032 §5.1.5 / RFC 7748 §4.1).

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha512};

use crate::error::{Crypt4ghError, Result};
use crate::keys::SecretKey;

/// Convert a 32-byte Ed25519 seed to an X25519 secret scalar.
pub fn ed25519_secret_to_x25519(seed: &[u8; 32]) -> SecretKey {
    let hash = Sha512::digest(seed);
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[..32]);
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    SecretKey::new(scalar)
}

/// Convert a compressed Ed25519 public key to its X25519 Montgomery form.
pub fn ed25519_public_to_x25519(public: &[u8; 32]) -> Result<[u8; 32]> {
    let point = CompressedEdwardsY(*public)
        .decompress()
        .ok_or(Crypt4ghError::UnsupportedPublicKeyFormat)?;
    Ok(point.to_montgomery().to_bytes())
}
