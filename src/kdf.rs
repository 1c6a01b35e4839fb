//! Password-based key derivation for Crypt4GH private key files.
//!
//! The key file names its KDF; the registry below maps that name to one of
//! the three derivation functions the format allows. All of them produce a
//! 256-bit (32-byte) key from a passphrase and salt.

use hmac::Hmac;
use sha2::Sha256;

use crate::error::{Crypt4ghError, Result};

/// Sentinel name for unprotected keys. Never derivable.
pub const KDF_NONE: &str = "none";

/// Fixed scrypt parameters: N = 2^14, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Whether `name` is a KDF the format recognises (including the `none`
/// sentinel, which marks an unprotected key and cannot be derived with).
pub fn is_supported(name: &str) -> bool {
    matches!(
        name,
        KDF_NONE | "scrypt" | "bcrypt_pbkdf" | "bcrypt" | "pbkdf2_hmac_sha256"
    )
}

/// Derive a 32-byte key with the named KDF.
///
/// `rounds` is ignored by scrypt (its cost parameters are fixed by the
/// format). `bcrypt` is accepted as an alias for `bcrypt_pbkdf`; key files
/// produced by older tooling carry that spelling.
pub fn derive(name: &str, rounds: u32, password: &[u8], salt: &[u8]) -> Result<[u8; 32]> {
    let mut output = [0u8; 32];
    match name {
        "scrypt" => {
            let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, output.len())
                .map_err(|_| Crypt4ghError::UnsupportedKdf(name.to_string()))?;
            scrypt::scrypt(password, salt, &params, &mut output)
                .map_err(|_| Crypt4ghError::UnsupportedKdf(name.to_string()))?;
        }
        "bcrypt_pbkdf" | "bcrypt" => {
            bcrypt_pbkdf::bcrypt_pbkdf(password, salt, rounds, &mut output)
                .map_err(|_| Crypt4ghError::Decrypt)?;
        }
        "pbkdf2_hmac_sha256" => {
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, rounds, &mut output)
                .map_err(|_| Crypt4ghError::Decrypt)?;
        }
        other => return Err(Crypt4ghError::UnsupportedKdf(other.to_string())),
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrypt_deterministic() {
        let salt = [0x42u8; 16];
        let k1 = derive("scrypt", 0, b"passphrase", &salt).unwrap();
        let k2 = derive("scrypt", 0, b"passphrase", &salt).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_scrypt_ignores_rounds() {
        let salt = [0x42u8; 16];
        let k1 = derive("scrypt", 0, b"passphrase", &salt).unwrap();
        let k2 = derive("scrypt", 100, b"passphrase", &salt).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_different_passphrases_differ() {
        let salt = [0x42u8; 16];
        let k1 = derive("scrypt", 0, b"passphrase-a", &salt).unwrap();
        let k2 = derive("scrypt", 0, b"passphrase-b", &salt).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_bcrypt_alias() {
        let salt = [0x13u8; 16];
        let k1 = derive("bcrypt_pbkdf", 16, b"secret", &salt).unwrap();
        let k2 = derive("bcrypt", 16, b"secret", &salt).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_pbkdf2_rounds_matter() {
        let salt = [7u8; 16];
        let k1 = derive("pbkdf2_hmac_sha256", 1_000, b"secret", &salt).unwrap();
        let k2 = derive("pbkdf2_hmac_sha256", 2_000, b"secret", &salt).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_unknown_kdf_rejected() {
        let err = derive("argon2id", 0, b"x", &[0u8; 16]).unwrap_err();
        assert!(matches!(err, Crypt4ghError::UnsupportedKdf(name) if name == "argon2id"));
    }

    #[test]
    fn test_none_not_derivable() {
        assert!(is_supported(KDF_NONE));
        assert!(matches!(
            derive(KDF_NONE, 0, b"x", &[]).unwrap_err(),
            Crypt4ghError::UnsupportedKdf(_)
        ));
    }
}
