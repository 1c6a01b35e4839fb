//! OpenSSH key files.
//!
//! Only Ed25519 keys are accepted; anything else a Crypt4GH peer could not
//! use. Private keys may be passphrase-encrypted with the usual
//! bcrypt/AES-CTR scheme, which `ssh-key` handles for us.

use ssh_key::public::KeyData;
use ssh_key::private::KeypairData;
use tracing::debug;

use crate::error::{Crypt4ghError, Result};
use crate::keys::convert;
use crate::keys::SecretKey;

/// Decode an OpenSSH private key file into an X25519 secret.
pub fn decode_private_key(text: &str, passphrase: Option<&[u8]>) -> Result<SecretKey> {
    let key = ssh_key::PrivateKey::from_openssh(text)
        .map_err(|_| Crypt4ghError::UnsupportedPrivateKeyFormat)?;

    let key = if key.is_encrypted() {
        let passphrase = passphrase.ok_or(Crypt4ghError::PasswordRequired)?;
        debug!("decrypting passphrase-protected OpenSSH key");
        key.decrypt(passphrase).map_err(|_| Crypt4ghError::Decrypt)?
    } else {
        key
    };

    match key.key_data() {
        KeypairData::Ed25519(keypair) => {
            Ok(convert::ed25519_secret_to_x25519(&keypair.private.to_bytes()))
        }
        _ => Err(Crypt4ghError::UnsupportedPrivateKeyFormat),
    }
}

/// Decode a single `authorized_keys`-style line into an X25519 public key.
pub fn decode_public_key(line: &str) -> Result<[u8; 32]> {
    let key = ssh_key::PublicKey::from_openssh(line)
        .map_err(|_| Crypt4ghError::UnsupportedPublicKeyFormat)?;
    match key.key_data() {
        KeyData::Ed25519(public) => convert::ed25519_public_to_x25519(&public.0),
        _ => Err(Crypt4ghError::UnsupportedPublicKeyFormat),
    }
}
