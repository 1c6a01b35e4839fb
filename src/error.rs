use thiserror::Error;

#[derive(Error, Debug)]
pub enum Crypt4ghError {
    #[error("private key format not supported")]
    UnsupportedPrivateKeyFormat,

    #[error("public key format not supported")]
    UnsupportedPublicKeyFormat,

    #[error("KDF {0:?} not supported")]
    UnsupportedKdf(String),

    #[error("key encryption cipher {0:?} not supported")]
    UnsupportedCipher(String),

    #[error("private key is password-protected, a passphrase is required")]
    PasswordRequired,

    #[error("invalid private key: KDF is 'none' but cipher is not 'none'")]
    MismatchedKdfCipher,

    #[error("decryption failed: wrong passphrase, wrong key or corrupted data")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("X25519 exchange yielded a low-order point")]
    InvalidPoint,

    #[error("no header packet decrypts with this key, or packets disagree on the data key")]
    HeaderInconsistent,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    #[error("not a crypt4gh container: bad magic bytes")]
    BadMagic,

    #[error("segment authentication failed")]
    SegmentAuthFailed,

    #[error("stream ended in the middle of a segment")]
    TruncatedStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Crypt4ghError>;

impl From<Crypt4ghError> for std::io::Error {
    fn from(err: Crypt4ghError) -> Self {
        match err {
            Crypt4ghError::Io(inner) => inner,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
